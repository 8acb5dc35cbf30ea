use crate::models::StatisticsSummary;

/// Descriptive summary of a numeric sample. Returns `None` for an empty
/// sample; callers must not fabricate zeros for missing data.
pub fn summarize(values: &[f64]) -> Option<StatisticsSummary> {
    if values.is_empty() {
        return None;
    }

    let count = values.len();
    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let half_width = 1.96 * std_dev / n.sqrt();
    let skewness = if count <= 2 || std_dev == 0.0 {
        0.0
    } else {
        values
            .iter()
            .map(|v| ((v - mean) / std_dev).powi(3))
            .sum::<f64>()
            / n
    };

    Some(StatisticsSummary {
        mean: round2(mean),
        std_dev: round2(std_dev),
        min: round2(sorted[0]),
        max: round2(sorted[count - 1]),
        percentile_25: round2(percentile(&sorted, 25.0)),
        percentile_50: round2(percentile(&sorted, 50.0)),
        percentile_75: round2(percentile(&sorted, 75.0)),
        confidence_interval_lower: round2(mean - half_width),
        confidence_interval_upper: round2(mean + half_width),
        skewness: round3(skewness),
        count,
    })
}

/// Linear interpolation between the two bounding order statistics of an
/// ascending-sorted sample: index = p/100 * (N-1).
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let index = p / 100.0 * (sorted.len() as f64 - 1.0);
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = index - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
