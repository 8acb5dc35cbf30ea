use crate::models::{Aggregate, Category, Cycle, Distribution, Record};
use crate::stats::round2;

/// Per-category averages for one cycle. A record counts only if it carries an
/// overall score for that cycle; a record without one is excluded entirely,
/// even from categories it does have values for.
pub fn averages(records: &[Record], cycle: Cycle) -> Aggregate {
    let mut sums = [0.0f64; 6];
    let mut valid = 0usize;

    for record in records {
        let scores = record.scores(cycle);
        if scores.overall.is_none() {
            continue;
        }
        valid += 1;
        for (index, category) in Category::ALL.iter().enumerate() {
            sums[index] += scores.get(*category).unwrap_or(0.0);
        }
    }

    let mut aggregate = Aggregate::default();
    if valid == 0 {
        return aggregate;
    }
    for (index, category) in Category::ALL.iter().enumerate() {
        aggregate.set(*category, round2(sums[index] / valid as f64));
    }
    aggregate
}

/// Histogram of rounded scores 0-10 for one category/cycle. Non-numeric and
/// out-of-range values are skipped. Scores are expected to be integers, but
/// rounding tolerates minor floating-point drift from upstream.
pub fn distribution(records: &[Record], cycle: Cycle, category: Category) -> Distribution {
    let mut buckets = [0u32; 11];
    for record in records {
        let Some(value) = record.scores(cycle).get(category) else {
            continue;
        };
        if !value.is_finite() || !(0.0..=10.0).contains(&value) {
            continue;
        }
        buckets[value.round() as usize] += 1;
    }
    buckets
}

/// Every present score for one category/cycle, for the statistics engine.
pub fn category_scores(records: &[Record], cycle: Cycle, category: Category) -> Vec<f64> {
    records
        .iter()
        .filter_map(|record| record.scores(cycle).get(category))
        .filter(|value| value.is_finite())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(fields: serde_json::Value) -> Record {
        Record::from_raw(&fields).unwrap()
    }

    fn cycle1() -> Cycle {
        Cycle::new(1).unwrap()
    }

    #[test]
    fn empty_record_set_averages_to_zero() {
        let aggregate = averages(&[], cycle1());
        assert_eq!(aggregate, Aggregate::default());
    }

    #[test]
    fn records_without_overall_are_fully_excluded() {
        let records = vec![
            record(json!({"id": "a", "field_155_raw": "5", "field_160_raw": "6"})),
            record(json!({"id": "b", "field_155_raw": "7", "field_160_raw": "8"})),
            // Has a vision score but no overall, so it must not count anywhere.
            record(json!({"id": "c", "field_155_raw": "9"})),
        ];

        let aggregate = averages(&records, cycle1());
        assert_eq!(aggregate.overall, 7.0);
        assert_eq!(aggregate.vision, 6.0);
    }

    #[test]
    fn valid_records_missing_a_category_dilute_its_average() {
        let records = vec![
            record(json!({"id": "a", "field_156_raw": "6", "field_160_raw": "6"})),
            record(json!({"id": "b", "field_160_raw": "8"})),
        ];

        let aggregate = averages(&records, cycle1());
        assert_eq!(aggregate.overall, 7.0);
        assert_eq!(aggregate.effort, 3.0);
    }

    #[test]
    fn averages_round_to_two_decimals() {
        let records = vec![
            record(json!({"id": "a", "field_160_raw": "6"})),
            record(json!({"id": "b", "field_160_raw": "7"})),
            record(json!({"id": "c", "field_160_raw": "7"})),
        ];

        let aggregate = averages(&records, cycle1());
        assert_eq!(aggregate.overall, 6.67);
    }

    #[test]
    fn distribution_skips_invalid_and_out_of_range_scores() {
        let records = vec![
            record(json!({"id": "a", "field_160_raw": "7"})),
            record(json!({"id": "b", "field_160_raw": "7"})),
            record(json!({"id": "c", "field_160_raw": "10"})),
            record(json!({"id": "d", "field_160_raw": "-1"})),
            record(json!({"id": "e", "field_160_raw": "abc"})),
        ];

        let buckets = distribution(&records, cycle1(), Category::Overall);
        assert_eq!(buckets[7], 2);
        assert_eq!(buckets[10], 1);
        assert_eq!(buckets.iter().sum::<u32>(), 3);
    }

    #[test]
    fn distribution_rounds_drifted_scores() {
        let records = vec![
            record(json!({"id": "a", "field_160_raw": 6.999999})),
            record(json!({"id": "b", "field_160_raw": 7.000001})),
        ];

        let buckets = distribution(&records, cycle1(), Category::Overall);
        assert_eq!(buckets[7], 2);
    }

    #[test]
    fn category_scores_collects_present_values_only() {
        let records = vec![
            record(json!({"id": "a", "field_155_raw": "5"})),
            record(json!({"id": "b", "field_155_raw": "bad"})),
            record(json!({"id": "c", "field_155_raw": "8"})),
        ];

        let values = category_scores(&records, cycle1(), Category::Vision);
        assert_eq!(values, vec![5.0, 8.0]);
    }
}
