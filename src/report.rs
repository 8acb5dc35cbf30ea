use std::fmt::Write;

use crate::dashboard::Overview;
use crate::error::DashboardError;
use crate::filters;
use crate::models::{Category, Cycle, FilterRule, NationalEri, Record, SchoolEri};
use crate::stats;
use crate::vespa;

/// Builds the markdown report. Each section renders from its own result, so
/// one failed load leaves the other sections intact.
pub fn build_report(
    scope_label: &str,
    cycle: Cycle,
    overview: &Result<Overview, DashboardError>,
    school_eri: &Result<SchoolEri, DashboardError>,
    national_eri: &Result<NationalEri, DashboardError>,
    rules: &[FilterRule],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# VESPA Dashboard Report");
    let _ = writeln!(
        output,
        "Generated for {} (cycle {})",
        scope_label,
        cycle.number()
    );

    match overview {
        Ok(overview) => {
            let filtered = filters::apply_filters(&overview.records, rules);
            write_overview(&mut output, cycle, overview, &filtered, rules);
            write_distributions(&mut output, cycle, &filtered);
            write_statistics(&mut output, cycle, &filtered);
        }
        Err(err) => {
            let _ = writeln!(output);
            let _ = writeln!(output, "## Overview");
            let _ = writeln!(output, "Overview unavailable: {err}");
        }
    }

    write_eri(&mut output, overview, school_eri, national_eri);
    output
}

fn write_overview(
    output: &mut String,
    cycle: Cycle,
    overview: &Overview,
    filtered: &[Record],
    rules: &[FilterRule],
) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");

    if rules.is_empty() {
        let _ = writeln!(output, "{} records.", overview.records.len());
    } else {
        let _ = writeln!(
            output,
            "{} of {} records after filters.",
            filtered.len(),
            overview.records.len()
        );
    }

    let responders = filtered
        .iter()
        .filter(|record| record.scores(cycle).overall.is_some())
        .count();
    let _ = writeln!(output, "{responders} with a cycle {} score.", cycle.number());

    if filtered.is_empty() {
        let _ = writeln!(output, "No records in scope for this view.");
        return;
    }

    let aggregate = vespa::averages(filtered, cycle);
    let national = overview
        .national_benchmark
        .as_ref()
        .map(|record| record.scores(cycle));

    let _ = writeln!(output);
    for category in Category::ALL {
        match national.and_then(|scores| scores.get(category)) {
            Some(benchmark) => {
                let _ = writeln!(
                    output,
                    "- {}: {:.2} (national {:.2})",
                    category.label(),
                    aggregate.get(category),
                    benchmark
                );
            }
            None => {
                let _ = writeln!(
                    output,
                    "- {}: {:.2}",
                    category.label(),
                    aggregate.get(category)
                );
            }
        }
    }
}

fn write_distributions(output: &mut String, cycle: Cycle, filtered: &[Record]) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## Score Distributions");

    if filtered.is_empty() {
        let _ = writeln!(output, "No scores to chart.");
        return;
    }

    let _ = writeln!(output, "Counts per rounded score 0-10.");
    for category in Category::ALL {
        let buckets = vespa::distribution(filtered, cycle, category);
        let counts: Vec<String> = buckets.iter().map(u32::to_string).collect();
        let _ = writeln!(output, "- {}: {}", category.label(), counts.join(" "));
    }
}

fn write_statistics(output: &mut String, cycle: Cycle, filtered: &[Record]) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## Statistics");

    for category in Category::ALL {
        let values = vespa::category_scores(filtered, cycle, category);
        match stats::summarize(&values) {
            Some(summary) => {
                let _ = writeln!(
                    output,
                    "- {}: mean {:.2}, sd {:.2}, median {:.2}, p25 {:.2}, p75 {:.2}, \
                     95% CI [{:.2}, {:.2}], skew {:.3} (n={})",
                    category.label(),
                    summary.mean,
                    summary.std_dev,
                    summary.percentile_50,
                    summary.percentile_25,
                    summary.percentile_75,
                    summary.confidence_interval_lower,
                    summary.confidence_interval_upper,
                    summary.skewness,
                    summary.count
                );
            }
            None => {
                let _ = writeln!(output, "- {}: no data", category.label());
            }
        }
    }
}

fn write_eri(
    output: &mut String,
    overview: &Result<Overview, DashboardError>,
    school_eri: &Result<SchoolEri, DashboardError>,
    national_eri: &Result<NationalEri, DashboardError>,
) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## Exam Readiness");

    // The dedicated endpoints are authoritative; a failed call falls back to
    // the copy embedded in the initial payload before rendering an error.
    match school_eri {
        Ok(eri) => write_school_eri(output, eri, ""),
        Err(err) => match overview.as_ref().ok().and_then(|o| o.school_eri) {
            Some(eri) => write_school_eri(output, &eri, " (from the initial load)"),
            None => {
                let _ = writeln!(output, "School ERI unavailable: {err}");
            }
        },
    }

    match national_eri {
        Ok(eri) => write_national_eri(output, eri, ""),
        Err(err) => match overview.as_ref().ok().and_then(|o| o.national_eri.clone()) {
            Some(eri) => write_national_eri(output, &eri, " (from the initial load)"),
            None => {
                let _ = writeln!(output, "National ERI unavailable: {err}");
            }
        },
    }
}

fn write_school_eri(output: &mut String, eri: &SchoolEri, note: &str) {
    match eri.school_eri {
        Some(value) => {
            let _ = writeln!(
                output,
                "School ERI {:.2} from {} responses{note}.",
                value, eri.response_count
            );
        }
        None => {
            let _ = writeln!(output, "No school ERI for this cycle.");
        }
    }
}

fn write_national_eri(output: &mut String, eri: &NationalEri, note: &str) {
    match eri.national_eri {
        Some(value) => {
            let _ = writeln!(output, "National ERI {:.2} ({}){note}.", value, eri.source);
            if let Some(message) = &eri.message {
                let _ = writeln!(output, "{message}");
            }
        }
        None => {
            let _ = writeln!(output, "No national ERI published for this cycle.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldFilter, FilterOperator};
    use serde_json::json;

    fn overview(records: Vec<serde_json::Value>) -> Overview {
        Overview {
            records: records.iter().filter_map(Record::from_raw).collect(),
            national_benchmark: Record::from_raw(&json!({
                "id": "national",
                "field_155_raw": "5.9",
                "field_160_raw": "6.1",
            })),
            school_eri: None,
            national_eri: None,
        }
    }

    fn school_eri() -> Result<SchoolEri, DashboardError> {
        Ok(SchoolEri {
            school_eri: Some(3.4),
            response_count: 120,
        })
    }

    fn national_eri() -> Result<NationalEri, DashboardError> {
        Ok(NationalEri {
            national_eri: Some(3.6),
            source: "benchmark".to_string(),
            message: None,
        })
    }

    #[test]
    fn report_renders_averages_with_national_comparison() {
        let overview = Ok(overview(vec![
            json!({"id": "a", "field_155_raw": "5", "field_160_raw": "6"}),
            json!({"id": "b", "field_155_raw": "7", "field_160_raw": "8"}),
        ]));

        let report = build_report(
            "est-1",
            Cycle::new(1).unwrap(),
            &overview,
            &school_eri(),
            &national_eri(),
            &[],
        );

        assert!(report.contains("- Overall: 7.00 (national 6.10)"));
        assert!(report.contains("- Vision: 6.00 (national 5.90)"));
        assert!(report.contains("School ERI 3.40 from 120 responses."));
        assert!(report.contains("National ERI 3.60 (benchmark)."));
    }

    #[test]
    fn failed_overview_leaves_eri_section_intact() {
        let overview = Err(DashboardError::Network("502 from backend".to_string()));

        let report = build_report(
            "est-1",
            Cycle::new(1).unwrap(),
            &overview,
            &school_eri(),
            &national_eri(),
            &[],
        );

        assert!(report.contains("Overview unavailable"));
        assert!(report.contains("502 from backend"));
        assert!(report.contains("School ERI 3.40 from 120 responses."));
    }

    #[test]
    fn failed_eri_sections_render_inline_errors() {
        let overview = Ok(overview(vec![
            json!({"id": "a", "field_160_raw": "6"}),
        ]));

        let report = build_report(
            "est-1",
            Cycle::new(1).unwrap(),
            &overview,
            &Err(DashboardError::Network("timeout".to_string())),
            &national_eri(),
            &[],
        );

        assert!(report.contains("School ERI unavailable"));
        assert!(report.contains("- Overall: 6.00 (national 6.10)"));
    }

    #[test]
    fn failed_eri_call_falls_back_to_the_initial_payload_copy() {
        let mut data = overview(vec![json!({"id": "a", "field_160_raw": "6"})]);
        data.school_eri = Some(SchoolEri {
            school_eri: Some(3.1),
            response_count: 80,
        });

        let report = build_report(
            "est-1",
            Cycle::new(1).unwrap(),
            &Ok(data),
            &Err(DashboardError::Network("timeout".to_string())),
            &national_eri(),
            &[],
        );

        assert!(report.contains("School ERI 3.10 from 80 responses (from the initial load)."));
        assert!(!report.contains("School ERI unavailable"));
    }

    #[test]
    fn filters_narrow_the_reported_records() {
        let overview = Ok(overview(vec![
            json!({"id": "a", "field_223": "12", "field_160_raw": "6"}),
            json!({"id": "b", "field_223": "13", "field_160_raw": "8"}),
        ]));
        let rules = vec![FilterRule::Simple(FieldFilter {
            field: "field_223".to_string(),
            subfield: None,
            operator: FilterOperator::Is,
            value: "12".to_string(),
        })];

        let report = build_report(
            "est-1",
            Cycle::new(1).unwrap(),
            &overview,
            &school_eri(),
            &national_eri(),
            &rules,
        );

        assert!(report.contains("1 of 2 records after filters."));
        assert!(report.contains("- Overall: 6.00 (national 6.10)"));
    }

    #[test]
    fn empty_record_set_reports_no_data() {
        let report = build_report(
            "est-1",
            Cycle::new(1).unwrap(),
            &Ok(overview(vec![])),
            &school_eri(),
            &national_eri(),
            &[],
        );

        assert!(report.contains("No records in scope for this view."));
        assert!(report.contains("No scores to chart."));
        assert!(report.contains("- Vision: no data"));
    }
}
