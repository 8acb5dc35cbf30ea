use serde_json::Value;

use crate::models::{FieldFilter, FilterOperator, FilterRule, Record};

/// Applies every rule with AND semantics; an `AnyOf` group matches when any
/// of its sub-rules does. Pure predicate, so re-applying the same rules is a
/// no-op.
pub fn apply_filters(records: &[Record], rules: &[FilterRule]) -> Vec<Record> {
    records
        .iter()
        .filter(|record| matches_all(record, rules))
        .cloned()
        .collect()
}

fn matches_all(record: &Record, rules: &[FilterRule]) -> bool {
    rules.iter().all(|rule| match rule {
        FilterRule::Simple(filter) => matches_filter(record, filter),
        FilterRule::AnyOf(filters) => filters.iter().any(|filter| matches_filter(record, filter)),
    })
}

fn matches_filter(record: &Record, filter: &FieldFilter) -> bool {
    // An absent or null field never matches, even for negated operators;
    // absence is not mismatch on sparse fields.
    let Some(target) = resolve_field(record, filter) else {
        return false;
    };

    let target = target.to_lowercase();
    let value = filter.value.to_lowercase();
    match filter.operator {
        FilterOperator::Is => target == value,
        FilterOperator::IsNot => target != value,
        FilterOperator::Contains => target.contains(&value),
        FilterOperator::DoesNotContain => !target.contains(&value),
    }
}

fn resolve_field(record: &Record, filter: &FieldFilter) -> Option<String> {
    let mut value = record.fields.get(&filter.field)?;
    if let Some(subfield) = &filter.subfield {
        value = value.as_object()?.get(subfield)?;
    }
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FilterOperator::{Contains, DoesNotContain, Is, IsNot};
    use serde_json::json;

    fn record(fields: serde_json::Value) -> Record {
        Record::from_raw(&fields).unwrap()
    }

    fn simple(field: &str, operator: FilterOperator, value: &str) -> FilterRule {
        FilterRule::Simple(FieldFilter {
            field: field.to_string(),
            subfield: None,
            operator,
            value: value.to_string(),
        })
    }

    fn sample_records() -> Vec<Record> {
        vec![
            record(json!({
                "id": "a",
                "field_223": "12",
                "field_187": {"first": "Avery", "last": "Lee"},
            })),
            record(json!({
                "id": "b",
                "field_223": "13",
                "field_187": {"first": "Jules", "last": "Moreno"},
            })),
            record(json!({
                "id": "c",
                "field_187": {"first": "Kiara", "last": "Patel"},
            })),
        ]
    }

    #[test]
    fn equality_is_case_insensitive() {
        let records = sample_records();
        let filtered = apply_filters(&records, &[simple("field_223", Is, "12")]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "a");
    }

    #[test]
    fn absent_field_never_matches_even_negated() {
        let records = sample_records();
        // Record "c" has no field_223, so it fails both polarities.
        let filtered = apply_filters(&records, &[simple("field_223", IsNot, "12")]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "b");

        let filtered = apply_filters(&records, &[simple("field_223", DoesNotContain, "9")]);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn null_field_never_matches() {
        let records = vec![record(json!({"id": "a", "field_223": null}))];
        assert!(apply_filters(&records, &[simple("field_223", IsNot, "x")]).is_empty());
    }

    #[test]
    fn rules_combine_with_and_semantics() {
        let records = sample_records();
        let rules = vec![
            simple("field_223", Is, "12"),
            simple("field_223", Contains, "1"),
        ];
        assert_eq!(apply_filters(&records, &rules).len(), 1);

        let rules = vec![
            simple("field_223", Is, "12"),
            simple("field_223", Is, "13"),
        ];
        assert!(apply_filters(&records, &rules).is_empty());
    }

    #[test]
    fn any_of_group_searches_name_subfields() {
        let records = sample_records();
        let rule = FilterRule::AnyOf(vec![
            FieldFilter {
                field: "field_187".to_string(),
                subfield: Some("first".to_string()),
                operator: Contains,
                value: "mor".to_string(),
            },
            FieldFilter {
                field: "field_187".to_string(),
                subfield: Some("last".to_string()),
                operator: Contains,
                value: "mor".to_string(),
            },
        ]);

        let filtered = apply_filters(&records, &[rule]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "b");
    }

    #[test]
    fn non_string_values_are_coerced() {
        let records = vec![record(json!({"id": "a", "field_144": 2026}))];
        let filtered = apply_filters(&records, &[simple("field_144", Is, "2026")]);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn filtering_is_idempotent() {
        let records = sample_records();
        let rules = vec![simple("field_223", Contains, "1")];
        let once = apply_filters(&records, &rules);
        let twice = apply_filters(&once, &rules);
        assert_eq!(once, twice);
    }

    #[test]
    fn no_rules_keeps_every_record() {
        let records = sample_records();
        assert_eq!(apply_filters(&records, &[]).len(), records.len());
    }
}
