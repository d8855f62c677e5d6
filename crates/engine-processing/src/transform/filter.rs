use model::{
    core::value::parse_decimal,
    records::feed::FeedRecord,
    transform::mapping::{FilterOp, FilterRule},
};

/// True when the record passes every rule. Rules read the raw feed value.
pub fn passes_all(record: &FeedRecord, rules: &[FilterRule]) -> bool {
    rules.iter().all(|rule| passes(record, rule))
}

/// The first rule the record fails, if any.
pub fn first_failing<'a>(record: &FeedRecord, rules: &'a [FilterRule]) -> Option<&'a FilterRule> {
    rules.iter().find(|rule| !passes(record, rule))
}

pub fn passes(record: &FeedRecord, rule: &FilterRule) -> bool {
    let actual = record.text(&rule.field);
    let expected = rule.value.as_deref().map(str::trim).unwrap_or_default();

    match rule.op {
        FilterOp::Empty => actual.is_none(),
        FilterOp::NotEmpty => actual.is_some(),
        FilterOp::Equals => actual.is_some_and(|a| a.eq_ignore_ascii_case(expected)),
        FilterOp::NotEquals => !actual.is_some_and(|a| a.eq_ignore_ascii_case(expected)),
        FilterOp::Contains => actual.is_some_and(|a| contains_ci(&a, expected)),
        FilterOp::NotContains => !actual.is_some_and(|a| contains_ci(&a, expected)),
        FilterOp::GreaterThan => compare(actual.as_deref(), expected).is_some_and(|(a, e)| a > e),
        FilterOp::LessThan => compare(actual.as_deref(), expected).is_some_and(|(a, e)| a < e),
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Both sides as numbers; a non-numeric side fails the comparison.
fn compare(actual: Option<&str>, expected: &str) -> Option<(f64, f64)> {
    Some((parse_decimal(actual?)?, parse_decimal(expected)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn record(pairs: &[(&str, serde_json::Value)]) -> FeedRecord {
        let mut fields = Map::new();
        for (k, v) in pairs {
            fields.insert(k.to_string(), v.clone());
        }
        FeedRecord::new(1, fields)
    }

    fn rule(field: &str, op: FilterOp, value: Option<&str>) -> FilterRule {
        FilterRule {
            field: field.into(),
            op,
            value: value.map(Into::into),
        }
    }

    #[test]
    fn text_ops_ignore_case() {
        let r = record(&[("brand", json!("Acme Shoes"))]);
        assert!(passes(&r, &rule("brand", FilterOp::Equals, Some("acme shoes"))));
        assert!(passes(&r, &rule("brand", FilterOp::Contains, Some("SHOE"))));
        assert!(passes(&r, &rule("brand", FilterOp::NotContains, Some("boot"))));
        assert!(!passes(&r, &rule("brand", FilterOp::NotEquals, Some("ACME SHOES"))));
        assert!(passes(&r, &rule("missing", FilterOp::NotEquals, Some("x"))));
    }

    #[test]
    fn numeric_ops_parse_decorated_values() {
        let r = record(&[("price", json!("€ 12,50")), ("stock", json!(0))]);
        assert!(passes(&r, &rule("price", FilterOp::GreaterThan, Some("10"))));
        assert!(passes(&r, &rule("price", FilterOp::LessThan, Some("12.51"))));
        assert!(!passes(&r, &rule("stock", FilterOp::GreaterThan, Some("0"))));
        assert!(!passes(&r, &rule("missing", FilterOp::LessThan, Some("5"))));
    }

    #[test]
    fn emptiness_and_conjunction() {
        let r = record(&[("ean", json!(" ")), ("name", json!("Boot"))]);
        let rules = vec![
            rule("ean", FilterOp::Empty, None),
            rule("name", FilterOp::NotEmpty, None),
        ];
        assert!(passes_all(&r, &rules));

        let rules = vec![rules[0].clone(), rule("name", FilterOp::Equals, Some("shoe"))];
        assert!(!passes_all(&r, &rules));
        assert_eq!(first_failing(&r, &rules).map(|r| r.op), Some(FilterOp::Equals));
    }
}
