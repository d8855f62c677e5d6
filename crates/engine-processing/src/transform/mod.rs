use model::{
    core::identifiers::{ConnectionId, Gupid},
    records::{
        feed::FeedRecord,
        product::{DestinationPayload, META_CONNECTION, META_GUPID, ProductData},
    },
    transform::mapping::{FieldMapping, MappingRules},
};

pub mod error;
pub mod fields;
pub mod filter;

pub use error::TransformError;

/// Result of transforming one feed record.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    Ok(DestinationPayload),
    /// Filtered out or missing required fields. Not an error.
    Skip(String),
    Fail(TransformError),
}

/// Maps feed records to destination payloads for one connection.
///
/// Pure: the same record and rules always give the same outcome.
#[derive(Debug, Clone)]
pub struct Transformer {
    connection_id: ConnectionId,
    rules: MappingRules,
}

impl Transformer {
    pub fn new(connection_id: ConnectionId, rules: MappingRules) -> Self {
        Transformer {
            connection_id,
            rules,
        }
    }

    pub fn apply(&self, record: &FeedRecord) -> TransformOutcome {
        if let Some(rule) = filter::first_failing(record, &self.rules.filter_rules) {
            return TransformOutcome::Skip(format!(
                "filtered out by rule on '{}' ({:?})",
                rule.field, rule.op
            ));
        }

        let Some(source_id) = record.text(&self.rules.id_field) else {
            return TransformOutcome::Skip(format!(
                "missing record id in field '{}'",
                self.rules.id_field
            ));
        };

        let mut product = ProductData::default();
        for mapping in &self.rules.field_mappings {
            let Some(value) = record.text(&mapping.source).or_else(|| default_value(mapping)) else {
                continue;
            };
            if let Err(e) = fields::apply_field(&mut product, mapping, value) {
                return TransformOutcome::Fail(e);
            }
        }

        if product.name.is_none() {
            return TransformOutcome::Skip("no mappable name".into());
        }
        if product.regular_price.is_none() {
            return TransformOutcome::Skip("no mappable price".into());
        }

        product.categories = fields::categories(record, &self.rules.category_mappings);
        product.attributes = fields::attributes(record, &self.rules.attribute_mappings);

        let gupid = Gupid::compute(&self.connection_id, &source_id);
        product.set_meta(META_GUPID, gupid.as_str());
        product.set_meta(META_CONNECTION, self.connection_id.as_str());

        TransformOutcome::Ok(DestinationPayload {
            source_id,
            gupid,
            product,
        })
    }
}

fn default_value(mapping: &FieldMapping) -> Option<String> {
    let default = mapping.default.as_deref()?.trim();
    (!default.is_empty()).then(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::transform::mapping::{FieldTarget, FilterOp, FilterRule};
    use serde_json::{Value, json};

    fn record(value: Value) -> FeedRecord {
        let Value::Object(fields) = value else {
            panic!("expected object");
        };
        FeedRecord::new(1, fields)
    }

    fn rules() -> MappingRules {
        let map = |source: &str, target: FieldTarget| FieldMapping {
            source: source.into(),
            target,
            default: None,
        };
        MappingRules {
            id_field: "id".into(),
            field_mappings: vec![
                map("title", FieldTarget::Name),
                map("price", FieldTarget::RegularPrice),
                map("stock", FieldTarget::StockQuantity),
                FieldMapping {
                    source: "brand".into(),
                    target: FieldTarget::Meta("brand".into()),
                    default: Some("Generic".into()),
                },
            ],
            filter_rules: vec![FilterRule {
                field: "available".into(),
                op: FilterOp::NotEquals,
                value: Some("no".into()),
            }],
            ..Default::default()
        }
    }

    fn transformer() -> Transformer {
        Transformer::new(ConnectionId::new("acme"), rules())
    }

    #[test]
    fn maps_record_and_tags_identity() {
        let outcome = transformer().apply(&record(json!({
            "id": "A1", "title": "Trail Boot", "price": "89,9", "stock": "4"
        })));

        let TransformOutcome::Ok(payload) = outcome else {
            panic!("expected payload, got {outcome:?}");
        };
        assert_eq!(payload.source_id, "A1");
        assert_eq!(payload.gupid, Gupid::compute(&ConnectionId::new("acme"), "A1"));
        assert_eq!(payload.product.regular_price.as_deref(), Some("89.90"));
        assert_eq!(payload.product.gupid(), Some(payload.gupid.clone()));
        assert_eq!(payload.product.meta(META_CONNECTION), Some(&json!("acme")));
        assert_eq!(payload.product.meta("brand"), Some(&json!("Generic")));
    }

    #[test]
    fn filtered_and_incomplete_records_are_skipped() {
        let t = transformer();
        assert!(matches!(
            t.apply(&record(json!({"id": "1", "title": "x", "price": "1", "available": "NO"}))),
            TransformOutcome::Skip(_)
        ));
        assert!(matches!(
            t.apply(&record(json!({"id": "1", "price": "1"}))),
            TransformOutcome::Skip(_)
        ));
        assert!(matches!(
            t.apply(&record(json!({"title": "x", "price": "1"}))),
            TransformOutcome::Skip(_)
        ));
    }

    #[test]
    fn bad_numbers_fail_the_record() {
        let outcome = transformer().apply(&record(json!({
            "id": "1", "title": "x", "price": "1", "stock": "lots"
        })));
        assert!(matches!(
            outcome,
            TransformOutcome::Fail(TransformError::InvalidInteger { .. })
        ));
    }
}
