use crate::core::value::as_text;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One record of a product feed, keyed by the feed's column or property names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    /// 1-based position of the record in the source file.
    pub position: u64,
    pub fields: Map<String, Value>,
}

impl FeedRecord {
    pub fn new(position: u64, fields: Map<String, Value>) -> Self {
        FeedRecord { position, fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).or_else(|| {
            self.fields
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(field))
                .map(|(_, value)| value)
        })
    }

    pub fn text(&self, field: &str) -> Option<String> {
        self.get(field).and_then(as_text)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|v| as_text(v).is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_falls_back_to_case_insensitive() {
        let mut fields = Map::new();
        fields.insert("Product_Name".into(), json!("Boot"));
        let record = FeedRecord::new(1, fields);

        assert_eq!(record.text("Product_Name").as_deref(), Some("Boot"));
        assert_eq!(record.text("product_name").as_deref(), Some("Boot"));
        assert_eq!(record.text("missing"), None);
    }
}
