use model::records::product::ProductData;
use serde::{Deserialize, Serialize};

/// Body of the batch endpoint: `{create: [], update: [], delete: []}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub create: Vec<ProductData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update: Vec<ProductData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete: Vec<u64>,
}

impl BatchRequest {
    pub fn len(&self) -> usize {
        self.create.len() + self.update.len() + self.delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub create: Vec<BatchItem>,
    #[serde(default)]
    pub update: Vec<BatchItem>,
    #[serde(default)]
    pub delete: Vec<BatchItem>,
}

/// One entry of a batch response. Success and failure share a shape: a
/// failed entry carries `error` and usually `id: 0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(flatten)]
    pub product: ProductData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

impl BatchItem {
    pub fn ok(product: ProductData) -> Self {
        BatchItem {
            product,
            error: None,
        }
    }

    pub fn failed(id: Option<u64>, code: &str, message: impl Into<String>) -> Self {
        BatchItem {
            product: ProductData {
                id,
                ..Default::default()
            },
            error: Some(ItemError {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }

    /// The destination id of a successfully persisted item.
    pub fn destination_id(&self) -> Option<u64> {
        if self.error.is_some() {
            return None;
        }
        self.product.id.filter(|id| *id > 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Products whose meta entry `key` equals any of `values`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaQuery {
    pub key: String,
    pub values: Vec<String>,
}

impl MetaQuery {
    pub fn new(key: impl Into<String>, values: Vec<String>) -> Self {
        MetaQuery {
            key: key.into(),
            values,
        }
    }

    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        MetaQuery::new(key, vec![value.into()])
    }
}
