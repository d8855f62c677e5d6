use crate::core::identifiers::Gupid;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const META_GUPID: &str = "_feedsync_gupid";
pub const META_CONNECTION: &str = "_feedsync_connection";
pub const META_LAST_SEEN: &str = "_feedsync_last_seen";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    Pending,
    Private,
    Publish,
    Future,
    Trash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    InStock,
    OutOfStock,
    OnBackorder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAttribute {
    pub name: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: Value,
}

impl MetaEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        MetaEntry {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Product document as exchanged with the destination catalog API.
///
/// Every field is optional so the same type serves creates, partial updates
/// and responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProductStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regular_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manage_stock: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_status: Option<StockStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<ProductAttribute>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub meta_data: Vec<MetaEntry>,
}

impl ProductData {
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.meta_data
            .iter()
            .find(|m| m.key == key)
            .map(|m| &m.value)
    }

    /// Inserts or replaces a meta entry.
    pub fn set_meta(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.meta_data.iter_mut().find(|m| m.key == key) {
            Some(entry) => entry.value = value,
            None => self.meta_data.push(MetaEntry::new(key, value)),
        }
    }

    pub fn gupid(&self) -> Option<Gupid> {
        self.meta(META_GUPID)
            .and_then(Value::as_str)
            .map(Gupid::from_stored)
    }

    /// Last-seen stamp in unix seconds. Values that are not integers read as
    /// missing.
    pub fn last_seen(&self) -> Option<i64> {
        match self.meta(META_LAST_SEEN)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }
}

/// Transformer output for one feed record, ready for identity resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationPayload {
    pub source_id: String,
    pub gupid: Gupid,
    pub product: ProductData,
}
