use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};

/// Destination field a feed column is copied into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldTarget {
    Name,
    Sku,
    RegularPrice,
    SalePrice,
    Description,
    ShortDescription,
    StockQuantity,
    Images,
    ExternalUrl,
    Meta(String),
}

impl FromStr for FieldTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(key) = s.strip_prefix("meta:") {
            let key = key.trim();
            if key.is_empty() {
                return Err("meta target requires a key, e.g. `meta:brand`".into());
            }
            return Ok(FieldTarget::Meta(key.to_string()));
        }

        match s.trim().to_lowercase().as_str() {
            "name" | "title" => Ok(FieldTarget::Name),
            "sku" => Ok(FieldTarget::Sku),
            "regular_price" | "price" => Ok(FieldTarget::RegularPrice),
            "sale_price" => Ok(FieldTarget::SalePrice),
            "description" => Ok(FieldTarget::Description),
            "short_description" => Ok(FieldTarget::ShortDescription),
            "stock_quantity" | "stock" => Ok(FieldTarget::StockQuantity),
            "images" | "image" => Ok(FieldTarget::Images),
            "external_url" | "url" => Ok(FieldTarget::ExternalUrl),
            other => Err(format!("Unknown field target: {other}")),
        }
    }
}

impl TryFrom<String> for FieldTarget {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldTarget> for String {
    fn from(target: FieldTarget) -> Self {
        target.to_string()
    }
}

impl fmt::Display for FieldTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldTarget::Name => f.write_str("name"),
            FieldTarget::Sku => f.write_str("sku"),
            FieldTarget::RegularPrice => f.write_str("regular_price"),
            FieldTarget::SalePrice => f.write_str("sale_price"),
            FieldTarget::Description => f.write_str("description"),
            FieldTarget::ShortDescription => f.write_str("short_description"),
            FieldTarget::StockQuantity => f.write_str("stock_quantity"),
            FieldTarget::Images => f.write_str("images"),
            FieldTarget::ExternalUrl => f.write_str("external_url"),
            FieldTarget::Meta(key) => write!(f, "meta:{key}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source: String,
    pub target: FieldTarget,
    /// Used when the source cell is missing or blank.
    #[serde(default)]
    pub default: Option<String>,
}

/// Splits one source field into category tokens and maps each token to a
/// destination category id. Tokens without a mapping are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMapping {
    pub source: String,
    #[serde(default = "default_category_delimiter")]
    pub delimiter: String,
    #[serde(default)]
    pub map: HashMap<String, u64>,
}

fn default_category_delimiter() -> String {
    ">".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub source: String,
    pub name: String,
    #[serde(default = "default_attribute_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_attribute_delimiter() -> String {
    "|".to_string()
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    Empty,
    NotEmpty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub field: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value: Option<String>,
}

/// Everything the transformer needs from a connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingRules {
    /// Source field holding the feed's own record id.
    pub id_field: String,
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub category_mappings: Vec<CategoryMapping>,
    #[serde(default)]
    pub attribute_mappings: Vec<AttributeMapping>,
    #[serde(default)]
    pub filter_rules: Vec<FilterRule>,
}
