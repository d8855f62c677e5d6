use crate::transform::error::TransformError;
use model::{
    core::value::parse_decimal,
    records::{
        feed::FeedRecord,
        product::{CategoryRef, ImageRef, ProductAttribute, ProductData, StockStatus},
    },
    transform::mapping::{AttributeMapping, CategoryMapping, FieldMapping, FieldTarget},
};
use std::collections::HashSet;

/// Copies one mapped value into the product. `value` is already trimmed and
/// non-empty.
pub fn apply_field(
    product: &mut ProductData,
    mapping: &FieldMapping,
    value: String,
) -> Result<(), TransformError> {
    match &mapping.target {
        FieldTarget::Name => product.name = Some(value),
        FieldTarget::Sku => product.sku = Some(value),
        FieldTarget::RegularPrice => product.regular_price = Some(price(&mapping.source, &value)?),
        FieldTarget::SalePrice => product.sale_price = Some(price(&mapping.source, &value)?),
        FieldTarget::Description => product.description = Some(value),
        FieldTarget::ShortDescription => product.short_description = Some(value),
        FieldTarget::ExternalUrl => product.external_url = Some(value),
        FieldTarget::StockQuantity => {
            let quantity = stock(&mapping.source, &value)?;
            product.manage_stock = Some(true);
            product.stock_quantity = Some(quantity);
            product.stock_status = Some(if quantity > 0 {
                StockStatus::InStock
            } else {
                StockStatus::OutOfStock
            });
        }
        FieldTarget::Images => {
            product.images = value
                .split([',', '|'])
                .map(str::trim)
                .filter(|src| !src.is_empty())
                .map(|src| ImageRef { src: src.to_string() })
                .collect();
        }
        FieldTarget::Meta(key) => product.set_meta(key, value),
    }
    Ok(())
}

/// Normalised price with two decimals.
fn price(field: &str, raw: &str) -> Result<String, TransformError> {
    parse_decimal(raw)
        .filter(|p| *p >= 0.0)
        .map(|p| format!("{p:.2}"))
        .ok_or_else(|| TransformError::InvalidNumber {
            field: field.to_string(),
            value: raw.to_string(),
        })
}

fn stock(field: &str, raw: &str) -> Result<i64, TransformError> {
    let invalid = || TransformError::InvalidInteger {
        field: field.to_string(),
        value: raw.to_string(),
    };
    let quantity = parse_decimal(raw).ok_or_else(invalid)?;
    if quantity.fract() != 0.0 {
        return Err(invalid());
    }
    Ok(quantity as i64)
}

/// Category ids for every mapped token, first occurrence order, no
/// duplicates. Unmapped tokens are dropped.
pub fn categories(record: &FeedRecord, mappings: &[CategoryMapping]) -> Vec<CategoryRef> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for mapping in mappings {
        let Some(raw) = record.text(&mapping.source) else {
            continue;
        };
        for token in raw.split(mapping.delimiter.as_str()).map(str::trim) {
            if token.is_empty() {
                continue;
            }
            let id = mapping.map.get(token).copied().or_else(|| {
                mapping
                    .map
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(token))
                    .map(|(_, id)| *id)
            });
            if let Some(id) = id {
                if seen.insert(id) {
                    out.push(CategoryRef { id });
                }
            }
        }
    }
    out
}

pub fn attributes(record: &FeedRecord, mappings: &[AttributeMapping]) -> Vec<ProductAttribute> {
    mappings
        .iter()
        .filter_map(|mapping| {
            let raw = record.text(&mapping.source)?;
            let options: Vec<String> = raw
                .split(mapping.delimiter.as_str())
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
            (!options.is_empty()).then(|| ProductAttribute {
                name: mapping.name.clone(),
                options,
                visible: mapping.visible,
            })
        })
        .collect()
}
