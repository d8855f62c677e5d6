use async_trait::async_trait;
use error::ApiError;
use model::records::product::ProductData;
use wire::{BatchRequest, BatchResponse, MetaQuery};

pub mod error;
pub mod memory;
pub mod woo;
pub mod wire;

/// Raw product-catalog API of one destination. Implementations perform the
/// call and classify failures; resilience lives in the client wrapping them.
#[async_trait]
pub trait DestinationApi: Send + Sync {
    /// Stable identity of the destination, used to key shared circuit and
    /// rate-limit state.
    fn key(&self) -> &str;

    /// Cheapest authenticated call the destination offers.
    async fn ping(&self) -> Result<(), ApiError>;

    /// One page (1-based) of products whose meta matches `query`, ordered by
    /// destination id.
    async fn find_by_meta(
        &self,
        query: &MetaQuery,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ProductData>, ApiError>;

    async fn batch(&self, request: &BatchRequest) -> Result<BatchResponse, ApiError>;
}
