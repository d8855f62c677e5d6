use crate::rest::{
    DestinationApi,
    error::ApiError,
    wire::{BatchItem, BatchRequest, BatchResponse, MetaQuery},
};
use async_trait::async_trait;
use model::{core::value::as_text, records::product::ProductData};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

type BatchFault = Box<dyn Fn(&BatchRequest, usize) -> Option<ApiError> + Send + Sync>;

/// In-process catalog speaking the batch protocol. Used by tests and dry
/// environments; supports scripted faults, latency and call counting.
pub struct MemoryDestination {
    key: String,
    state: Mutex<State>,
    batch_fault: Mutex<Option<BatchFault>>,
}

#[derive(Default)]
struct State {
    products: BTreeMap<u64, ProductData>,
    next_id: u64,
    requests: Vec<BatchRequest>,
    batch_calls: usize,
    lookup_calls: usize,
    ping_calls: usize,
    lookup_faults: VecDeque<ApiError>,
    ping_faults: VecDeque<ApiError>,
    ping_latency: Duration,
}

impl MemoryDestination {
    pub fn new(key: impl Into<String>) -> Self {
        MemoryDestination {
            key: key.into(),
            state: Mutex::new(State {
                next_id: 1,
                ..Default::default()
            }),
            batch_fault: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts a product directly, bypassing the API. Returns its id.
    pub fn seed(&self, mut product: ProductData) -> u64 {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        product.id = Some(id);
        state.products.insert(id, product);
        id
    }

    pub fn products(&self) -> Vec<ProductData> {
        self.state().products.values().cloned().collect()
    }

    pub fn product(&self, id: u64) -> Option<ProductData> {
        self.state().products.get(&id).cloned()
    }

    /// Every batch request that reached the destination, faulted or not.
    pub fn batch_requests(&self) -> Vec<BatchRequest> {
        self.state().requests.clone()
    }

    pub fn batch_calls(&self) -> usize {
        self.state().batch_calls
    }

    pub fn lookup_calls(&self) -> usize {
        self.state().lookup_calls
    }

    pub fn ping_calls(&self) -> usize {
        self.state().ping_calls
    }

    pub fn network_calls(&self) -> usize {
        let state = self.state();
        state.batch_calls + state.lookup_calls + state.ping_calls
    }

    /// Scripts batch failures. The hook sees each request and its 0-based
    /// call index; returning an error fails that call without applying it.
    pub fn fail_batches_with<F>(&self, hook: F)
    where
        F: Fn(&BatchRequest, usize) -> Option<ApiError> + Send + Sync + 'static,
    {
        *self
            .batch_fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Box::new(hook));
    }

    pub fn clear_batch_faults(&self) {
        *self
            .batch_fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    pub fn fail_next_lookup(&self, error: ApiError) {
        self.state().lookup_faults.push_back(error);
    }

    pub fn fail_next_ping(&self, error: ApiError) {
        self.state().ping_faults.push_back(error);
    }

    pub fn set_ping_latency(&self, latency: Duration) {
        self.state().ping_latency = latency;
    }

    fn scripted_batch_fault(&self, request: &BatchRequest, call: usize) -> Option<ApiError> {
        let hook = self
            .batch_fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        hook.as_ref().and_then(|f| f(request, call))
    }
}

impl State {
    fn sku_taken(&self, sku: &str, except: Option<u64>) -> bool {
        self.products
            .iter()
            .any(|(id, p)| Some(*id) != except && p.sku.as_deref() == Some(sku))
    }

    fn create(&mut self, mut product: ProductData) -> BatchItem {
        if let Some(sku) = product.sku.as_deref() {
            if self.sku_taken(sku, None) {
                return BatchItem::failed(
                    Some(0),
                    "product_invalid_sku",
                    format!("Invalid or duplicated SKU: {sku}"),
                );
            }
        }
        let id = self.next_id;
        self.next_id += 1;
        product.id = Some(id);
        self.products.insert(id, product.clone());
        BatchItem::ok(product)
    }

    fn update(&mut self, patch: ProductData) -> BatchItem {
        let Some(id) = patch.id.filter(|id| self.products.contains_key(id)) else {
            return BatchItem::failed(patch.id, "woocommerce_rest_product_invalid_id", "Invalid ID.");
        };
        if let Some(sku) = patch.sku.as_deref() {
            if self.sku_taken(sku, Some(id)) {
                return BatchItem::failed(
                    Some(id),
                    "product_invalid_sku",
                    format!("Invalid or duplicated SKU: {sku}"),
                );
            }
        }
        match self.products.get_mut(&id) {
            Some(existing) => {
                merge(existing, patch);
                BatchItem::ok(existing.clone())
            }
            None => BatchItem::failed(Some(id), "woocommerce_rest_product_invalid_id", "Invalid ID."),
        }
    }

    fn delete(&mut self, id: u64) -> BatchItem {
        match self.products.remove(&id) {
            Some(product) => BatchItem::ok(product),
            None => BatchItem::failed(Some(id), "woocommerce_rest_product_invalid_id", "Invalid ID."),
        }
    }
}

/// Applies a partial update: present scalars replace, non-empty lists
/// replace, meta entries merge by key.
fn merge(target: &mut ProductData, patch: ProductData) {
    macro_rules! take {
        ($($field:ident),*) => {
            $(if patch.$field.is_some() { target.$field = patch.$field; })*
        };
    }
    take!(
        name,
        sku,
        status,
        regular_price,
        sale_price,
        description,
        short_description,
        external_url,
        manage_stock,
        stock_quantity,
        stock_status
    );
    if !patch.categories.is_empty() {
        target.categories = patch.categories;
    }
    if !patch.images.is_empty() {
        target.images = patch.images;
    }
    if !patch.attributes.is_empty() {
        target.attributes = patch.attributes;
    }
    for entry in patch.meta_data {
        target.set_meta(&entry.key, entry.value);
    }
}

#[async_trait]
impl DestinationApi for MemoryDestination {
    fn key(&self) -> &str {
        &self.key
    }

    async fn ping(&self) -> Result<(), ApiError> {
        let latency = {
            let mut state = self.state();
            state.ping_calls += 1;
            if let Some(err) = state.ping_faults.pop_front() {
                return Err(err);
            }
            state.ping_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    async fn find_by_meta(
        &self,
        query: &MetaQuery,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ProductData>, ApiError> {
        let mut state = self.state();
        state.lookup_calls += 1;
        if let Some(err) = state.lookup_faults.pop_front() {
            return Err(err);
        }

        let per_page = per_page.max(1) as usize;
        let skip = (page.max(1) as usize - 1) * per_page;
        Ok(state
            .products
            .values()
            .filter(|p| {
                p.meta(&query.key)
                    .and_then(as_text)
                    .is_some_and(|v| query.values.contains(&v))
            })
            .skip(skip)
            .take(per_page)
            .cloned()
            .collect())
    }

    async fn batch(&self, request: &BatchRequest) -> Result<BatchResponse, ApiError> {
        let call = {
            let mut state = self.state();
            state.batch_calls += 1;
            state.requests.push(request.clone());
            state.batch_calls - 1
        };
        if let Some(err) = self.scripted_batch_fault(request, call) {
            return Err(err);
        }

        let mut state = self.state();
        Ok(BatchResponse {
            create: request.create.iter().cloned().map(|p| state.create(p)).collect(),
            update: request.update.iter().cloned().map(|p| state.update(p)).collect(),
            delete: request.delete.iter().map(|id| state.delete(*id)).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::records::product::{META_GUPID, ProductStatus};

    fn product(name: &str, sku: Option<&str>, gupid: &str) -> ProductData {
        let mut p = ProductData {
            name: Some(name.into()),
            sku: sku.map(str::to_string),
            ..Default::default()
        };
        p.set_meta(META_GUPID, gupid);
        p
    }

    #[tokio::test]
    async fn rejects_duplicate_sku_per_item() {
        let dest = MemoryDestination::new("mem");
        let response = dest
            .batch(&BatchRequest {
                create: vec![product("a", Some("S1"), "g1"), product("b", Some("S1"), "g2")],
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(response.create[0].destination_id().is_some());
        assert!(response.create[1].destination_id().is_none());
        assert_eq!(dest.products().len(), 1);
    }

    #[tokio::test]
    async fn update_merges_fields_and_meta() {
        let dest = MemoryDestination::new("mem");
        let id = dest.seed(product("old", Some("S1"), "g1"));

        let mut patch = ProductData {
            id: Some(id),
            status: Some(ProductStatus::Publish),
            ..Default::default()
        };
        patch.set_meta("_extra", "x");
        dest.batch(&BatchRequest {
            update: vec![patch],
            ..Default::default()
        })
        .await
        .unwrap();

        let stored = dest.product(id).unwrap();
        assert_eq!(stored.name.as_deref(), Some("old"));
        assert_eq!(stored.status, Some(ProductStatus::Publish));
        assert_eq!(stored.gupid().unwrap().as_str(), "g1");
        assert!(stored.meta("_extra").is_some());
    }

    #[tokio::test]
    async fn scripted_fault_skips_application_but_counts_call() {
        let dest = MemoryDestination::new("mem");
        dest.fail_batches_with(|_, call| (call == 0).then(ApiError::gateway_timeout));

        let request = BatchRequest {
            create: vec![product("a", None, "g1")],
            ..Default::default()
        };
        assert!(dest.batch(&request).await.is_err());
        assert!(dest.batch(&request).await.is_ok());
        assert_eq!(dest.batch_calls(), 2);
        assert_eq!(dest.products().len(), 1);
    }

    #[tokio::test]
    async fn meta_lookup_pages_in_id_order() {
        let dest = MemoryDestination::new("mem");
        for i in 0..5 {
            dest.seed(product(&format!("p{i}"), None, &format!("g{i}")));
        }
        let query = MetaQuery::new(META_GUPID, vec!["g0".into(), "g2".into(), "g4".into()]);

        let first = dest.find_by_meta(&query, 1, 2).await.unwrap();
        let second = dest.find_by_meta(&query, 2, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name.as_deref(), Some("p4"));
    }
}
