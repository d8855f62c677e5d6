use crate::{
    client::DestinationClient,
    error::{ClientError, IdentityError},
    retry::classify_lookup_error,
};
use connectors::rest::wire::MetaQuery;
use engine_core::retry::RetryPolicy;
use model::{
    core::identifiers::{ConnectionId, Gupid},
    records::product::{DestinationPayload, META_GUPID, ProductData},
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::{debug, warn};

/// Payloads partitioned by whether the destination already has them.
#[derive(Debug, Default)]
pub struct Resolution {
    pub existing: HashMap<Gupid, u64>,
    pub to_create: Vec<DestinationPayload>,
    /// Carry the destination id and never a SKU.
    pub to_update: Vec<DestinationPayload>,
}

/// Decides create vs update by GUPID lookup against the destination.
pub struct IdentityResolver {
    client: Arc<DestinationClient>,
    retry: RetryPolicy,
}

impl IdentityResolver {
    pub fn new(client: Arc<DestinationClient>) -> Self {
        IdentityResolver {
            client,
            retry: RetryPolicy::for_lookups(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn resolve(
        &self,
        connection_id: &ConnectionId,
        payloads: Vec<DestinationPayload>,
    ) -> Result<Resolution, IdentityError> {
        let mut gupids = Vec::new();
        let mut seen = HashSet::new();
        for payload in &payloads {
            if seen.insert(&payload.gupid) {
                gupids.push(payload.gupid.as_str().to_string());
            }
        }

        let mut existing: HashMap<Gupid, u64> = HashMap::new();
        let group = self.client.settings().lookup_page_size.max(1) as usize;
        for values in gupids.chunks(group) {
            let query = MetaQuery::new(META_GUPID, values.to_vec());
            for product in self.lookup_all(&query).await? {
                let (Some(id), Some(gupid)) = (product.id, product.gupid()) else {
                    continue;
                };
                match existing.get(&gupid).copied() {
                    Some(kept) if kept != id => {
                        warn!(
                            connection_id = %connection_id,
                            gupid = %gupid,
                            kept = kept.min(id),
                            duplicate = kept.max(id),
                            "Multiple destination products share a GUPID"
                        );
                        existing.insert(gupid, kept.min(id));
                    }
                    Some(_) => {}
                    None => {
                        existing.insert(gupid, id);
                    }
                }
            }
        }

        let mut resolution = Resolution::default();
        for mut payload in payloads {
            match existing.get(&payload.gupid) {
                Some(id) => {
                    payload.product.id = Some(*id);
                    payload.product.sku = None;
                    resolution.to_update.push(payload);
                }
                None => resolution.to_create.push(payload),
            }
        }
        debug!(
            connection_id = %connection_id,
            found = existing.len(),
            to_create = resolution.to_create.len(),
            to_update = resolution.to_update.len(),
            "Identity resolved"
        );
        resolution.existing = existing;
        Ok(resolution)
    }

    /// Pages through one lookup query, retrying each page on transient
    /// failures.
    async fn lookup_all(
        &self,
        query: &MetaQuery,
    ) -> Result<Vec<ProductData>, IdentityError> {
        let per_page = self.client.settings().lookup_page_size.max(1) as usize;
        let mut found = Vec::new();
        let mut page = 1;
        loop {
            let items = self
                .retry
                .run(
                    || self.client.find_by_meta(query, page),
                    |e: &ClientError| classify_lookup_error(e),
                )
                .await
                .map_err(|e| IdentityError::LookupUnavailable {
                    source: e.into_inner(),
                })?;
            let short = items.len() < per_page;
            found.extend(items);
            if short {
                return Ok(found);
            }
            page += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{client_for, test_settings};
    use connectors::rest::{error::ApiError, memory::MemoryDestination};
    use std::time::Duration;

    fn payload(conn: &ConnectionId, source_id: &str) -> DestinationPayload {
        let gupid = Gupid::compute(conn, source_id);
        let mut product = ProductData {
            name: Some(source_id.into()),
            sku: Some(format!("SKU-{source_id}")),
            ..Default::default()
        };
        product.set_meta(META_GUPID, gupid.as_str());
        DestinationPayload {
            source_id: source_id.into(),
            gupid,
            product,
        }
    }

    fn resolver(dest: Arc<MemoryDestination>) -> IdentityResolver {
        IdentityResolver::new(Arc::new(client_for(dest, test_settings())))
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)))
    }

    #[tokio::test]
    async fn partitions_and_strips_sku_from_updates() {
        let conn = ConnectionId::new("acme");
        let dest = Arc::new(MemoryDestination::new("shop"));
        let known = payload(&conn, "1");
        let id = dest.seed(known.product.clone());

        let resolution = resolver(dest)
            .resolve(&conn, vec![known.clone(), payload(&conn, "2")])
            .await
            .unwrap();

        assert_eq!(resolution.existing.get(&known.gupid), Some(&id));
        assert_eq!(resolution.to_create.len(), 1);
        assert_eq!(resolution.to_update.len(), 1);
        assert_eq!(resolution.to_update[0].product.id, Some(id));
        assert_eq!(resolution.to_update[0].product.sku, None);
        assert!(resolution.to_create[0].product.sku.is_some());
    }

    #[tokio::test]
    async fn duplicates_resolve_to_lowest_id() {
        let conn = ConnectionId::new("acme");
        let dest = Arc::new(MemoryDestination::new("shop"));
        let p = payload(&conn, "1");
        let first = dest.seed(p.product.clone());
        dest.seed(p.product.clone());

        let resolution = resolver(dest).resolve(&conn, vec![p.clone()]).await.unwrap();
        assert_eq!(resolution.existing.get(&p.gupid), Some(&first));
    }

    #[tokio::test]
    async fn transient_lookup_failure_is_retried() {
        let conn = ConnectionId::new("acme");
        let dest = Arc::new(MemoryDestination::new("shop"));
        dest.fail_next_lookup(ApiError::server(502, "bad gateway"));

        let resolution = resolver(dest.clone())
            .resolve(&conn, vec![payload(&conn, "1")])
            .await
            .unwrap();
        assert_eq!(resolution.to_create.len(), 1);
        assert_eq!(dest.lookup_calls(), 2);
    }

    #[tokio::test]
    async fn unavailable_lookup_raises_instead_of_creating() {
        let conn = ConnectionId::new("acme");
        let dest = Arc::new(MemoryDestination::new("shop"));
        dest.fail_next_lookup(ApiError::auth("revoked"));

        let err = resolver(dest.clone())
            .resolve(&conn, vec![payload(&conn, "1")])
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::LookupUnavailable { .. }));
        assert_eq!(dest.lookup_calls(), 1);
    }
}
