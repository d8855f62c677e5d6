use connectors::{feed::FeedIngestor, rest::memory::MemoryDestination};
use engine_config::settings::{ClientSettings, EngineSettings, JobSettings, ReconcileSettings};
use engine_core::{metrics::Metrics, rate_limit::KeyedRateLimiter, state::sled_store::SledRunStore};
use engine_processing::{cb::CircuitStore, client::DestinationClient};
use engine_runtime::{
    coordinator::RunCoordinator, destinations::DestinationRegistry, pool::WorkerPool,
    reconciler::StaleReconciler,
};
use model::{
    core::identifiers::{ConnectionId, RunId},
    execution::connection::{FeedConnection, FeedFormat, FeedSource, StaleAction, StalePolicy},
    records::{
        chunk::ChunkRef,
        feed::FeedRecord,
        product::{META_CONNECTION, ProductData},
    },
    transform::mapping::{FieldMapping, FieldTarget, MappingRules},
};
use serde_json::{Value, json};
use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tempfile::TempDir;

pub const DESTINATION: &str = "shop";

/// A full engine wired to one in-memory destination.
pub struct Stack {
    pub dir: TempDir,
    pub dest: Arc<MemoryDestination>,
    pub store: Arc<SledRunStore>,
    pub registry: Arc<DestinationRegistry>,
    pub coordinator: RunCoordinator,
    pub metrics: Metrics,
}

impl Stack {
    pub fn new() -> Self {
        Self::with_client(client_settings())
    }

    pub fn with_client(client: ClientSettings) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = EngineSettings {
            workers: 3,
            scratch_dir: Some(dir.path().join("scratch")),
            client,
            jobs: JobSettings {
                max_attempts: 2,
                timeout_secs: 30,
                backoff_step_secs: 0,
                finalize_recheck_ms: 10,
            },
            ..Default::default()
        };
        let metrics = Metrics::new();

        let dest = Arc::new(MemoryDestination::new(DESTINATION));
        let mut registry = DestinationRegistry::new(settings.client.clone(), metrics.clone());
        registry.register(dest.clone());
        let registry = Arc::new(registry);

        let store = Arc::new(SledRunStore::open(dir.path().join("state")).expect("open sled"));
        let ingestor =
            FeedIngestor::new(settings.scratch_root(), Duration::from_secs(5)).expect("ingestor");
        let pool = Arc::new(WorkerPool::new(settings.workers, &settings.jobs, metrics.clone()));
        let coordinator = RunCoordinator::new(
            store.clone(),
            ingestor,
            registry.clone(),
            pool,
            settings,
            metrics.clone(),
        );

        Stack {
            dir,
            dest,
            store,
            registry,
            coordinator,
            metrics,
        }
    }

    pub fn client(&self) -> Arc<DestinationClient> {
        self.registry.get(DESTINATION).expect("registered destination")
    }

    pub fn reconciler(&self) -> StaleReconciler {
        StaleReconciler::new(
            self.registry.clone(),
            ReconcileSettings {
                batch_size: 2,
                page_size: 3,
            },
        )
    }

    pub fn feed(&self, name: &str, rows: &[(&str, &str)]) -> PathBuf {
        write_feed(self.dir.path(), name, rows)
    }

    /// Destination products of one connection keyed by their GUPID.
    pub fn catalog(&self, connection: &str) -> BTreeMap<String, ProductData> {
        self.dest
            .products()
            .into_iter()
            .filter(|p| p.meta(META_CONNECTION).and_then(Value::as_str) == Some(connection))
            .filter_map(|p| p.gupid().map(|g| (g.to_string(), p)))
            .collect()
    }
}

pub fn client_settings() -> ClientSettings {
    ClientSettings {
        inter_batch_delay_ms: 0,
        rate_limit_per_minute: 0,
        ..Default::default()
    }
}

/// Standalone client over `dest` with its own circuit store.
pub fn memory_client(dest: Arc<MemoryDestination>, circuit_ttl: Duration) -> DestinationClient {
    DestinationClient::new(
        dest,
        Arc::new(CircuitStore::new(circuit_ttl)),
        Arc::new(KeyedRateLimiter::unlimited()),
        client_settings(),
        Metrics::new(),
    )
}

pub fn connection(id: &str, feed: &Path, chunk_size: usize) -> FeedConnection {
    let map = |source: &str, target: FieldTarget| FieldMapping {
        source: source.into(),
        target,
        default: None,
    };
    FeedConnection {
        id: ConnectionId::new(id),
        destination: DESTINATION.into(),
        feed: FeedSource {
            url: feed.display().to_string(),
            format: FeedFormat::Csv,
            delimiter: ',',
            enclosure: '"',
            record_path: None,
        },
        rules: MappingRules {
            id_field: "id".into(),
            field_mappings: vec![
                map("title", FieldTarget::Name),
                map("sku", FieldTarget::Sku),
                map("price", FieldTarget::RegularPrice),
            ],
            ..Default::default()
        },
        chunk_size: Some(chunk_size),
        stale_policy: Some(StalePolicy {
            action: StaleAction::Delete,
            stale_after_days: 30,
        }),
        import_interval_minutes: None,
    }
}

/// CSV feed with `id,title,sku,price` columns, one row per `(id, price)`.
pub fn write_feed(dir: &Path, name: &str, rows: &[(&str, &str)]) -> PathBuf {
    let mut body = String::from("id,title,sku,price\n");
    for (id, price) in rows {
        body.push_str(&format!("{id},Product {id},SKU-{id},{price}\n"));
    }
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write feed");
    path
}

pub fn row(id: &str, price: &str) -> Value {
    json!({"id": id, "title": format!("Product {id}"), "sku": format!("SKU-{id}"), "price": price})
}

/// Writes an already-chunked JSONL file the way the ingestor does.
pub fn write_chunk(dir: &Path, run_id: &RunId, sequence: u32, rows: &[Value]) -> ChunkRef {
    let path = dir.join(format!("chunk-{sequence:06}.jsonl"));
    let mut file = std::fs::File::create(&path).expect("create chunk");
    for (i, row) in rows.iter().enumerate() {
        let Value::Object(fields) = row.clone() else {
            panic!("rows must be objects");
        };
        let record = FeedRecord::new(i as u64 + 1, fields);
        writeln!(file, "{}", serde_json::to_string(&record).expect("encode")).expect("write");
    }
    ChunkRef {
        run_id: run_id.clone(),
        sequence,
        path,
        record_count: rows.len(),
    }
}
