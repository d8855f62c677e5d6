use crate::{coordinator::RunCoordinator, destinations::DestinationRegistry, pool::WorkerPool};
use connectors::{feed::FeedIngestor, rest::memory::MemoryDestination};
use engine_config::settings::{ClientSettings, EngineSettings, JobSettings};
use engine_core::{metrics::Metrics, state::sled_store::SledRunStore};
use model::{
    core::identifiers::ConnectionId,
    execution::connection::{FeedConnection, FeedFormat, FeedSource, StaleAction, StalePolicy},
    transform::mapping::{FieldMapping, FieldTarget, MappingRules},
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tempfile::TempDir;

pub(crate) struct Harness {
    pub dir: TempDir,
    pub dest: Arc<MemoryDestination>,
    pub store: Arc<SledRunStore>,
    pub registry: Arc<DestinationRegistry>,
    pub coordinator: RunCoordinator,
}

impl Harness {
    pub fn scratch_root(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }
}

pub(crate) fn settings(dir: &Path) -> EngineSettings {
    EngineSettings {
        workers: 2,
        scratch_dir: Some(dir.join("scratch")),
        client: ClientSettings {
            inter_batch_delay_ms: 0,
            rate_limit_per_minute: 0,
            ..Default::default()
        },
        jobs: JobSettings {
            max_attempts: 2,
            timeout_secs: 30,
            backoff_step_secs: 0,
            finalize_recheck_ms: 10,
        },
        ..Default::default()
    }
}

pub(crate) fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    let metrics = Metrics::new();

    let dest = Arc::new(MemoryDestination::new("shop"));
    let mut registry = DestinationRegistry::new(settings.client.clone(), metrics.clone());
    registry.register(dest.clone());
    let registry = Arc::new(registry);

    let store = Arc::new(SledRunStore::open(dir.path().join("state")).unwrap());
    let ingestor = FeedIngestor::new(settings.scratch_root(), Duration::from_secs(5)).unwrap();
    let pool = Arc::new(WorkerPool::new(settings.workers, &settings.jobs, metrics.clone()));
    let coordinator = RunCoordinator::new(
        store.clone(),
        ingestor,
        registry.clone(),
        pool,
        settings,
        metrics,
    );

    Harness {
        dir,
        dest,
        store,
        registry,
        coordinator,
    }
}

pub(crate) fn connection(id: &str, feed: &Path) -> FeedConnection {
    let map = |source: &str, target: FieldTarget| FieldMapping {
        source: source.into(),
        target,
        default: None,
    };
    FeedConnection {
        id: ConnectionId::new(id),
        destination: "shop".into(),
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
        chunk_size: Some(2),
        stale_policy: Some(StalePolicy {
            action: StaleAction::Delete,
            stale_after_days: 30,
        }),
        import_interval_minutes: None,
    }
}

/// Writes a CSV feed with `id,title,sku,price` rows.
pub(crate) fn write_feed(dir: &Path, name: &str, rows: &[(&str, &str)]) -> PathBuf {
    let mut body = String::from("id,title,sku,price\n");
    for (id, price) in rows {
        body.push_str(&format!("{id},Product {id},SKU-{id},{price}\n"));
    }
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}
