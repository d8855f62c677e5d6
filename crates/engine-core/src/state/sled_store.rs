use crate::{error::StateError, state::RunStore};
use async_trait::async_trait;
use chrono::Utc;
use model::{
    core::identifiers::{ConnectionId, RunId},
    execution::run::{CounterDelta, ImportRun, ItemOutcome, ItemResult, RunStatus},
};
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree,
};
use std::path::Path;
use tracing::debug;

type TxResult<T> = Result<T, ConflictableTransactionError<StateError>>;

pub struct SledRunStore {
    db: sled::Db,
}

impl SledRunStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    #[inline]
    fn run_key(run_id: &RunId) -> String {
        format!("run:{run_id}")
    }

    #[inline]
    fn active_key(connection: &ConnectionId) -> String {
        format!("active:{connection}")
    }

    #[inline]
    fn transform_key(run_id: &RunId, sequence: u32) -> String {
        format!("ledger:{run_id}:{sequence:08}:transform")
    }

    #[inline]
    fn item_key(run_id: &RunId, sequence: u32, item: &str) -> String {
        format!("ledger:{run_id}:{sequence:08}:item:{item}")
    }

    fn abort(err: StateError) -> ConflictableTransactionError<StateError> {
        ConflictableTransactionError::Abort(err)
    }

    fn read_run(tx: &TransactionalTree, run_id: &RunId) -> TxResult<ImportRun> {
        let bytes = tx
            .get(Self::run_key(run_id))?
            .ok_or_else(|| Self::abort(StateError::RunNotFound(run_id.to_string())))?;
        bincode::deserialize(&bytes).map_err(|e| Self::abort(e.into()))
    }

    fn write_run(tx: &TransactionalTree, run: &ImportRun) -> TxResult<()> {
        let bytes = bincode::serialize(run).map_err(|e| Self::abort(e.into()))?;
        tx.insert(Self::run_key(&run.id).as_bytes(), bytes)?;
        Ok(())
    }

    fn invalid(run: &ImportRun, next: RunStatus) -> ConflictableTransactionError<StateError> {
        Self::abort(StateError::InvalidTransition {
            run: run.id.to_string(),
            from: run.status.to_string(),
            to: next.to_string(),
        })
    }

    /// Runs `f` against the run inside a transaction and stores the result.
    fn mutate<F>(&self, run_id: &RunId, f: F) -> Result<ImportRun, StateError>
    where
        F: Fn(&mut ImportRun) -> Result<(), StateError>,
    {
        let result = self.db.transaction(|tx| {
            let mut run = Self::read_run(tx, run_id)?;
            f(&mut run).map_err(Self::abort)?;
            Self::write_run(tx, &run)?;
            Ok(run)
        });
        flatten(result)
    }
}

fn flatten<T>(result: Result<T, TransactionError<StateError>>) -> Result<T, StateError> {
    match result {
        Ok(v) => Ok(v),
        Err(TransactionError::Abort(e)) => Err(e),
        Err(TransactionError::Storage(e)) => Err(StateError::Storage(e)),
    }
}

#[async_trait]
impl RunStore for SledRunStore {
    async fn create_run(&self, run: &ImportRun) -> Result<(), StateError> {
        let active_key = Self::active_key(&run.connection_id);

        // Check-then-set on the connection's active slot; concurrent creators
        // conflict and sled retries the loser, which then sees the slot taken.
        let result = self.db.transaction(|tx| {
            if let Some(holder) = tx.get(&active_key)? {
                let holder = String::from_utf8_lossy(&holder).into_owned();
                let holder_id = RunId::new(holder.clone());
                let still_active = match tx.get(Self::run_key(&holder_id))? {
                    Some(bytes) => {
                        let existing: ImportRun =
                            bincode::deserialize(&bytes).map_err(|e| Self::abort(e.into()))?;
                        !existing.status.is_terminal()
                    }
                    None => false,
                };
                if still_active {
                    return Err(Self::abort(StateError::RunAlreadyActive {
                        connection: run.connection_id.to_string(),
                        run: holder,
                    }));
                }
            }

            Self::write_run(tx, run)?;
            tx.insert(active_key.as_bytes(), run.id.as_str().as_bytes())?;
            Ok(())
        });

        flatten(result)?;
        debug!(run_id = %run.id, connection_id = %run.connection_id, "Run stored");
        Ok(())
    }

    async fn load_run(&self, run_id: &RunId) -> Result<Option<ImportRun>, StateError> {
        match self.db.get(Self::run_key(run_id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn transition(&self, run_id: &RunId, next: RunStatus) -> Result<ImportRun, StateError> {
        let result = self.db.transaction(|tx| {
            let mut run = Self::read_run(tx, run_id)?;
            if next.is_terminal() || !run.status.can_transition_to(next) {
                return Err(Self::invalid(&run, next));
            }
            run.status = next;
            Self::write_run(tx, &run)?;
            Ok(run)
        });
        flatten(result)
    }

    async fn record_chunk_count(&self, run_id: &RunId, chunks: u32) -> Result<(), StateError> {
        self.mutate(run_id, |run| {
            run.chunk_count = Some(chunks);
            Ok(())
        })
        .map(|_| ())
    }

    async fn record_transform(
        &self,
        run_id: &RunId,
        sequence: u32,
        delta: &CounterDelta,
        errors: &[String],
    ) -> Result<bool, StateError> {
        let ledger_key = Self::transform_key(run_id, sequence);

        let result = self.db.transaction(|tx| {
            if tx.get(&ledger_key)?.is_some() {
                return Ok(false);
            }
            let mut run = Self::read_run(tx, run_id)?;
            run.counters.apply(delta);
            for error in errors {
                run.push_error(error.as_str());
            }
            Self::write_run(tx, &run)?;
            tx.insert(ledger_key.as_bytes(), &[1u8][..])?;
            Ok(true)
        });
        flatten(result)
    }

    async fn record_items(
        &self,
        run_id: &RunId,
        sequence: u32,
        items: &[ItemResult],
    ) -> Result<usize, StateError> {
        if items.is_empty() {
            return Ok(0);
        }

        let result = self.db.transaction(|tx| {
            let mut run = Self::read_run(tx, run_id)?;
            let mut changed = 0;
            for item in items {
                let key = Self::item_key(run_id, sequence, &item.key);
                let previous: Option<ItemOutcome> = match tx.get(&key)? {
                    Some(bytes) => {
                        Some(bincode::deserialize(&bytes).map_err(|e| Self::abort(e.into()))?)
                    }
                    None => None,
                };
                if !run.counters.settle(previous, item.outcome) {
                    continue;
                }
                if previous.is_none()
                    && let Some(error) = &item.error
                {
                    run.push_error(error.as_str());
                }
                let bytes = bincode::serialize(&item.outcome).map_err(|e| Self::abort(e.into()))?;
                tx.insert(key.as_bytes(), bytes)?;
                changed += 1;
            }
            if changed > 0 {
                Self::write_run(tx, &run)?;
            }
            Ok(changed)
        });
        flatten(result)
    }

    async fn append_error(&self, run_id: &RunId, message: &str) -> Result<(), StateError> {
        self.mutate(run_id, |run| {
            run.push_error(message);
            Ok(())
        })
        .map(|_| ())
    }

    async fn request_cancel(&self, run_id: &RunId) -> Result<ImportRun, StateError> {
        self.mutate(run_id, |run| {
            if run.status.is_terminal() {
                return Err(StateError::InvalidTransition {
                    run: run.id.to_string(),
                    from: run.status.to_string(),
                    to: "cancelled".to_string(),
                });
            }
            run.cancel_requested = true;
            Ok(())
        })
    }

    async fn is_cancel_requested(&self, run_id: &RunId) -> Result<bool, StateError> {
        Ok(self
            .load_run(run_id)
            .await?
            .is_some_and(|run| run.cancel_requested))
    }

    async fn finish(
        &self,
        run_id: &RunId,
        status: RunStatus,
        diagnostic: Option<String>,
    ) -> Result<ImportRun, StateError> {
        let result = self.db.transaction(|tx| {
            let mut run = Self::read_run(tx, run_id)?;
            if !status.is_terminal() || !run.status.can_transition_to(status) {
                return Err(Self::invalid(&run, status));
            }
            run.status = status;
            run.diagnostic = diagnostic.clone();
            run.finished_at = Some(Utc::now());
            Self::write_run(tx, &run)?;

            let active_key = Self::active_key(&run.connection_id);
            if tx
                .get(&active_key)?
                .is_some_and(|holder| holder.as_ref() == run.id.as_str().as_bytes())
            {
                tx.remove(active_key.as_bytes())?;
            }
            Ok(run)
        });

        let run = flatten(result)?;
        self.db.flush_async().await?;
        Ok(run)
    }

    async fn active_run(&self, connection: &ConnectionId) -> Result<Option<RunId>, StateError> {
        Ok(self
            .db
            .get(Self::active_key(connection))?
            .map(|bytes| RunId::new(String::from_utf8_lossy(&bytes).into_owned())))
    }

    async fn list_runs(&self, connection: Option<&ConnectionId>) -> Result<Vec<ImportRun>, StateError> {
        let mut runs = Vec::new();
        for item in self.db.scan_prefix("run:") {
            let (_key, value) = item?;
            let run: ImportRun = bincode::deserialize(&value)?;
            if connection.is_none_or(|c| *c == run.connection_id) {
                runs.push(run);
            }
        }
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }
}
