//! Local copy of the task collection with optimistic field writes.
//!
//! Status and note changes land in the local collection before the request
//! is sent and are reconciled with the server's response afterwards.
//! Writes to the same task are serialized so a second toggle always sees
//! the outcome of the first.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::Mutex;
use saleslog_shared::{TaskCreate, TaskDto, TaskPatch, TaskStatus};
use thiserror::Error;
use tokio::sync::Mutex as RecordLock;
use tracing::{debug, error, info, instrument, warn};

use crate::api::{ApiError, TaskApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Confirmed,
    Pending,
    Failed,
}

/// What happens to an optimistic change the server did not accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteFailurePolicy {
    #[default]
    Rollback,
    Keep,
}

impl FromStr for WriteFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rollback" => Ok(WriteFailurePolicy::Rollback),
            "keep" => Ok(WriteFailurePolicy::Keep),
            other => Err(anyhow!("invalid sync.on_failure value: {other}")),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no task with id {0} in the local collection")]
    UnknownTask(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Default)]
struct Collection {
    tasks: Vec<TaskDto>,
    sync: HashMap<String, SyncState>,
}

impl Collection {
    fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    fn upsert(&mut self, task: TaskDto) {
        match self.position(&task.id) {
            Some(idx) => self.tasks[idx] = task,
            None => self.tasks.push(task),
        }
    }
}

enum FieldWrite {
    Status(TaskStatus),
    Note(String),
}

#[derive(Clone)]
pub struct TaskStore {
    api: Arc<dyn TaskApi>,
    state: Arc<Mutex<Collection>>,
    record_locks: Arc<Mutex<HashMap<String, Arc<RecordLock<()>>>>>,
    policy: WriteFailurePolicy,
}

impl TaskStore {
    pub fn new(api: Arc<dyn TaskApi>, policy: WriteFailurePolicy) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(Collection::default())),
            record_locks: Arc::new(Mutex::new(HashMap::new())),
            policy,
        }
    }

    pub fn snapshot(&self) -> Vec<TaskDto> {
        self.state.lock().tasks.clone()
    }

    pub fn get(&self, id: &str) -> Option<TaskDto> {
        let state = self.state.lock();
        state.position(id).map(|idx| state.tasks[idx].clone())
    }

    pub fn sync_state(&self, id: &str) -> Option<SyncState> {
        let state = self.state.lock();
        state.position(id)?;
        Some(state.sync.get(id).copied().unwrap_or(SyncState::Confirmed))
    }

    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the local collection with a full fetch. On failure the
    /// previous collection stays as it was. Records with a write still in
    /// flight keep their optimistic value and stay `Pending`.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<usize, StoreError> {
        let tasks = match self.api.list().await {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(error = %err, "failed fetching tasks; keeping previous collection");
                return Err(err.into());
            }
        };

        let count = tasks.len();
        let kept = {
            let mut state = self.state.lock();
            let in_flight: HashMap<String, TaskDto> = state
                .tasks
                .iter()
                .filter(|task| state.sync.get(&task.id) == Some(&SyncState::Pending))
                .map(|task| (task.id.clone(), task.clone()))
                .collect();

            state.tasks = tasks
                .into_iter()
                .map(|task| in_flight.get(&task.id).cloned().unwrap_or(task))
                .collect();
            let present: HashSet<String> =
                state.tasks.iter().map(|task| task.id.clone()).collect();
            state
                .sync
                .retain(|id, _| in_flight.contains_key(id) && present.contains(id));
            state.sync.len()
        };
        info!(count, kept_pending = kept, "loaded task collection");
        Ok(count)
    }

    #[instrument(skip(self))]
    pub async fn toggle_status(&self, id: &str) -> Result<TaskDto, StoreError> {
        self.write_optimistic(id, |task| {
            task.status = task.status.toggled();
            FieldWrite::Status(task.status)
        })
        .await
    }

    #[instrument(skip(self, text), fields(note_len = text.len()))]
    pub async fn set_note(&self, id: &str, text: &str) -> Result<TaskDto, StoreError> {
        let note = text.to_string();
        self.write_optimistic(id, move |task| {
            task.note = Some(note.clone());
            FieldWrite::Note(note)
        })
        .await
    }

    /// Creates a copy of `id` under a new server-assigned id. Returns
    /// `Ok(None)` when `id` is not in the local collection.
    #[instrument(skip(self))]
    pub async fn duplicate(&self, id: &str) -> Result<Option<TaskDto>, StoreError> {
        let Some(source) = self.get(id) else {
            debug!(id, "duplicate requested for unknown task; nothing to do");
            return Ok(None);
        };

        let copy = TaskCreate::from(&source);
        let created = self.api.create(&copy).await.map_err(|err| {
            error!(id, error = %err, "failed duplicating task");
            StoreError::from(err)
        })?;

        self.reconcile(created.clone());
        info!(source = id, id = %created.id, "task duplicated");
        Ok(Some(created))
    }

    #[instrument(skip(self, create), fields(entity = %create.entity_name))]
    pub async fn create(&self, create: &TaskCreate) -> Result<TaskDto, StoreError> {
        let created = self.api.create(create).await.map_err(|err| {
            error!(error = %err, "failed saving task");
            StoreError::from(err)
        })?;

        self.reconcile(created.clone());
        info!(id = %created.id, "task created");
        Ok(created)
    }

    /// Sends a full-field update and stores the server's version of the
    /// task; nothing changes locally until the server answers.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: &TaskPatch) -> Result<TaskDto, StoreError> {
        let lock = self.record_lock(id);
        let result = {
            let _guard = lock.lock().await;
            self.api.update(id, patch).await
        };
        self.release_record_lock(id, lock);

        let updated = result.map_err(|err| {
            error!(id, error = %err, "failed updating task");
            StoreError::from(err)
        })?;

        self.reconcile(updated.clone());
        info!(id, "task updated");
        Ok(updated)
    }

    fn record_lock(&self, id: &str) -> Arc<RecordLock<()>> {
        self.record_locks
            .lock()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(RecordLock::new(())))
            .clone()
    }

    /// Drops the map entry once no other caller holds or waits on it.
    /// Clones are only taken under the map mutex, so the count is stable here.
    fn release_record_lock(&self, id: &str, lock: Arc<RecordLock<()>>) {
        let mut locks = self.record_locks.lock();
        let unused = Arc::strong_count(&lock) == 2
            && locks.get(id).is_some_and(|entry| Arc::ptr_eq(entry, &lock));
        if unused {
            locks.remove(id);
        }
    }

    async fn write_optimistic<F>(&self, id: &str, apply: F) -> Result<TaskDto, StoreError>
    where
        F: FnOnce(&mut TaskDto) -> FieldWrite,
    {
        let lock = self.record_lock(id);
        let result = {
            let _guard = lock.lock().await;
            self.write_optimistic_locked(id, apply).await
        };
        self.release_record_lock(id, lock);
        result
    }

    async fn write_optimistic_locked<F>(&self, id: &str, apply: F) -> Result<TaskDto, StoreError>
    where
        F: FnOnce(&mut TaskDto) -> FieldWrite,
    {
        let (previous, write) = {
            let mut state = self.state.lock();
            let collection = &mut *state;
            let Some(idx) = collection.position(id) else {
                debug!(id, "write requested for unknown task");
                return Err(StoreError::UnknownTask(id.to_string()));
            };
            let task = &mut collection.tasks[idx];
            let previous = task.clone();
            let write = apply(task);
            collection.sync.insert(id.to_string(), SyncState::Pending);
            (previous, write)
        };

        let result = match &write {
            FieldWrite::Status(status) => self.api.set_status(id, *status).await,
            FieldWrite::Note(note) => self.api.set_note(id, note).await,
        };

        match result {
            Ok(confirmed) => {
                self.reconcile(confirmed.clone());
                debug!(id, "optimistic write confirmed");
                Ok(confirmed)
            }
            Err(err) => {
                error!(id, error = %err, policy = ?self.policy, "optimistic write failed");
                self.mark_failed(previous);
                Err(err.into())
            }
        }
    }

    fn reconcile(&self, confirmed: TaskDto) {
        let mut state = self.state.lock();
        state.sync.insert(confirmed.id.clone(), SyncState::Confirmed);
        state.upsert(confirmed);
    }

    fn mark_failed(&self, previous: TaskDto) {
        let mut state = self.state.lock();
        state.sync.insert(previous.id.clone(), SyncState::Failed);
        if self.policy == WriteFailurePolicy::Rollback {
            state.upsert(previous);
        }
    }
}
