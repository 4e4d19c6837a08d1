use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use saleslog_core::datastore::DataStore;
use saleslog_core::task::{Task, normalize_note};
use saleslog_shared::{TaskCreate, TaskDto, TaskPatch, TaskStatus};
use tracing::{debug, instrument};

pub struct AppState {
    store: Mutex<DataStore>,
}

impl AppState {
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let store = DataStore::open(data_dir)
            .with_context(|| format!("failed to open task datastore at {}", data_dir.display()))?;
        Ok(Self {
            store: Mutex::new(store),
        })
    }

    #[instrument(skip(self))]
    pub fn list(&self) -> anyhow::Result<Vec<TaskDto>> {
        let store = self.store.lock();
        let tasks = store.find_all()?;
        debug!(count = tasks.len(), "listing tasks");
        Ok(tasks.iter().map(Task::to_dto).collect())
    }

    #[instrument(skip(self, create), fields(entity = %create.entity_name))]
    pub fn create(&self, create: TaskCreate) -> anyhow::Result<TaskDto> {
        validate_entity_name(&create.entity_name)?;
        validate_phone_number(&create.phone_number)?;

        let task = Task::from_create(create, Utc::now());
        let store = self.store.lock();
        let saved = store.insert(task)?;
        Ok(saved.to_dto())
    }

    /// `Ok(None)` when no task has `id`.
    #[instrument(skip(self, patch))]
    pub fn update(&self, id: &str, patch: TaskPatch) -> anyhow::Result<Option<TaskDto>> {
        if let Some(entity_name) = &patch.entity_name {
            validate_entity_name(entity_name)?;
        }
        if let Some(phone_number) = &patch.phone_number {
            validate_phone_number(phone_number)?;
        }

        let now = Utc::now();
        let store = self.store.lock();
        let updated = store.find_by_id_and_update(id, |task| {
            apply_patch(task, patch, now);
            Ok(())
        })?;
        Ok(updated.as_ref().map(Task::to_dto))
    }

    #[instrument(skip(self, note), fields(note_len = note.len()))]
    pub fn set_note(&self, id: &str, note: String) -> anyhow::Result<Option<TaskDto>> {
        let now = Utc::now();
        let store = self.store.lock();
        let updated = store.find_by_id_and_update(id, |task| {
            task.note = normalize_note(Some(note));
            task.modified = now;
            Ok(())
        })?;
        Ok(updated.as_ref().map(Task::to_dto))
    }

    #[instrument(skip(self))]
    pub fn set_status(&self, id: &str, status: TaskStatus) -> anyhow::Result<Option<TaskDto>> {
        let now = Utc::now();
        let store = self.store.lock();
        let updated = store.find_by_id_and_update(id, |task| {
            task.status = status;
            task.modified = now;
            Ok(())
        })?;
        Ok(updated.as_ref().map(Task::to_dto))
    }
}

fn apply_patch(task: &mut Task, patch: TaskPatch, now: DateTime<Utc>) {
    if let Some(entity_name) = patch.entity_name {
        task.entity_name = entity_name;
    }
    if let Some(date) = patch.date {
        task.date = date;
    }
    if let Some(time) = patch.time {
        task.time = time;
    }
    if let Some(phone_number) = patch.phone_number {
        task.phone_number = phone_number;
    }
    if let Some(contact_person) = patch.contact_person {
        task.contact_person = contact_person;
    }
    if patch.note.is_some() {
        task.note = normalize_note(patch.note);
    }
    if let Some(task_type) = patch.task_type {
        task.task_type = task_type;
    }
    if let Some(status) = patch.status {
        task.status = status;
    }
    task.modified = now;
}

fn validate_entity_name(entity_name: &str) -> anyhow::Result<()> {
    if entity_name.trim().is_empty() {
        return Err(anyhow!("entityName cannot be empty"));
    }
    Ok(())
}

/// Digits and spaces with an optional leading `+`; empty is allowed.
fn validate_phone_number(phone_number: &str) -> anyhow::Result<()> {
    static PHONE_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let phone_re = PHONE_RE
        .get_or_init(|| Regex::new(r"^\+?[0-9 ]*$").ok())
        .as_ref()
        .ok_or_else(|| anyhow!("phone number pattern failed to compile"))?;

    if !phone_re.is_match(phone_number.trim()) {
        return Err(anyhow!("invalid phoneNumber: {phone_number}"));
    }
    Ok(())
}
