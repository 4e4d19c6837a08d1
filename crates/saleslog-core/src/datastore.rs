use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::task::Task;

/// The task document collection: one JSON document per line,
/// rewritten atomically on every write.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn find_all(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_all(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn insert(&self, task: Task) -> anyhow::Result<Task> {
        let mut tasks = self.find_all()?;
        if tasks.iter().any(|existing| existing.id == task.id) {
            return Err(anyhow!("duplicate task id: {}", task.id));
        }
        tasks.push(task.clone());
        self.save_all(&tasks)?;
        debug!(count = tasks.len(), "task inserted");
        Ok(task)
    }

    /// Applies `update` to the document with `id` and returns the stored
    /// result, or `None` when no document has that id.
    #[tracing::instrument(skip(self, update))]
    pub fn find_by_id_and_update<F>(&self, id: &str, update: F) -> anyhow::Result<Option<Task>>
    where
        F: FnOnce(&mut Task) -> anyhow::Result<()>,
    {
        let mut tasks = self.find_all()?;
        let Some(task) = tasks.iter_mut().find(|task| task.id == id) else {
            debug!(id, "no document to update");
            return Ok(None);
        };

        update(task)?;
        let updated = task.clone();
        self.save_all(&tasks)?;
        Ok(Some(updated))
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<Task>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let task: Task = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(task);
    }

    debug!(count = out.len(), "loaded tasks from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, tasks))]
fn save_jsonl_atomic(path: &Path, tasks: &[Task]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for task in tasks {
        let serialized = serde_json::to_string(task)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
