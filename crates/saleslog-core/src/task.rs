use chrono::{DateTime, Utc};
use saleslog_shared::{TaskCreate, TaskDto, TaskStatus, TaskType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A task document as the collection stores it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,

    #[serde(default)]
    pub entity_name: String,

    pub date: DateTime<Utc>,

    pub time: DateTime<Utc>,

    #[serde(default)]
    pub phone_number: String,

    #[serde(default)]
    pub contact_person: String,

    #[serde(default)]
    pub note: Option<String>,

    #[serde(default)]
    pub task_type: TaskType,

    #[serde(default)]
    pub status: TaskStatus,

    pub entry: DateTime<Utc>,

    pub modified: DateTime<Utc>,
}

impl Task {
    pub fn from_create(create: TaskCreate, now: DateTime<Utc>) -> Self {
        Self {
            id: new_task_id(),
            entity_name: create.entity_name,
            date: create.date,
            time: create.time,
            phone_number: create.phone_number,
            contact_person: create.contact_person,
            note: normalize_note(create.note),
            task_type: create.task_type,
            status: create.status.unwrap_or_default(),
            entry: now,
            modified: now,
        }
    }

    pub fn to_dto(&self) -> TaskDto {
        TaskDto {
            id: self.id.clone(),
            entity_name: self.entity_name.clone(),
            date: self.date,
            time: self.time,
            phone_number: self.phone_number.clone(),
            contact_person: self.contact_person.clone(),
            note: self.note.clone(),
            task_type: self.task_type,
            status: self.status,
        }
    }
}

pub fn new_task_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Blank notes are stored as absent.
pub fn normalize_note(note: Option<String>) -> Option<String> {
    note.filter(|text| !text.trim().is_empty())
}
