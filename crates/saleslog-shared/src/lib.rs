use std::fmt;
use std::str::FromStr;

use chrono::{
  DateTime,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
  Default,
)]
pub enum TaskType {
  #[default]
  Meeting,
  Call,
  #[serde(rename = "Video Call")]
  VideoCall
}

impl TaskType {
  pub fn label(self) -> &'static str {
    match self {
      | TaskType::Meeting => "Meeting",
      | TaskType::Call => "Call",
      | TaskType::VideoCall => {
        "Video Call"
      }
    }
  }
}

impl fmt::Display for TaskType {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.label())
  }
}

impl FromStr for TaskType {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let folded: String = s
      .chars()
      .filter(|ch| {
        ch.is_ascii_alphanumeric()
      })
      .collect::<String>()
      .to_ascii_lowercase();
    match folded.as_str() {
      | "meeting" => Ok(TaskType::Meeting),
      | "call" => Ok(TaskType::Call),
      | "videocall" | "video" => {
        Ok(TaskType::VideoCall)
      }
      | _ => Err(format!(
        "unknown task type: {s}"
      ))
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
  Default,
)]
pub enum TaskStatus {
  #[default]
  Open,
  Closed
}

impl TaskStatus {
  #[must_use]
  pub fn toggled(self) -> Self {
    match self {
      | TaskStatus::Open => {
        TaskStatus::Closed
      }
      | TaskStatus::Closed => {
        TaskStatus::Open
      }
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      | TaskStatus::Open => "Open",
      | TaskStatus::Closed => "Closed"
    }
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.label())
  }
}

impl FromStr for TaskStatus {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "open" => Ok(TaskStatus::Open),
      | "closed" | "close" => {
        Ok(TaskStatus::Closed)
      }
      | _ => Err(format!(
        "unknown task status: {s}"
      ))
    }
  }
}

/// A task as the REST API returns it.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskDto {
  #[serde(rename = "_id")]
  pub id:             String,
  #[serde(default)]
  pub entity_name:    String,
  pub date:           DateTime<Utc>,
  pub time:           DateTime<Utc>,
  #[serde(default)]
  pub phone_number:   String,
  #[serde(default)]
  pub contact_person: String,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub note:           Option<String>,
  #[serde(default)]
  pub task_type:      TaskType,
  #[serde(default)]
  pub status:         TaskStatus
}

impl TaskDto {
  /// The note text, or `None` when the
  /// task still needs one.
  pub fn note_text(
    &self
  ) -> Option<&str> {
    self
      .note
      .as_deref()
      .filter(|note| {
        !note.trim().is_empty()
      })
  }
}

/// Fields for a new task. The server
/// assigns the id and defaults the
/// status to `Open`.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreate {
  #[serde(default)]
  pub entity_name:    String,
  pub date:           DateTime<Utc>,
  pub time:           DateTime<Utc>,
  #[serde(default)]
  pub phone_number:   String,
  #[serde(default)]
  pub contact_person: String,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub note:           Option<String>,
  #[serde(default)]
  pub task_type:      TaskType,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub status:         Option<TaskStatus>
}

impl From<&TaskDto> for TaskCreate {
  fn from(task: &TaskDto) -> Self {
    Self {
      entity_name:    task
        .entity_name
        .clone(),
      date:           task.date,
      time:           task.time,
      phone_number:   task
        .phone_number
        .clone(),
      contact_person: task
        .contact_person
        .clone(),
      note:           task.note.clone(),
      task_type:      task.task_type,
      status:         Some(task.status)
    }
  }
}

/// Any subset of task fields for a full
/// update.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Default,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub entity_name:    Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub date: Option<DateTime<Utc>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub time: Option<DateTime<Utc>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub phone_number:   Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub contact_person: Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub note:           Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub task_type:      Option<TaskType>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub status: Option<TaskStatus>
}

impl TaskPatch {
  pub fn is_empty(&self) -> bool {
    *self == TaskPatch::default()
  }
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct NoteArgs {
  pub note: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct StatusArgs {
  pub status: TaskStatus
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct ErrorBody {
  pub error: String
}
