//! Read-only projections of the task collection: filter by type, sort by
//! a column, then group by calendar day. Every function here is pure; the
//! caller owns the current filter and sort in a [`ListView`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDate;
use deunicode::deunicode;
use saleslog_shared::{TaskDto, TaskType};
use tracing::trace;

use crate::datetime::{format_day, to_display_date};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeFilter {
    #[default]
    All,
    Only(TaskType),
}

impl TypeFilter {
    pub fn matches(self, task: &TaskDto) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Only(task_type) => task.task_type == task_type,
        }
    }
}

impl FromStr for TypeFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(TypeFilter::All);
        }
        s.parse::<TaskType>()
            .map(TypeFilter::Only)
            .map_err(|err| anyhow!(err))
    }
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeFilter::All => f.write_str("All"),
            TypeFilter::Only(task_type) => write!(f, "{task_type}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Date,
    EntityName,
}

impl FromStr for SortColumn {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date" => Ok(SortColumn::Date),
            "entity" | "entityname" | "entity-name" | "name" => Ok(SortColumn::EntityName),
            other => Err(anyhow!("unknown sort column: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupOrder {
    /// Days appear in the order they are first seen in the input.
    #[default]
    FirstOccurrence,
    /// Days appear oldest first.
    Calendar,
}

impl FromStr for GroupOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "first-occurrence" | "input" => Ok(GroupOrder::FirstOccurrence),
            "calendar" | "chronological" => Ok(GroupOrder::Calendar),
            other => Err(anyhow!("unknown group order: {other}")),
        }
    }
}

pub fn filter_by_type(tasks: &[TaskDto], filter: TypeFilter) -> Vec<TaskDto> {
    if filter == TypeFilter::All {
        return tasks.to_vec();
    }
    tasks
        .iter()
        .filter(|task| filter.matches(task))
        .cloned()
        .collect()
}

/// Stable sort; tasks that compare equal keep their input order in both
/// directions.
pub fn sort_by(tasks: &[TaskDto], column: SortColumn, direction: SortDirection) -> Vec<TaskDto> {
    trace!(?column, ?direction, count = tasks.len(), "sorting tasks");
    match column {
        SortColumn::Date => {
            let mut sorted = tasks.to_vec();
            sorted.sort_by(|a, b| {
                direction.apply(to_display_date(a.date).cmp(&to_display_date(b.date)))
            });
            sorted
        }
        SortColumn::EntityName => {
            let mut keyed: Vec<(CollationKey, &TaskDto)> = tasks
                .iter()
                .map(|task| (CollationKey::new(&task.entity_name), task))
                .collect();
            keyed.sort_by(|(a, _), (b, _)| direction.apply(a.cmp(b)));
            keyed.into_iter().map(|(_, task)| task.clone()).collect()
        }
    }
}

/// Sort key approximating locale collation: letters compare without
/// accents or case first, then unaccented before accented, then lowercase
/// before uppercase, then raw text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CollationKey {
    primary: String,
    /// One flag per source character, set when it needed transliteration.
    secondary: Vec<bool>,
    tertiary: String,
    raw: String,
}

impl CollationKey {
    fn new(text: &str) -> Self {
        let trimmed = text.trim();
        let folded = deunicode(trimmed);
        let secondary = trimmed.chars().map(|ch| !ch.is_ascii()).collect();
        let tertiary = folded
            .chars()
            .map(|ch| {
                if ch.is_ascii_lowercase() {
                    ch.to_ascii_uppercase()
                } else {
                    ch.to_ascii_lowercase()
                }
            })
            .collect();
        Self {
            primary: folded.to_lowercase(),
            secondary,
            tertiary,
            raw: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateGroup {
    /// `dd/mm/yyyy`
    pub key: String,
    pub day: NaiveDate,
    pub tasks: Vec<TaskDto>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DateGroups {
    groups: Vec<DateGroup>,
}

impl DateGroups {
    pub fn keys(&self) -> Vec<&str> {
        self.groups.iter().map(|group| group.key.as_str()).collect()
    }

    pub fn get(&self, key: &str) -> Option<&[TaskDto]> {
        self.groups
            .iter()
            .find(|group| group.key == key)
            .map(|group| group.tasks.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DateGroup> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.groups.iter().map(|group| group.tasks.len()).sum()
    }

    /// Reorders the days oldest first; tasks inside a day keep their order.
    #[must_use]
    pub fn into_calendar_order(mut self) -> Self {
        self.groups.sort_by_key(|group| group.day);
        self
    }
}

pub fn group_by_date(tasks: &[TaskDto]) -> DateGroups {
    let mut groups: Vec<DateGroup> = Vec::new();
    let mut index: HashMap<NaiveDate, usize> = HashMap::new();

    for task in tasks {
        let day = to_display_date(task.date);
        let slot = *index.entry(day).or_insert_with(|| {
            groups.push(DateGroup {
                key: format_day(task.date),
                day,
                tasks: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].tasks.push(task.clone());
    }

    DateGroups { groups }
}

/// What the note column shows for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteCell<'a> {
    AddNote,
    Text(&'a str),
}

pub fn note_cell(task: &TaskDto) -> NoteCell<'_> {
    match task.note_text() {
        Some(text) => NoteCell::Text(text),
        None => NoteCell::AddNote,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSort {
    pub column: SortColumn,
    pub direction: SortDirection,
}

/// Caller-held list state: the active filter, sort and group order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListView {
    pub filter: TypeFilter,
    pub sort: Option<ActiveSort>,
    pub group_order: GroupOrder,
}

impl ListView {
    /// Selecting a new column sorts it ascending; selecting the active
    /// column again flips the direction.
    pub fn toggle_sort(&mut self, column: SortColumn) -> ActiveSort {
        let next = match self.sort {
            Some(active) if active.column == column => ActiveSort {
                column,
                direction: active.direction.toggled(),
            },
            _ => ActiveSort {
                column,
                direction: SortDirection::Ascending,
            },
        };
        self.sort = Some(next);
        next
    }

    /// filter, then sort when one is active, then group.
    pub fn project(&self, tasks: &[TaskDto]) -> DateGroups {
        let filtered = filter_by_type(tasks, self.filter);
        let ordered = match self.sort {
            Some(active) => sort_by(&filtered, active.column, active.direction),
            None => filtered,
        };
        let groups = group_by_date(&ordered);
        match self.group_order {
            GroupOrder::FirstOccurrence => groups,
            GroupOrder::Calendar => groups.into_calendar_order(),
        }
    }
}
