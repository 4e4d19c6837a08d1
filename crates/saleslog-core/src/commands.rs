use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use saleslog_shared::{TaskCreate, TaskDto, TaskPatch};
use tracing::{debug, info, instrument, warn};

use crate::cli::{AddArgs, Command, EditArgs, ListArgs};
use crate::config::Config;
use crate::datetime::{move_to_day, parse_date_input, parse_time_input};
use crate::render::Renderer;
use crate::store::TaskStore;
use crate::view::{ActiveSort, GroupOrder, ListView, SortDirection};

#[instrument(skip(store, cfg, renderer, command))]
pub async fn dispatch(
    store: &TaskStore,
    cfg: &Config,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let now = Utc::now();

    match command {
        Command::List(args) => cmd_list(store, cfg, renderer, args).await,
        Command::Add(args) => cmd_add(store, renderer, args, now).await,
        Command::Edit { id, fields } => cmd_edit(store, renderer, &id, fields, now).await,
        Command::Toggle { id } => cmd_toggle(store, &id).await,
        Command::Note { id, text } => cmd_note(store, renderer, &id, &text.join(" ")).await,
        Command::Duplicate { id } => cmd_duplicate(store, renderer, &id).await,
    }
}

#[instrument(skip(store, cfg, renderer, args))]
async fn cmd_list(
    store: &TaskStore,
    cfg: &Config,
    renderer: &Renderer,
    args: ListArgs,
) -> anyhow::Result<()> {
    let count = store.load().await.context("failed to fetch tasks")?;
    debug!(count, "loaded tasks for list");

    let view = list_view(cfg, &args)?;
    let groups = view.project(&store.snapshot());
    info!(
        days = groups.len(),
        shown = groups.task_count(),
        "rendering task list"
    );
    renderer.print_groups(&groups)
}

fn list_view(cfg: &Config, args: &ListArgs) -> anyhow::Result<ListView> {
    let group_order = if args.calendar {
        GroupOrder::Calendar
    } else {
        cfg.group_order()?
    };
    let sort = args.sort.map(|column| ActiveSort {
        column,
        direction: if args.desc {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        },
    });

    Ok(ListView {
        filter: args.task_type,
        sort,
        group_order,
    })
}

#[instrument(skip(store, renderer, args, now), fields(entity = %args.entity))]
async fn cmd_add(
    store: &TaskStore,
    renderer: &Renderer,
    args: AddArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let create = build_create(args, now)?;
    let saved = store.create(&create).await.context("failed to save task")?;
    info!(id = %saved.id, "task created");
    println!("Created task {}.", saved.id);
    renderer.print_task(&saved)
}

fn build_create(args: AddArgs, now: DateTime<Utc>) -> anyhow::Result<TaskCreate> {
    if args.entity.trim().is_empty() {
        return Err(anyhow!("entity name cannot be empty"));
    }
    let date = parse_date_input(&args.date, now)?;
    let time = parse_time_input(&args.time, date)?;

    Ok(TaskCreate {
        entity_name: args.entity,
        date,
        time,
        phone_number: args.phone,
        contact_person: args.contact,
        note: args.note,
        task_type: args.task_type,
        status: args.status,
    })
}

#[instrument(skip(store, renderer, fields, now))]
async fn cmd_edit(
    store: &TaskStore,
    renderer: &Renderer,
    id: &str,
    fields: EditArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    store.load().await.context("failed to fetch tasks")?;
    let current = store
        .get(id)
        .ok_or_else(|| anyhow!("no task with id {id}"))?;

    let patch = build_patch(fields, &current, now)?;
    if patch.is_empty() {
        warn!(id, "edit called without any fields");
        println!("Nothing to change for task {id}.");
        return Ok(());
    }

    let saved = store
        .update(id, &patch)
        .await
        .with_context(|| format!("failed to update task {id}"))?;
    println!("Updated task {}.", saved.id);
    renderer.print_task(&saved)
}

/// A bare `--time` lands on the task's current day; a bare `--date`
/// carries the task's current time of day along.
fn build_patch(fields: EditArgs, current: &TaskDto, now: DateTime<Utc>) -> anyhow::Result<TaskPatch> {
    let date = fields
        .date
        .as_deref()
        .map(|raw| parse_date_input(raw, now))
        .transpose()?;
    let time = match (fields.time.as_deref(), date) {
        (Some(raw), day) => Some(parse_time_input(raw, day.unwrap_or(current.date))?),
        (None, Some(day)) => Some(move_to_day(current.time, day)?),
        (None, None) => None,
    };

    if let Some(entity) = &fields.entity
        && entity.trim().is_empty()
    {
        return Err(anyhow!("entity name cannot be empty"));
    }

    Ok(TaskPatch {
        entity_name: fields.entity,
        date,
        time,
        phone_number: fields.phone,
        contact_person: fields.contact,
        note: fields.note,
        task_type: fields.task_type,
        status: fields.status,
    })
}

#[instrument(skip(store))]
async fn cmd_toggle(store: &TaskStore, id: &str) -> anyhow::Result<()> {
    store.load().await.context("failed to fetch tasks")?;
    let saved = store
        .toggle_status(id)
        .await
        .with_context(|| format!("failed to update status of task {id}"))?;
    println!("Task {} is now {}.", saved.id, saved.status);
    Ok(())
}

#[instrument(skip(store, renderer, text), fields(note_len = text.len()))]
async fn cmd_note(
    store: &TaskStore,
    renderer: &Renderer,
    id: &str,
    text: &str,
) -> anyhow::Result<()> {
    store.load().await.context("failed to fetch tasks")?;
    let saved = store
        .set_note(id, text)
        .await
        .with_context(|| format!("failed to update note of task {id}"))?;
    println!("Noted task {}.", saved.id);
    renderer.print_task(&saved)
}

#[instrument(skip(store, renderer))]
async fn cmd_duplicate(store: &TaskStore, renderer: &Renderer, id: &str) -> anyhow::Result<()> {
    store.load().await.context("failed to fetch tasks")?;
    match store
        .duplicate(id)
        .await
        .with_context(|| format!("failed to duplicate task {id}"))?
    {
        Some(copy) => {
            println!("Duplicated task {id} as {}.", copy.id);
            renderer.print_task(&copy)
        }
        None => {
            warn!(id, "duplicate requested for unknown task");
            println!("No task with id {id}; nothing duplicated.");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use saleslog_shared::{TaskDto, TaskStatus, TaskType};

    use super::{build_create, build_patch, list_view};
    use crate::cli::{AddArgs, EditArgs, ListArgs};
    use crate::config::Config;
    use crate::view::{GroupOrder, SortColumn, SortDirection, TypeFilter};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0)
            .single()
            .expect("valid now")
    }

    fn existing() -> TaskDto {
        let at = Utc
            .with_ymd_and_hms(2024, 1, 5, 14, 30, 0)
            .single()
            .expect("valid date");
        TaskDto {
            id: "t1".to_string(),
            entity_name: "Acme".to_string(),
            date: at,
            time: at,
            phone_number: String::new(),
            contact_person: String::new(),
            note: None,
            task_type: TaskType::Call,
            status: TaskStatus::Open,
        }
    }

    #[test]
    fn add_places_time_on_the_given_day() {
        let create = build_create(
            AddArgs {
                entity: "Globex".to_string(),
                date: "2024-02-01".to_string(),
                time: "3:15 pm".to_string(),
                phone: "+44 1234".to_string(),
                contact: "Hank".to_string(),
                note: None,
                task_type: TaskType::Meeting,
                status: None,
            },
            now(),
        )
        .expect("create");

        assert_eq!(
            create.date,
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).single().expect("date")
        );
        assert_eq!(
            create.time,
            Utc.with_ymd_and_hms(2024, 2, 1, 15, 15, 0).single().expect("time")
        );
        assert_eq!(create.status, None);
    }

    #[test]
    fn add_rejects_blank_entity() {
        let err = build_create(
            AddArgs {
                entity: "  ".to_string(),
                date: "today".to_string(),
                time: "09:00".to_string(),
                phone: String::new(),
                contact: String::new(),
                note: None,
                task_type: TaskType::Call,
                status: None,
            },
            now(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn bare_time_edit_keeps_current_day() {
        let patch = build_patch(
            EditArgs {
                time: Some("10:45".to_string()),
                ..EditArgs::default()
            },
            &existing(),
            now(),
        )
        .expect("patch");

        assert_eq!(patch.date, None);
        assert_eq!(
            patch.time,
            Some(Utc.with_ymd_and_hms(2024, 1, 5, 10, 45, 0).single().expect("time"))
        );
        assert!(patch.entity_name.is_none());
    }

    #[test]
    fn bare_date_edit_carries_time_of_day() {
        let patch = build_patch(
            EditArgs {
                date: Some("2024-02-09".to_string()),
                ..EditArgs::default()
            },
            &existing(),
            now(),
        )
        .expect("patch");

        assert_eq!(
            patch.date,
            Some(Utc.with_ymd_and_hms(2024, 2, 9, 0, 0, 0).single().expect("date"))
        );
        assert_eq!(
            patch.time,
            Some(Utc.with_ymd_and_hms(2024, 2, 9, 14, 30, 0).single().expect("time"))
        );
    }

    #[test]
    fn empty_edit_yields_empty_patch() {
        let patch = build_patch(EditArgs::default(), &existing(), now()).expect("patch");
        assert!(patch.is_empty());
    }

    #[test]
    fn list_flags_shape_the_view() {
        let view = list_view(
            &Config::default(),
            &ListArgs {
                task_type: TypeFilter::Only(TaskType::Call),
                sort: Some(SortColumn::Date),
                desc: true,
                calendar: true,
            },
        )
        .expect("view");

        assert_eq!(view.group_order, GroupOrder::Calendar);
        let sort = view.sort.expect("sort");
        assert_eq!(sort.column, SortColumn::Date);
        assert_eq!(sort.direction, SortDirection::Descending);
    }
}
