use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use saleslog_shared::{TaskStatus, TaskType};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::view::{SortColumn, TypeFilter};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "saleslog",
    version,
    about = "Log sales meetings, calls and video calls against a saleslog server",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    /// Path to a saleslogrc file.
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the task API, e.g. http://localhost:5000
    #[arg(long = "api", global = true)]
    pub api: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show tasks grouped by day.
    List(ListArgs),
    /// Log a new task.
    Add(AddArgs),
    /// Change any fields of an existing task.
    Edit {
        id: String,
        #[command(flatten)]
        fields: EditArgs,
    },
    /// Flip a task between Open and Closed.
    Toggle { id: String },
    /// Set the note of a task.
    Note {
        id: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Copy a task under a new id.
    Duplicate { id: String },
}

impl Default for Command {
    fn default() -> Self {
        Command::List(ListArgs::default())
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// All, Meeting, Call or "Video Call".
    #[arg(long = "type", default_value_t = TypeFilter::All)]
    pub task_type: TypeFilter,

    /// date or entity
    #[arg(long)]
    pub sort: Option<SortColumn>,

    #[arg(long, requires = "sort")]
    pub desc: bool,

    /// Order days oldest first instead of by first appearance.
    #[arg(long)]
    pub calendar: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(long)]
    pub entity: String,

    /// YYYY-MM-DD, DD/MM/YYYY or today
    #[arg(long, default_value = "today")]
    pub date: String,

    /// HH:MM or h:mm am/pm
    #[arg(long)]
    pub time: String,

    #[arg(long, default_value = "")]
    pub phone: String,

    #[arg(long, default_value = "")]
    pub contact: String,

    #[arg(long)]
    pub note: Option<String>,

    #[arg(long = "type", default_value_t = TaskType::Meeting)]
    pub task_type: TaskType,

    #[arg(long)]
    pub status: Option<TaskStatus>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
    #[arg(long)]
    pub entity: Option<String>,

    #[arg(long)]
    pub date: Option<String>,

    #[arg(long)]
    pub time: Option<String>,

    #[arg(long)]
    pub phone: Option<String>,

    #[arg(long)]
    pub contact: Option<String>,

    #[arg(long)]
    pub note: Option<String>,

    #[arg(long = "type")]
    pub task_type: Option<TaskType>,

    #[arg(long)]
    pub status: Option<TaskStatus>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` (or `rc.key:value`) overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;
    use saleslog_shared::TaskType;

    use super::{Command, GlobalCli, preprocess_args};
    use crate::view::{SortColumn, TypeFilter};

    fn args(raw: &[&str]) -> Vec<OsString> {
        raw.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&[
            "saleslog",
            "rc.api.url=http://10.0.0.2:5000",
            "list",
            "rc.color:off",
        ]))
        .expect("preprocess");

        assert_eq!(pre.cleaned_args, args(&["saleslog", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.api.url".to_string(), "http://10.0.0.2:5000".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
    }

    #[test]
    fn parses_list_options() {
        let cli = GlobalCli::try_parse_from([
            "saleslog", "list", "--type", "Video Call", "--sort", "entity", "--desc",
        ])
        .expect("parse");

        let Some(Command::List(list)) = cli.command else {
            panic!("expected list command");
        };
        assert_eq!(list.task_type, TypeFilter::Only(TaskType::VideoCall));
        assert_eq!(list.sort, Some(SortColumn::EntityName));
        assert!(list.desc);
    }

    #[test]
    fn parses_note_text_and_global_flags() {
        let cli = GlobalCli::try_parse_from([
            "saleslog", "note", "abc", "call", "back", "-vv", "--rc", "color=off",
        ])
        .expect("parse");

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.rc_overrides.len(), 1);
        let Some(Command::Note { id, text }) = cli.command else {
            panic!("expected note command");
        };
        assert_eq!(id, "abc");
        assert_eq!(text.join(" "), "call back");
    }

    #[test]
    fn add_requires_entity_and_time() {
        assert!(GlobalCli::try_parse_from(["saleslog", "add", "--time", "10:00"]).is_err());
        let cli = GlobalCli::try_parse_from([
            "saleslog", "add", "--entity", "Acme", "--time", "10:00", "--type", "call",
        ])
        .expect("parse");
        let Some(Command::Add(add)) = cli.command else {
            panic!("expected add command");
        };
        assert_eq!(add.task_type, TaskType::Call);
        assert_eq!(add.date, "today");
    }
}
