use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use saleslog_shared::{TaskDto, TaskStatus};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{format_clock, format_day};
use crate::view::{DateGroups, NoteCell, note_cell};

const HEADERS: [&str; 8] = [
    "Date",
    "Entity Name",
    "Task Type",
    "Time",
    "Contact Person",
    "Notes",
    "Status",
    "ID",
];

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    #[tracing::instrument(skip(self, groups), fields(days = groups.len()))]
    pub fn print_groups(&self, groups: &DateGroups) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_groups(out, groups)
    }

    pub fn write_groups<W: Write>(&self, mut writer: W, groups: &DateGroups) -> anyhow::Result<()> {
        if groups.is_empty() {
            writeln!(writer, "No tasks.")?;
            return Ok(());
        }

        let sections: Vec<(String, Vec<Vec<String>>)> = groups
            .iter()
            .map(|group| {
                let rows = group.tasks.iter().map(|task| self.row(task)).collect();
                (group.key.clone(), rows)
            })
            .collect();

        let mut widths: Vec<usize> = HEADERS.iter().map(|h| UnicodeWidthStr::width(*h)).collect();
        for (_, rows) in &sections {
            for row in rows {
                for (idx, cell) in row.iter().enumerate() {
                    widths[idx] = widths[idx].max(visible_width(cell));
                }
            }
        }

        for (idx, header) in HEADERS.iter().enumerate() {
            write!(writer, "{:width$} ", header, width = widths[idx])?;
        }
        writeln!(writer)?;

        for (key, rows) in sections {
            writeln!(writer)?;
            writeln!(writer, "{}", self.paint(&key, "1"))?;
            for idx in 0..widths.len() {
                write!(writer, "{:-<width$} ", "", width = widths[idx])?;
            }
            writeln!(writer)?;

            for row in rows {
                for (idx, cell) in row.iter().enumerate() {
                    let padding = widths[idx].saturating_sub(visible_width(cell));
                    write!(writer, "{}{} ", cell, " ".repeat(padding))?;
                }
                writeln!(writer)?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn print_task(&self, task: &TaskDto) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_task(out, task)
    }

    pub fn write_task<W: Write>(&self, mut writer: W, task: &TaskDto) -> anyhow::Result<()> {
        writeln!(writer, "id        {}", task.id)?;
        writeln!(writer, "entity    {}", task.entity_name)?;
        writeln!(writer, "date      {}", format_day(task.date))?;
        writeln!(writer, "time      {}", format_clock(task.time))?;
        writeln!(writer, "type      {}", task.task_type)?;
        writeln!(writer, "contact   {}", task.contact_person)?;
        writeln!(writer, "phone     {}", task.phone_number)?;
        writeln!(writer, "note      {}", task.note_text().unwrap_or("-"))?;
        writeln!(writer, "status    {}", task.status)?;
        Ok(())
    }

    fn row(&self, task: &TaskDto) -> Vec<String> {
        let note = match note_cell(task) {
            NoteCell::Text(text) => text.to_string(),
            NoteCell::AddNote => self.paint("+ add note", "2"),
        };
        let status = match task.status {
            TaskStatus::Open => self.paint("Open", "32"),
            TaskStatus::Closed => self.paint("Closed", "90"),
        };

        vec![
            format_day(task.date),
            task.entity_name.clone(),
            task.task_type.to_string(),
            format_clock(task.time),
            task.contact_person.clone(),
            note,
            status,
            self.paint(&task.id, "33"),
        ]
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn visible_width(cell: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(cell).as_str())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
