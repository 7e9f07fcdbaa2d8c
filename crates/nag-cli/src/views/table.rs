use chrono::{DateTime, FixedOffset, Utc};
use chrono_humanize::Humanize;
use comfy_table::{Attribute, Cell, Color, Row, Table};
use nag_core::calendar::CalendarEntry;
use nag_core::models::{TaskStatus, Template};
use nag_core::stats::{HeatLevel, Heatmap};
use owo_colors::OwoColorize;

/// v7 ids open with a millisecond timestamp; the short form keeps the first
/// random group so ids created together stay distinct.
const SHORT_ID_LEN: usize = 18;

/// Short form of an entry id, or `<template>@<date>` for a virtual
/// occurrence so it can be typed back into `done`/`delete`.
pub fn short_id(entry: &CalendarEntry) -> String {
    match (entry.is_virtual, entry.from_template_id) {
        (true, Some(template_id)) => format!(
            "{}@{}",
            &template_id.to_string()[..SHORT_ID_LEN],
            &entry.task_id[entry.task_id.len() - 10..]
        ),
        _ => entry.task_id.chars().take(SHORT_ID_LEN).collect(),
    }
}

pub fn display_entries(entries: &[CalendarEntry], offset: FixedOffset, now: DateTime<Utc>) {
    if entries.is_empty() {
        println!("Nothing scheduled.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Time", "Title", "Status", "Snoozed"]);

    for entry in entries {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(entry)));

        let local = entry.remind_at.with_timezone(&offset);
        let mut time_cell = Cell::new(format!("{} ({})", local.format("%H:%M"), entry.remind_at.humanize()));
        if entry.status.is_open() && entry.remind_at < now {
            time_cell = time_cell.fg(Color::Red); // Overdue
        }
        row.add_cell(time_cell);

        let mut title = String::new();
        if entry.from_template_id.is_some() {
            title.push('↻');
            title.push(' ');
        }
        title.push_str(&entry.title);
        let mut title_cell = Cell::new(title);
        if entry.status == TaskStatus::Done {
            title_cell = title_cell.add_attribute(Attribute::CrossedOut).fg(Color::DarkGrey);
        } else if entry.is_virtual {
            title_cell = title_cell.add_attribute(Attribute::Italic);
        }
        row.add_cell(title_cell);

        let status_cell = match entry.status {
            TaskStatus::Done => Cell::new("done").fg(Color::Green),
            TaskStatus::Snoozed => Cell::new("snoozed").fg(Color::Yellow),
            TaskStatus::Skipped => Cell::new("skipped").fg(Color::DarkGrey),
            TaskStatus::Pending if entry.is_virtual => Cell::new("planned"),
            TaskStatus::Pending => Cell::new("pending"),
        };
        row.add_cell(status_cell);

        row.add_cell(Cell::new(if entry.snooze_count > 0 {
            entry.snooze_count.to_string()
        } else {
            String::new()
        }));
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_templates(templates: &[Template]) {
    if templates.is_empty() {
        println!("No recurring reminders.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Time", "Days"]);
    for template in templates {
        let mut row = Row::new();
        row.add_cell(Cell::new(&template.id.to_string()[..SHORT_ID_LEN]));
        row.add_cell(Cell::new(&template.title));
        row.add_cell(Cell::new(template.time_of_day.format("%H:%M").to_string()));
        row.add_cell(Cell::new(template.recurrence.to_string()));
        table.add_row(row);
    }

    println!("{table}");
}

/// GitHub-style grid: one row per weekday, one column per week.
pub fn display_heatmap(heatmap: &Heatmap) {
    let cells: Vec<_> = heatmap.cells().collect();
    for weekday in 0..7 {
        let line: String = cells
            .iter()
            .skip(weekday)
            .step_by(7)
            .map(|(_, _, level)| match level {
                HeatLevel::None => "·".dimmed().to_string(),
                HeatLevel::Low => "■".green().to_string(),
                HeatLevel::Medium => "■".bright_green().to_string(),
                HeatLevel::High => "■".bright_green().bold().to_string(),
                HeatLevel::Max => "■".bright_white().bold().to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        println!("{line}");
    }
}
