use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use nag_core::error::CoreError;
use nag_core::escalation::Transition;
use nag_core::models::{ReminderAction, Task};
use nag_core::timezone;
use owo_colors::{OwoColorize, Style};

use crate::app::App;
use crate::util::{resolve_target, Target};

/// Applies a Done/Snooze/Skip from the terminal, the same way a button press does.
pub async fn respond(app: &App, id: &str, action: ReminderAction) -> Result<()> {
    let now = timezone::now();
    let target = resolve_target(app.repo.as_ref(), &app.owner_id, id).await?;
    let task = occurrence(app, target, now).await?;

    let transition = app.machine.apply(&app.owner_id, task.id, action, now).await?;

    let success_style = Style::new().green().bold();
    match transition {
        Transition::Completed { task } => {
            println!("{} Completed: {}", "✅".style(success_style), task.title.bright_white().bold());
        }
        Transition::Rescheduled { task, action, times } => {
            let local = times.primary_at.with_timezone(&app.offset);
            let verb = match action {
                ReminderAction::Snooze { .. } => "Snoozed",
                _ => "Skipped",
            };
            println!(
                "{} {} '{}' until {}",
                "💤".style(success_style),
                verb,
                task.title,
                local.format("%Y-%m-%d %H:%M")
            );
        }
        Transition::Stale(_) => {
            println!("'{}' was already done.", task.title);
        }
        other => {
            tracing::debug!(?other, "unexpected transition for a user action");
        }
    }
    Ok(())
}

async fn occurrence(app: &App, target: Target, now: DateTime<Utc>) -> Result<Task> {
    match target {
        Target::Task(task) => Ok(task),
        Target::Virtual(virtual_id) => Ok(app
            .calendar
            .materialize_virtual(&app.owner_id, virtual_id, now)
            .await?),
        Target::Template(template) => Err(anyhow!(CoreError::Validation(format!(
            "'{}' is a recurring template; address one day as <id>@YYYY-MM-DD",
            template.title
        )))),
    }
}
