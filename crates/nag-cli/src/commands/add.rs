use anyhow::Result;
use nag_core::calendar::Created;
use nag_core::models::NewTaskData;
use nag_core::timezone;
use owo_colors::{OwoColorize, Style};

use crate::app::App;
use crate::cli::AddCommand;
use crate::parser::{parse_days, parse_when};

pub async fn add_reminder(app: &App, command: AddCommand) -> Result<()> {
    let now = timezone::now();
    let remind_at = parse_when(&command.at, app.offset, now)?;
    let recurrence = command.every.as_deref().map(parse_days).transpose()?;

    let data = NewTaskData {
        title: command.title,
        remind_at: Some(remind_at),
        recurrence,
        ..Default::default()
    };
    let created = app.calendar.create(&app.owner_id, data, now).await?;

    let success_style = Style::new().green().bold();
    let info_style = Style::new().blue();
    match created {
        Created::Task(task) => {
            let local = task.remind_at.with_timezone(&app.offset);
            println!(
                "{} Added reminder: {}",
                "✓".style(success_style),
                task.title.bright_white().bold()
            );
            println!("  {} ID: {}", "→".style(info_style), task.id.to_string().yellow());
            println!("  {} At: {}", "→".style(info_style), local.format("%Y-%m-%d %H:%M"));
        }
        Created::Template { template, instance } => {
            println!(
                "{} Added recurring reminder: {}",
                "✓".style(success_style),
                template.title.bright_white().bold()
            );
            println!("  {} ID: {}", "→".style(info_style), template.id.to_string().yellow());
            println!(
                "  {} Every {} at {}",
                "→".style(info_style),
                template.recurrence,
                template.time_of_day.format("%H:%M")
            );
            if let Some(instance) = instance {
                println!(
                    "  {} First occurrence: {}",
                    "→".style(info_style),
                    instance.id.to_string().yellow()
                );
            }
        }
    }

    Ok(())
}
