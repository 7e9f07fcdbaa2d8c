use anyhow::Result;
use nag_core::repository::TemplateRepository;
use nag_core::timezone;
use owo_colors::OwoColorize;

use crate::app::App;
use crate::cli::ListCommand;
use crate::parser::parse_date;
use crate::views::table::{display_entries, display_templates};

pub async fn list_reminders(app: &App, command: ListCommand) -> Result<()> {
    if command.templates {
        let templates = app.repo.find_templates(&app.owner_id).await?;
        if command.json {
            println!("{}", serde_json::to_string_pretty(&templates)?);
        } else {
            display_templates(&templates);
        }
        return Ok(());
    }

    let now = timezone::now();
    let date = parse_date(&command.date, app.offset, now)?;
    let view = app.calendar.day_view(&app.owner_id, date, now).await?;

    if command.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("{}", date.format("%A, %B %-d").to_string().bold());
    display_entries(&view.tasks, app.offset, now);
    if view.streak > 0 {
        println!("🔥 {} day streak", view.streak);
    }
    Ok(())
}
