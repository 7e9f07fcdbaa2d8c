use anyhow::Result;
use nag_core::timezone;
use owo_colors::{OwoColorize, Style};

use crate::app::App;
use crate::cli::PlanCommand;
use crate::parser::parse_date;

pub async fn plan(app: &App, command: PlanCommand) -> Result<()> {
    let now = timezone::now();
    let date = parse_date(&command.date, app.offset, now)?;
    let created = app.calendar.plan_day(&app.owner_id, date, now).await?;

    let success_style = Style::new().green().bold();
    println!(
        "{} Planned {}: {} new occurrence(s)",
        "✓".style(success_style),
        date,
        created.len()
    );
    for task in created {
        let local = task.remind_at.with_timezone(&app.offset);
        println!("  {} {} {}", "→".blue(), local.format("%H:%M"), task.title);
    }
    Ok(())
}

/// One dispatcher pass, for running from cron instead of `serve`.
pub async fn tick(app: &App) -> Result<()> {
    let summary = app.dispatcher.run_due(timezone::now()).await?;
    println!(
        "delivered {}, stale {}, failed {}",
        summary.delivered, summary.stale, summary.failed
    );
    Ok(())
}
