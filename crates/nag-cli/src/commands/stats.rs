use anyhow::Result;
use nag_core::notify::Notifier;
use nag_core::timezone;
use owo_colors::OwoColorize;

use crate::app::App;
use crate::cli::ReportCommand;
use crate::views::table::display_heatmap;

pub async fn stats(app: &App) -> Result<()> {
    let now = timezone::now();
    let today = app.calendar.today(now);
    let view = app.calendar.day_view(&app.owner_id, today, now).await?;

    let total: u32 = view.heatmap.counts().values().sum();
    println!("🔥 Streak: {} days", view.streak.to_string().bold());
    println!(
        "✅ {} completions since {}",
        total,
        view.heatmap.start().format("%Y-%m-%d")
    );
    println!();
    display_heatmap(&view.heatmap);
    Ok(())
}

pub async fn report(app: &App, command: ReportCommand) -> Result<()> {
    let report = app.calendar.weekly_report(&app.owner_id, timezone::now()).await?;
    let text = report.render();
    println!("{text}");

    if command.send {
        app.notifier.send(&app.owner_id, &text, &[]).await?;
        println!("{}", "Report sent.".green());
    }
    Ok(())
}
