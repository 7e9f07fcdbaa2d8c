use anyhow::Result;
use dialoguer::Confirm;
use nag_core::models::{DeleteMode, DeleteRequest};
use nag_core::timezone;
use owo_colors::{OwoColorize, Style};

use crate::app::App;
use crate::cli::{DeleteCommand, DeleteScope};
use crate::util::{resolve_target, Target};

pub async fn delete_reminder(app: &App, command: DeleteCommand) -> Result<()> {
    let target = resolve_target(app.repo.as_ref(), &app.owner_id, &command.id).await?;
    let mode = match (command.scope, &target) {
        (DeleteScope::Series, _) | (_, Target::Template(_)) => DeleteMode::Series,
        (DeleteScope::Single, _) => DeleteMode::Single,
    };

    if !command.force {
        let what = match mode {
            DeleteMode::Series => "the whole series of",
            DeleteMode::Single => "this occurrence of",
        };
        let title = match &target {
            Target::Task(task) => task.title.clone(),
            Target::Template(template) => template.title.clone(),
            Target::Virtual(virtual_id) => virtual_id.to_string(),
        };
        let confirmation = Confirm::new()
            .with_prompt(format!("Delete {} '{}'?", what, title))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirmation {
            println!("Deletion cancelled.");
            return Ok(());
        }
    }

    let request = DeleteRequest {
        task_id: target.id_string(),
        mode,
        ..Default::default()
    };
    let outcome = app.calendar.delete(&app.owner_id, request, timezone::now()).await?;

    let success_style = Style::new().green().bold();
    if outcome.deleted_template {
        println!("{} Deleted the series; past occurrences are kept.", "✓".style(success_style));
    } else {
        if outcome.deleted_task {
            println!("{} Deleted reminder.", "✓".style(success_style));
        }
        if let Some(exception) = outcome.suppressed {
            println!(
                "{} It will not come back on {}.",
                "✓".style(success_style),
                exception.date.to_string().yellow()
            );
        }
    }
    Ok(())
}
