use clap::Parser;
use nag_core::error::CoreError;
use nag_core::models::ReminderAction;
use owo_colors::{OwoColorize, Style};
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod commands;
mod config;
mod parser;
mod server;
mod util;
mod views;

#[tokio::main]
async fn main() {
    // Logs go to stderr so command output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "nag=info,nag_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();

    let config = match config::Config::new() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} Invalid configuration: {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    let app = match app::App::build(config).await {
        Ok(app) => app,
        Err(e) => {
            handle_error(e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        cli::Commands::Serve(command) => commands::serve::serve(app, command).await,
        cli::Commands::Tick => commands::plan::tick(&app).await,
        cli::Commands::Add(command) => commands::add::add_reminder(&app, command).await,
        cli::Commands::List(command) => commands::list::list_reminders(&app, command).await,
        cli::Commands::Done(command) => {
            commands::respond::respond(&app, &command.id, ReminderAction::Done).await
        }
        cli::Commands::Snooze(command) => {
            let minutes = command
                .minutes
                .unwrap_or_else(|| app.machine.config().snooze.num_minutes());
            commands::respond::respond(&app, &command.id, ReminderAction::Snooze { minutes }).await
        }
        cli::Commands::Skip(command) => {
            commands::respond::respond(&app, &command.id, ReminderAction::Skip).await
        }
        cli::Commands::Delete(command) => commands::delete::delete_reminder(&app, command).await,
        cli::Commands::Plan(command) => commands::plan::plan(&app, command).await,
        cli::Commands::Stats => commands::stats::stats(&app).await,
        cli::Commands::Report(command) => commands::stats::report(&app, command).await,
    };

    if let Err(e) = result {
        handle_error(e);
        std::process::exit(1);
    }
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    if let Some(core_error) = err.downcast_ref::<CoreError>() {
        match core_error {
            CoreError::NotFound(s) => {
                eprintln!("{} {}", "Error:".style(error_style), s);
            }
            CoreError::AmbiguousId(items) => {
                eprintln!("{}", "Error: Ambiguous ID.".style(error_style));
                eprintln!("Did you mean one of these?");
                for (id, title) in items {
                    eprintln!("  {} ({})", id.yellow(), title);
                }
            }
            CoreError::Validation(s) => {
                eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
            }
            CoreError::InvalidOffset(s) => {
                eprintln!(
                    "{} Invalid utc_offset '{}' (use e.g. +05:30)",
                    "Error:".style(error_style),
                    s.yellow()
                );
            }
            CoreError::Delivery(s) => {
                eprintln!("{} Could not reach the chat: {}", "Error:".style(error_style), s);
            }
            _ => eprintln!("{} {:#}", "Error:".style(error_style), err),
        }
    } else {
        eprintln!("{} {:#}", "Error:".style(error_style), err);
    }
}
