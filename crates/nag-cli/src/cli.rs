use clap::{Parser, Subcommand, ValueEnum};

/// Reminders that keep asking until you answer
#[derive(Parser, Debug)]
#[command(name = "nag", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP API, the trigger dispatcher and the daily planner
    Serve(ServeCommand),
    /// Deliver every trigger that is due now, then exit
    Tick,
    /// Add a one-off reminder, or a recurring one with --every
    Add(AddCommand),
    /// Show the reminders of a day
    List(ListCommand),
    /// Mark a reminder as done
    Done(TargetCommand),
    /// Push a reminder back
    Snooze(SnoozeCommand),
    /// Move a reminder to the same time tomorrow
    Skip(TargetCommand),
    /// Delete a reminder, one occurrence or the whole series
    Delete(DeleteCommand),
    /// Materialize the recurring reminders of a day
    Plan(PlanCommand),
    /// Show the streak and completion heatmap
    Stats,
    /// Print the weekly report, optionally sending it to the chat
    Report(ReportCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct ServeCommand {
    /// Address to listen on, overrides the config
    #[clap(long)]
    pub listen: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    /// What to be reminded of
    pub title: String,
    /// When: HH:MM, 'YYYY-MM-DD HH:MM', RFC 3339 or +30m
    #[clap(short, long)]
    pub at: String,
    /// Repeat on these days (daily, weekdays, weekends or mon,wed,fri)
    #[clap(short, long)]
    pub every: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ListCommand {
    /// Day to show (today, tomorrow or YYYY-MM-DD)
    #[clap(default_value = "today")]
    pub date: String,
    /// List recurring templates instead of a day
    #[clap(long)]
    pub templates: bool,
    /// Print JSON in the same shape as GET /tasks
    #[clap(long)]
    pub json: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct TargetCommand {
    /// ID prefix, or <template prefix>@YYYY-MM-DD for a planned occurrence
    pub id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct SnoozeCommand {
    /// ID prefix, or <template prefix>@YYYY-MM-DD for a planned occurrence
    pub id: String,
    /// Minutes to push back, defaults to the configured snooze
    #[clap(short, long)]
    pub minutes: Option<i64>,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteCommand {
    /// ID prefix, or <template prefix>@YYYY-MM-DD for a planned occurrence
    pub id: String,
    /// Single occurrence or the whole series
    #[clap(long, value_enum, default_value_t = DeleteScope::Single)]
    pub scope: DeleteScope,
    /// Skip the confirmation prompt
    #[clap(short, long)]
    pub force: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    Single,
    Series,
}

#[derive(Parser, Debug, Clone)]
pub struct PlanCommand {
    /// Day to plan (today, tomorrow or YYYY-MM-DD)
    #[clap(default_value = "today")]
    pub date: String,
}

#[derive(Parser, Debug, Clone)]
pub struct ReportCommand {
    /// Also send the report through the notifier
    #[clap(long)]
    pub send: bool,
}
