#![allow(dead_code)]

use assert_cmd::Command;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const OWNER: &str = "1069945118";

/// Runs the `nag` binary against a throwaway database and working directory
pub struct CliTestHarness {
    temp_dir: TempDir,
    db_path: PathBuf,
}

impl CliTestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        Self { temp_dir, db_path }
    }

    /// A command with config pointed at the temp dir; no `nag.toml` is read
    /// from the developer's checkout.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("nag").expect("Failed to find nag binary");
        cmd.current_dir(self.temp_dir.path())
            .env("NAG_DATABASE_PATH", &self.db_path)
            .env("NAG_OWNER_ID", OWNER)
            .env("NAG_UTC_OFFSET", "+00:00")
            .env("RUST_LOG", "warn")
            .env_remove("NAG_TELEGRAM__BOT_TOKEN");
        cmd
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn run_success(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().success()
    }

    pub fn run_failure(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().failure()
    }

    /// Runs a `--json` command and parses its stdout.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self.run_success(args).get_output().stdout.clone();
        serde_json::from_slice(&output).expect("command printed valid JSON")
    }

    /// Entries of `list <date> --json`.
    pub fn day(&self, date: &str) -> Vec<Value> {
        self.json(&["list", date, "--json"])["tasks"]
            .as_array()
            .cloned()
            .unwrap_or_default()
    }

    /// Full id of the only template, for addressing it exactly.
    pub fn single_template_id(&self) -> String {
        let templates = self.json(&["list", "--templates", "--json"]);
        let templates = templates.as_array().expect("template list");
        assert_eq!(templates.len(), 1, "expected exactly one template");
        templates[0]["id"].as_str().expect("template id").to_string()
    }
}

pub mod assertions {
    use predicates::prelude::*;

    pub fn reminder_added() -> impl Predicate<str> {
        predicate::str::contains("✓").and(predicate::str::contains("Added"))
    }

    pub fn has_error() -> impl Predicate<str> {
        predicate::str::contains("Error")
    }
}
