use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use nag_core::error::CoreError;
use nag_core::models::{Task, Template};
use nag_core::recurrence::{TaskRef, VirtualId};
use nag_core::repository::{Repository, TaskRepository, TemplateRepository};

/// What a short id on the command line points at.
#[derive(Debug, Clone)]
pub enum Target {
    Task(Task),
    Template(Template),
    /// `<template prefix>@<date>` or a full `virtual-...` id
    Virtual(VirtualId),
}

impl Target {
    /// The id form the calendar operations accept.
    pub fn id_string(&self) -> String {
        match self {
            Target::Task(task) => task.id.to_string(),
            Target::Template(template) => template.id.to_string(),
            Target::Virtual(virtual_id) => virtual_id.to_string(),
        }
    }
}

/// Resolves a task or template by id prefix. `abc1@2024-05-20` addresses
/// the occurrence of template `abc1...` on that date.
pub async fn resolve_target(repo: &impl Repository, owner_id: &str, input: &str) -> Result<Target> {
    let input = input.trim();

    if input.starts_with("virtual-") {
        return match input.parse::<TaskRef>()? {
            TaskRef::Virtual(virtual_id) => Ok(Target::Virtual(virtual_id)),
            TaskRef::Real(_) => Err(anyhow!(CoreError::Validation(format!(
                "'{}' is not a virtual id",
                input
            )))),
        };
    }

    if let Some((prefix, date)) = input.split_once('@') {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| anyhow!(CoreError::Validation(format!("Invalid date '{}': {}", date, e))))?;
        let template = resolve_template(repo, owner_id, prefix).await?;
        return Ok(Target::Virtual(VirtualId::new(template.id, date)));
    }

    check_prefix(input)?;
    let tasks = repo.find_tasks_by_short_id_prefix(owner_id, input).await?;
    let templates = repo.find_templates_by_short_id_prefix(owner_id, input).await?;

    let mut candidates: Vec<Target> = tasks
        .into_iter()
        .map(Target::Task)
        .chain(templates.into_iter().map(Target::Template))
        .collect();

    if let Some(exact) = candidates.iter().position(|c| c.id_string() == input) {
        return Ok(candidates.swap_remove(exact));
    }

    match candidates.len() {
        0 => Err(anyhow!(CoreError::NotFound(format!(
            "No task found with ID prefix '{}'",
            input
        )))),
        1 => Ok(candidates.remove(0)),
        _ => Err(anyhow!(CoreError::AmbiguousId(
            candidates
                .iter()
                .map(|c| match c {
                    Target::Task(t) => (t.id.to_string(), t.title.clone()),
                    Target::Template(t) => (t.id.to_string(), format!("{} (template)", t.title)),
                    Target::Virtual(v) => (v.to_string(), String::new()),
                })
                .collect()
        ))),
    }
}

pub async fn resolve_template(repo: &impl Repository, owner_id: &str, prefix: &str) -> Result<Template> {
    check_prefix(prefix)?;
    let mut templates = repo.find_templates_by_short_id_prefix(owner_id, prefix).await?;
    match templates.len() {
        0 => Err(anyhow!(CoreError::NotFound(format!(
            "No template found with ID prefix '{}'",
            prefix
        )))),
        1 => Ok(templates.remove(0)),
        _ => Err(anyhow!(CoreError::AmbiguousId(
            templates
                .into_iter()
                .map(|t| (t.id.to_string(), t.title))
                .collect()
        ))),
    }
}

fn check_prefix(prefix: &str) -> Result<()> {
    if prefix.len() < 2 {
        return Err(anyhow!(CoreError::Validation(
            "Short ID must be at least 2 characters long.".to_string()
        )));
    }
    Ok(())
}
