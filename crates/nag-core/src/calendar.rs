//! Calendar operations: the day view, create/update/delete of occurrences
//! and templates, and the daily rollover that materializes template slots.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::CoreError;
use crate::escalation::EscalationStateMachine;
use crate::models::{
    DeleteMode, DeleteRequest, Exception, NewTaskData, ReminderAction, Task, TaskStatus, Template,
    UpdateTaskData,
};
use crate::recurrence::{DayEntry, RecurrenceExpander, TaskRef, VirtualId};
use crate::repository::{
    ExceptionRepository, MaterializationRepository, Repository, TaskRepository, TemplateRepository,
};
use crate::stats::{Heatmap, StreakAndHeatmapCalculator, WeeklyReport};
use crate::timezone;

/// One row of the day view, real or virtual.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub task_id: String,
    pub title: String,
    pub remind_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub snooze_count: u32,
    pub from_template_id: Option<Uuid>,
    pub is_virtual: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<DayEntry> for CalendarEntry {
    fn from(entry: DayEntry) -> Self {
        match entry {
            DayEntry::Materialized(task) => CalendarEntry {
                task_id: task.id.to_string(),
                title: task.title,
                remind_at: task.remind_at,
                status: task.status,
                snooze_count: task.snooze_count,
                from_template_id: task.from_template_id,
                is_virtual: false,
                completed_at: task.completed_at,
                created_at: Some(task.created_at),
            },
            DayEntry::Virtual(occurrence) => CalendarEntry {
                task_id: occurrence.id.to_string(),
                title: occurrence.title,
                remind_at: occurrence.remind_at,
                status: TaskStatus::Pending,
                snooze_count: 0,
                from_template_id: Some(occurrence.id.template_id),
                is_virtual: true,
                completed_at: None,
                created_at: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayView {
    pub date: NaiveDate,
    pub tasks: Vec<CalendarEntry>,
    pub streak: u32,
    pub heatmap: Heatmap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    Task(Task),
    Template {
        template: Template,
        /// The instance for the template's first day, when it matches the recurrence
        instance: Option<Task>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Updated {
    Task(Task),
    Template(Template),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOutcome {
    pub deleted_task: bool,
    pub deleted_template: bool,
    pub suppressed: Option<Exception>,
}

/// CalendarService: the operations behind the HTTP surface and the CLI.
pub struct CalendarService {
    repo: Arc<dyn Repository>,
    machine: Arc<EscalationStateMachine>,
    expander: RecurrenceExpander,
    stats: StreakAndHeatmapCalculator,
}

impl CalendarService {
    pub fn new(
        repo: Arc<dyn Repository>,
        machine: Arc<EscalationStateMachine>,
        expander: RecurrenceExpander,
        stats: StreakAndHeatmapCalculator,
    ) -> Self {
        Self {
            repo,
            machine,
            expander,
            stats,
        }
    }

    pub fn expander(&self) -> &RecurrenceExpander {
        &self.expander
    }

    pub fn machine(&self) -> &Arc<EscalationStateMachine> {
        &self.machine
    }

    /// The owner-local date of `now`.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        timezone::local_date(now, self.expander.offset())
    }

    /// Agenda of `date` plus the streak and heatmap as of `now`.
    pub async fn day_view(&self, owner_id: &str, date: NaiveDate, now: DateTime<Utc>) -> Result<DayView, CoreError> {
        let items = self.repo.load_owner(owner_id).await?;
        let today = self.today(now);

        let tasks = self
            .expander
            .expand(&items.templates, &items.tasks, &items.exceptions, date)
            .into_iter()
            .map(CalendarEntry::from)
            .collect();

        Ok(DayView {
            date,
            tasks,
            streak: self.stats.streak(&items.tasks, today),
            heatmap: self.stats.heatmap(&items.tasks, today),
        })
    }

    // ========================================================================
    // Create
    // ========================================================================

    pub async fn create(&self, owner_id: &str, data: NewTaskData, now: DateTime<Utc>) -> Result<Created, CoreError> {
        let title = data.title.trim().to_string();
        if title.is_empty() {
            return Err(CoreError::Validation("Title is required".to_string()));
        }

        if data.is_template() {
            return self.create_template(owner_id, title, &data, now).await;
        }
        if let Some(template_id) = data.from_template_id {
            return self.create_from_template(owner_id, template_id, title, data.remind_at, now).await;
        }

        let remind_at = data
            .remind_at
            .ok_or_else(|| CoreError::Validation("remindAt is required".to_string()))?;
        let task = Task {
            id: Uuid::now_v7(),
            owner_id: owner_id.to_string(),
            title,
            remind_at,
            created_at: now,
            updated_at: now,
            ..Default::default()
        };
        self.repo.insert_task(&task).await?;
        self.machine.scheduler().schedule(&task).await?;
        tracing::info!(owner_id, task_id = %task.id, %remind_at, "task created");
        Ok(Created::Task(task))
    }

    async fn create_template(
        &self,
        owner_id: &str,
        title: String,
        data: &NewTaskData,
        now: DateTime<Utc>,
    ) -> Result<Created, CoreError> {
        let remind_at = data
            .remind_at
            .ok_or_else(|| CoreError::Validation("remindAt is required for a template".to_string()))?;
        let recurrence = data
            .recurrence
            .clone()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| CoreError::Validation("recurrence is required for a template".to_string()))?;

        let offset = self.expander.offset();
        let template = Template {
            id: Uuid::now_v7(),
            owner_id: owner_id.to_string(),
            title,
            time_of_day: timezone::local_minute(remind_at, offset),
            recurrence,
            created_at: now,
            updated_at: now,
        };
        self.repo.add_template(&template).await?;
        tracing::info!(owner_id, template_id = %template.id, recurrence = %template.recurrence, "template created");

        // The first day gets a real instance right away when it matches.
        let first_day = timezone::local_date(remind_at, offset);
        let instance = if self.expander.occurs_on(&template, first_day) {
            Some(self.materialize(&template, first_day, now).await?)
        } else {
            None
        };

        Ok(Created::Template { template, instance })
    }

    async fn create_from_template(
        &self,
        owner_id: &str,
        template_id: Uuid,
        title: String,
        remind_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Created, CoreError> {
        let template = self.find_template(owner_id, template_id).await?;
        let date = match remind_at {
            Some(at) => timezone::local_date(at, self.expander.offset()),
            None => self.today(now),
        };

        let mut instance = self.expander.instantiate(&template, date, now);
        instance.title = title;
        if let Some(at) = remind_at {
            instance.remind_at = at;
        }

        let (task, created) = self.repo.materialize_instance(&instance).await?;
        if created {
            self.schedule_if_upcoming(&task, now).await?;
        }
        Ok(Created::Task(task))
    }

    /// Materializes (template, date), scheduling it when this call created an upcoming instance.
    async fn materialize(&self, template: &Template, date: NaiveDate, now: DateTime<Utc>) -> Result<Task, CoreError> {
        let instance = self.expander.instantiate(template, date, now);
        let (task, created) = self.repo.materialize_instance(&instance).await?;
        if created {
            self.schedule_if_upcoming(&task, now).await?;
        }
        Ok(task)
    }

    async fn schedule_if_upcoming(&self, task: &Task, now: DateTime<Utc>) -> Result<(), CoreError> {
        if task.status.is_open() && task.remind_at >= now {
            self.machine.scheduler().schedule(task).await?;
        }
        Ok(())
    }

    async fn find_template(&self, owner_id: &str, template_id: Uuid) -> Result<Template, CoreError> {
        self.repo
            .find_template(owner_id, template_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Template with id {} not found", template_id)))
    }

    /// Returns the stored task behind `virtual_id`, creating it if needed.
    pub async fn materialize_virtual(
        &self,
        owner_id: &str,
        virtual_id: VirtualId,
        now: DateTime<Utc>,
    ) -> Result<Task, CoreError> {
        let template = self.find_template(owner_id, virtual_id.template_id).await?;
        self.materialize(&template, virtual_id.date, now).await
    }

    // ========================================================================
    // Update
    // ========================================================================

    pub async fn update(&self, owner_id: &str, data: UpdateTaskData, now: DateTime<Utc>) -> Result<Updated, CoreError> {
        let task = match data.task_id.parse::<TaskRef>()? {
            TaskRef::Virtual(virtual_id) => self.materialize_virtual(owner_id, virtual_id, now).await?,
            TaskRef::Real(id) => match self.repo.find_task(owner_id, id).await? {
                Some(task) => task,
                None => return self.update_template(owner_id, id, &data, now).await.map(Updated::Template),
            },
        };

        if data.recurrence.is_some() {
            return Err(CoreError::Validation(
                "recurrence can only be changed on a template".to_string(),
            ));
        }

        let mut task = task;
        if data.title.is_some() || data.remind_at.is_some() {
            task = self
                .repo
                .update_task_fields(owner_id, task.id, data.title.as_deref(), data.remind_at, now)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", task.id)))?;
        }

        match data.status {
            Some(status) => task = self.apply_status(owner_id, task, status, now).await?,
            None => {
                if data.remind_at.is_some() && task.status.is_open() {
                    // Same names, so the old cycle's triggers are replaced. A
                    // past due time fires on the next poll.
                    self.machine.scheduler().reschedule(&task, task.remind_at).await?;
                }
            }
        }

        tracing::info!(owner_id, task_id = %task.id, status = %task.status, "task updated");
        Ok(Updated::Task(task))
    }

    async fn apply_status(
        &self,
        owner_id: &str,
        task: Task,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<Task, CoreError> {
        let action = match status {
            TaskStatus::Pending => {
                let reopened = self
                    .repo
                    .reopen_task(owner_id, task.id, now)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", task.id)))?;
                if reopened.remind_at >= now {
                    self.machine.scheduler().schedule(&reopened).await?;
                } else {
                    self.machine.scheduler().cancel_all(owner_id, reopened.id).await;
                }
                return Ok(reopened);
            }
            TaskStatus::Done => ReminderAction::Done,
            TaskStatus::Snoozed => ReminderAction::Snooze {
                minutes: self.machine.config().snooze.num_minutes(),
            },
            TaskStatus::Skipped => ReminderAction::Skip,
        };

        self.machine.apply(owner_id, task.id, action, now).await?;
        self.repo
            .find_task(owner_id, task.id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", task.id)))
    }

    async fn update_template(
        &self,
        owner_id: &str,
        id: Uuid,
        data: &UpdateTaskData,
        now: DateTime<Utc>,
    ) -> Result<Template, CoreError> {
        let mut template = self
            .repo
            .find_template(owner_id, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))?;

        if data.status.is_some() {
            return Err(CoreError::Validation("A template has no status".to_string()));
        }
        if let Some(title) = &data.title {
            template.title = title.trim().to_string();
        }
        if let Some(recurrence) = &data.recurrence {
            template.recurrence = recurrence.clone();
        }
        if let Some(remind_at) = data.remind_at {
            template.time_of_day = timezone::local_minute(remind_at, self.expander.offset());
        }
        template.updated_at = now;

        // Existing exceptions and materialized instances are left untouched.
        self.repo.update_template(&template).await?;
        tracing::info!(owner_id, template_id = %template.id, "template updated");
        Ok(template)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    pub async fn delete(&self, owner_id: &str, request: DeleteRequest, now: DateTime<Utc>) -> Result<DeleteOutcome, CoreError> {
        let task_ref = request.task_id.parse::<TaskRef>()?;
        match request.mode {
            DeleteMode::Series => self.delete_series(owner_id, task_ref, request.template_id).await,
            DeleteMode::Single => self.delete_single(owner_id, task_ref, &request, now).await,
        }
    }

    async fn delete_series(
        &self,
        owner_id: &str,
        task_ref: TaskRef,
        template_id: Option<Uuid>,
    ) -> Result<DeleteOutcome, CoreError> {
        let target = match (template_id, task_ref) {
            (Some(id), _) => id,
            (None, TaskRef::Virtual(virtual_id)) => virtual_id.template_id,
            (None, TaskRef::Real(id)) => match self.repo.find_task(owner_id, id).await? {
                Some(Task {
                    from_template_id: Some(template_id),
                    ..
                }) => template_id,
                _ => id,
            },
        };

        if !self.repo.delete_template(owner_id, target).await? {
            return Err(CoreError::NotFound(format!("Template with id {} not found", target)));
        }
        tracing::info!(owner_id, template_id = %target, "template deleted");
        Ok(DeleteOutcome {
            deleted_template: true,
            ..Default::default()
        })
    }

    async fn delete_single(
        &self,
        owner_id: &str,
        task_ref: TaskRef,
        request: &DeleteRequest,
        now: DateTime<Utc>,
    ) -> Result<DeleteOutcome, CoreError> {
        let mut outcome = DeleteOutcome::default();

        let slot = match task_ref {
            TaskRef::Virtual(virtual_id) => Some((virtual_id.template_id, virtual_id.date)),
            TaskRef::Real(id) => {
                let existing = self.repo.find_task(owner_id, id).await?;
                if existing.is_some() {
                    outcome.deleted_task = self.repo.delete_task(owner_id, id).await?;
                    self.machine.scheduler().cancel_all(owner_id, id).await;
                }
                existing.and_then(|task| task.from_template_id.zip(task.occurrence_date))
            }
        };

        let slot = match (request.template_id, request.date) {
            (Some(template_id), Some(date)) => Some((template_id, date)),
            _ => slot,
        };
        if let Some((template_id, date)) = slot {
            outcome.suppressed = Some(self.repo.suppress(owner_id, template_id, date, now).await?);
        }

        if !outcome.deleted_task && outcome.suppressed.is_none() {
            return Err(CoreError::NotFound(format!("Task with id {} not found", request.task_id)));
        }
        tracing::info!(
            owner_id,
            task_id = %request.task_id,
            deleted = outcome.deleted_task,
            suppressed = outcome.suppressed.is_some(),
            "single occurrence deleted"
        );
        Ok(outcome)
    }

    // ========================================================================
    // Rollover and reporting
    // ========================================================================

    /// Materializes every unsuppressed template slot of `date` and schedules
    /// the upcoming ones. Returns the instances this call created.
    pub async fn plan_day(&self, owner_id: &str, date: NaiveDate, now: DateTime<Utc>) -> Result<Vec<Task>, CoreError> {
        let items = self.repo.load_owner(owner_id).await?;
        let mut created = Vec::new();

        for occurrence in self
            .expander
            .pending_virtuals(&items.templates, &items.tasks, &items.exceptions, date)
        {
            let Some(template) = items.templates.iter().find(|t| t.id == occurrence.template_id()) else {
                continue;
            };
            let instance = self.expander.instantiate(template, date, now);
            let (task, inserted) = self.repo.materialize_instance(&instance).await?;
            if inserted {
                self.schedule_if_upcoming(&task, now).await?;
                created.push(task);
            }
        }

        tracing::info!(owner_id, %date, materialized = created.len(), "day planned");
        Ok(created)
    }

    pub async fn weekly_report(&self, owner_id: &str, now: DateTime<Utc>) -> Result<WeeklyReport, CoreError> {
        let tasks = self.repo.find_tasks(owner_id).await?;
        Ok(WeeklyReport::build(&tasks, self.expander.offset(), now))
    }
}
