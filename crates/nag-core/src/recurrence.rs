use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{Exception, Task, TaskStatus, Template};
use crate::timezone;

const VIRTUAL_PREFIX: &str = "virtual-";

/// Deterministic id of a not-yet-materialized template occurrence.
///
/// Rendered as `virtual-{templateId}-{YYYY-MM-DD}`, which can never collide
/// with a real occurrence id (a bare UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualId {
    pub template_id: Uuid,
    pub date: NaiveDate,
}

impl VirtualId {
    pub fn new(template_id: Uuid, date: NaiveDate) -> Self {
        Self { template_id, date }
    }
}

impl fmt::Display for VirtualId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}-{}",
            VIRTUAL_PREFIX,
            self.template_id,
            self.date.format("%Y-%m-%d")
        )
    }
}

impl Serialize for VirtualId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for VirtualId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::Validation(format!("Invalid virtual occurrence id: {}", s));
        let rest = s.strip_prefix(VIRTUAL_PREFIX).ok_or_else(invalid)?;
        // The date is the fixed-width tail; the UUID itself contains dashes.
        if rest.len() < 12 || !rest.is_char_boundary(rest.len() - 11) {
            return Err(invalid());
        }
        let (uuid_part, date_part) = rest.split_at(rest.len() - 11);
        let date_part = date_part.strip_prefix('-').ok_or_else(invalid)?;

        let template_id = Uuid::parse_str(uuid_part).map_err(|_| invalid())?;
        let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| invalid())?;
        Ok(Self { template_id, date })
    }
}

/// An occurrence id as received from a caller: either a stored task or a virtual slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRef {
    Real(Uuid),
    Virtual(VirtualId),
}

impl FromStr for TaskRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with(VIRTUAL_PREFIX) {
            return VirtualId::from_str(s).map(TaskRef::Virtual);
        }
        Uuid::parse_str(s)
            .map(TaskRef::Real)
            .map_err(|_| CoreError::Validation(format!("Invalid task id: {}", s)))
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskRef::Real(id) => write!(f, "{}", id),
            TaskRef::Virtual(id) => write!(f, "{}", id),
        }
    }
}

/// A template occurrence computed on read. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualOccurrence {
    pub id: VirtualId,
    pub owner_id: String,
    pub title: String,
    pub remind_at: DateTime<Utc>,
}

impl VirtualOccurrence {
    pub fn template_id(&self) -> Uuid {
        self.id.template_id
    }
}

/// One row of a day's agenda.
#[derive(Debug, Clone, PartialEq)]
pub enum DayEntry {
    Materialized(Task),
    Virtual(VirtualOccurrence),
}

impl DayEntry {
    pub fn remind_at(&self) -> DateTime<Utc> {
        match self {
            DayEntry::Materialized(task) => task.remind_at,
            DayEntry::Virtual(occurrence) => occurrence.remind_at,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            DayEntry::Materialized(task) => &task.title,
            DayEntry::Virtual(occurrence) => &occurrence.title,
        }
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            DayEntry::Materialized(task) => task.status,
            DayEntry::Virtual(_) => TaskStatus::Pending,
        }
    }

    pub fn id_string(&self) -> String {
        match self {
            DayEntry::Materialized(task) => task.id.to_string(),
            DayEntry::Virtual(occurrence) => occurrence.id.to_string(),
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, DayEntry::Virtual(_))
    }
}

/// RecurrenceExpander: turns templates into the occurrences of a single date.
///
/// All date arithmetic happens in the owner's fixed UTC offset: the weekday
/// code, the combination of date and time-of-day, and the "due on this date"
/// test for materialized tasks.
#[derive(Debug, Clone, Copy)]
pub struct RecurrenceExpander {
    offset: FixedOffset,
}

impl RecurrenceExpander {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Whether `template` produces an occurrence on `date`.
    #[inline]
    pub fn occurs_on(&self, template: &Template, date: NaiveDate) -> bool {
        template.recurrence.matches(date)
    }

    /// Due timestamp of `template`'s occurrence on `date`.
    pub fn due_on(&self, template: &Template, date: NaiveDate) -> DateTime<Utc> {
        timezone::local_datetime(date, template.time_of_day, self.offset)
    }

    /// Whether a stored task already fills the (template, date) slot.
    pub fn is_materialized(&self, tasks: &[Task], template_id: Uuid, date: NaiveDate) -> bool {
        tasks.iter().any(|task| {
            task.from_template_id == Some(template_id)
                && (task.occurrence_date == Some(date)
                    || timezone::local_date(task.remind_at, self.offset) == date)
        })
    }

    /// The virtual occurrence for (template, date), ignoring suppression and materialization.
    pub fn virtual_occurrence(&self, template: &Template, date: NaiveDate) -> VirtualOccurrence {
        VirtualOccurrence {
            id: VirtualId::new(template.id, date),
            owner_id: template.owner_id.clone(),
            title: template.title.clone(),
            remind_at: self.due_on(template, date),
        }
    }

    /// Builds the concrete task that materializes (template, date).
    pub fn instantiate(&self, template: &Template, date: NaiveDate, now: DateTime<Utc>) -> Task {
        Task {
            id: Uuid::now_v7(),
            owner_id: template.owner_id.clone(),
            title: template.title.clone(),
            remind_at: self.due_on(template, date),
            status: TaskStatus::Pending,
            snooze_count: 0,
            from_template_id: Some(template.id),
            occurrence_date: Some(date),
            notified_for: None,
            chased_until: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Template occurrences on `date` that are neither suppressed nor materialized.
    pub fn pending_virtuals(
        &self,
        templates: &[Template],
        tasks: &[Task],
        exceptions: &[Exception],
        date: NaiveDate,
    ) -> Vec<VirtualOccurrence> {
        let suppressed: HashSet<Uuid> = exceptions
            .iter()
            .filter(|exception| exception.date == date)
            .map(|exception| exception.template_id)
            .collect();

        templates
            .iter()
            .filter(|template| self.occurs_on(template, date))
            .filter(|template| !suppressed.contains(&template.id))
            .filter(|template| !self.is_materialized(tasks, template.id, date))
            .map(|template| self.virtual_occurrence(template, date))
            .collect()
    }

    /// Everything due on `date`: stored tasks plus synthesized virtual
    /// occurrences, sorted ascending by due timestamp.
    pub fn expand(
        &self,
        templates: &[Template],
        tasks: &[Task],
        exceptions: &[Exception],
        date: NaiveDate,
    ) -> Vec<DayEntry> {
        let mut entries: Vec<DayEntry> = tasks
            .iter()
            .filter(|task| timezone::local_date(task.remind_at, self.offset) == date)
            .cloned()
            .map(DayEntry::Materialized)
            .collect();

        entries.extend(
            self.pending_virtuals(templates, tasks, exceptions, date)
                .into_iter()
                .map(DayEntry::Virtual),
        );

        entries.sort_by_key(DayEntry::remind_at);
        entries
    }
}
