//! Streak, heatmap and weekly report. Read-only over the occurrence history.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc, Weekday};
use serde::Serialize;

use crate::models::{Task, TaskStatus};
use crate::timezone;

/// How far back a streak is followed.
pub const STREAK_LOOKBACK_DAYS: u32 = 365;
pub const DEFAULT_HEATMAP_DAYS: u32 = 90;

/// Display tier of a heatmap cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatLevel {
    None,
    Low,
    Medium,
    High,
    Max,
}

impl HeatLevel {
    /// Canonical buckets: 0, 1, 2, 3, 4 or more.
    pub fn from_count(count: u32) -> Self {
        match count {
            0 => HeatLevel::None,
            1 => HeatLevel::Low,
            2 => HeatLevel::Medium,
            3 => HeatLevel::High,
            _ => HeatLevel::Max,
        }
    }
}

/// Completions per owner-local day over a trailing window.
///
/// Serializes as `{"YYYY-MM-DD": count}` with only non-zero days present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Heatmap {
    counts: BTreeMap<NaiveDate, u32>,
    #[serde(skip)]
    start: NaiveDate,
    #[serde(skip)]
    end: NaiveDate,
}

impl Heatmap {
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn count(&self, date: NaiveDate) -> u32 {
        self.counts.get(&date).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &BTreeMap<NaiveDate, u32> {
        &self.counts
    }

    /// Every day of the window, in order, with its raw count and bucket.
    pub fn cells(&self) -> impl Iterator<Item = (NaiveDate, u32, HeatLevel)> + '_ {
        self.start
            .iter_days()
            .take_while(move |d| *d <= self.end)
            .map(move |d| {
                let count = self.count(d);
                (d, count, HeatLevel::from_count(count))
            })
    }
}

/// The Sunday on or before `date`.
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

/// StreakAndHeatmapCalculator: derives both views from completion timestamps
/// bucketed into the owner's local calendar days.
#[derive(Debug, Clone, Copy)]
pub struct StreakAndHeatmapCalculator {
    offset: FixedOffset,
    heatmap_days: u32,
}

impl StreakAndHeatmapCalculator {
    pub fn new(offset: FixedOffset, heatmap_days: u32) -> Self {
        Self { offset, heatmap_days }
    }

    fn completion_day(&self, task: &Task) -> Option<NaiveDate> {
        match (task.status, task.completed_at) {
            (TaskStatus::Done, Some(at)) => Some(timezone::local_date(at, self.offset)),
            _ => None,
        }
    }

    /// Distinct local dates with at least one completion.
    pub fn completion_dates(&self, tasks: &[Task]) -> BTreeSet<NaiveDate> {
        tasks.iter().filter_map(|t| self.completion_day(t)).collect()
    }

    /// Consecutive completed days ending today or yesterday.
    ///
    /// A missing today is skipped once, so an unfinished day does not reset
    /// a streak earned through yesterday.
    pub fn streak(&self, tasks: &[Task], today: NaiveDate) -> u32 {
        streak_from_dates(&self.completion_dates(tasks), today)
    }

    pub fn heatmap(&self, tasks: &[Task], today: NaiveDate) -> Heatmap {
        let start = start_of_week(today - Duration::days(i64::from(self.heatmap_days)));
        let mut counts = BTreeMap::new();
        for day in tasks.iter().filter_map(|t| self.completion_day(t)) {
            if day >= start && day <= today {
                *counts.entry(day).or_insert(0) += 1;
            }
        }
        Heatmap { counts, start, end: today }
    }
}

pub fn streak_from_dates(dates: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut day = today;
    for checked in 0..STREAK_LOOKBACK_DAYS {
        if dates.contains(&day) {
            streak += 1;
        } else if checked > 0 {
            break;
        }
        match day.pred_opt() {
            Some(previous) => day = previous,
            None => break,
        }
    }
    streak
}

// ============================================================================
// Weekly report
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyReport {
    pub streak: u32,
    pub total: usize,
    pub completed: usize,
    /// Rounded percentage, 0 when nothing was due
    pub completion_rate: u32,
    pub best_day: Option<Weekday>,
}

impl WeeklyReport {
    /// Occurrences due in the 7 days up to `now`.
    pub fn build(tasks: &[Task], offset: FixedOffset, now: DateTime<Utc>) -> Self {
        let window_start = now - Duration::days(7);
        let week: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.remind_at >= window_start && t.remind_at <= now)
            .collect();

        let total = week.len();
        let completed: Vec<&&Task> = week.iter().filter(|t| t.status == TaskStatus::Done).collect();
        let completion_rate = if total > 0 {
            ((completed.len() as f64 / total as f64) * 100.0).round() as u32
        } else {
            0
        };

        let mut per_day: BTreeMap<u32, (Weekday, usize)> = BTreeMap::new();
        for task in &completed {
            let weekday = timezone::local_date(task.remind_at, offset).weekday();
            per_day
                .entry(weekday.num_days_from_monday())
                .or_insert((weekday, 0))
                .1 += 1;
        }
        let mut best_day = None;
        let mut best_count = 0;
        for (weekday, count) in per_day.values() {
            if *count > best_count {
                best_count = *count;
                best_day = Some(*weekday);
            }
        }

        let calculator = StreakAndHeatmapCalculator::new(offset, DEFAULT_HEATMAP_DAYS);
        Self {
            streak: calculator.streak(tasks, timezone::local_date(now, offset)),
            total,
            completed: completed.len(),
            completion_rate,
            best_day,
        }
    }

    pub fn motivation(&self) -> &'static str {
        if self.completion_rate >= 80 {
            "You're on fire! 🔥 Amazing consistency!"
        } else if self.completion_rate >= 50 {
            "Good progress! Let's aim higher next week. 💪"
        } else {
            "Rough week? Reset and crush it this week! 🌅"
        }
    }

    /// Markdown chat message.
    pub fn render(&self) -> String {
        let best_day = match self.best_day {
            Some(day) => weekday_name(day),
            None => "N/A",
        };
        format!(
            "📊 *Weekly Insight*\n\n🔥 *Current Streak*: {} days\n✅ *Completion Rate*: {}% ({}/{})\n🏆 *Best Day*: {}\n\n_{}_",
            self.streak,
            self.completion_rate,
            self.completed,
            self.total,
            best_day,
            self.motivation()
        )
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
