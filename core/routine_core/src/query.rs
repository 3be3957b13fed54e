//! Pure views over a [`Record`] snapshot. Nothing here mutates or reads the
//! clock; callers pass today's weekday index in.

use serde::{Deserialize, Serialize};

use crate::model::{ActivityLogEntry, Record, Routine, WEEKDAY_LABELS};

/// Placeholder shown wherever a value is absent.
pub const NONE_LABEL: &str = "—";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    #[default]
    All,
    Today,
    Completed,
    Pending,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKind {
    Name,
    Time,
    #[default]
    Next,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RoutineQuery {
    #[serde(default, rename = "q")]
    pub query: String,
    #[serde(default)]
    pub filter: FilterKind,
    #[serde(default)]
    pub sort: SortKind,
}

/// Filter, search and sort the routines. The returned order is stable with
/// respect to the record for equal keys.
pub fn filter_routines<'a>(record: &'a Record, q: &RoutineQuery, today: u8) -> Vec<&'a Routine> {
    let needle = q.query.trim().to_lowercase();

    let mut list: Vec<&Routine> = record
        .routines
        .iter()
        .filter(|r| match q.filter {
            FilterKind::All => true,
            FilterKind::Today => r.has_weekday(today) || r.repeat.is_daily(),
            FilterKind::Completed => r.concluded,
            FilterKind::Pending => !r.concluded,
        })
        .filter(|r| {
            needle.is_empty()
                || format!("{} {}", r.title, r.description)
                    .to_lowercase()
                    .contains(&needle)
        })
        .collect();

    // `sort_by` is stable.
    match q.sort {
        SortKind::Name => list.sort_by(|a, b| a.title.cmp(&b.title)),
        SortKind::Time | SortKind::Next => {
            list.sort_by(|a, b| time_sort_key(a).cmp(&time_sort_key(b)))
        }
    }
    list
}

/// Timed routines first, by "HH:MM"; untimed ones after all of them.
fn time_sort_key(r: &Routine) -> (bool, &str) {
    match r.scheduled_time() {
        Some(t) => (false, t),
        None => (true, ""),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NextRoutine {
    pub id: String,
    pub title: String,
    pub time: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_count: usize,
    pub completed_today_count: usize,
    pub next_routine: Option<NextRoutine>,
}

impl Summary {
    pub fn next_routine_label(&self) -> String {
        match &self.next_routine {
            Some(n) => format!("{} at {}", n.title, n.time),
            None => NONE_LABEL.to_string(),
        }
    }
}

pub fn summarize(record: &Record, today: u8) -> Summary {
    let completed_today_count = record
        .routines
        .iter()
        .filter(|r| r.concluded && r.has_weekday(today))
        .count();

    // Ties go to the routine stored first.
    let next = record
        .routines
        .iter()
        .filter_map(|r| r.scheduled_time().map(|t| (r, t)))
        .min_by_key(|(_, t)| *t);

    Summary {
        total_count: record.routines.len(),
        completed_today_count,
        next_routine: next.map(|(r, t)| NextRoutine {
            id: r.id.clone(),
            title: r.title.clone(),
            time: t.to_string(),
        }),
    }
}

/// Routines per weekday (Sunday first), by `days` membership only.
pub fn by_weekday_counts(record: &Record) -> [usize; 7] {
    let mut counts = [0usize; 7];
    for (idx, count) in counts.iter_mut().enumerate() {
        *count = record
            .routines
            .iter()
            .filter(|r| r.has_weekday(idx as u8))
            .count();
    }
    counts
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub index: u8,
    pub label: &'static str,
    pub count: usize,
}

pub fn by_weekday_report(record: &Record) -> Vec<DayCount> {
    by_weekday_counts(record)
        .iter()
        .enumerate()
        .map(|(idx, &count)| DayCount {
            index: idx as u8,
            label: WEEKDAY_LABELS[idx],
            count,
        })
        .collect()
}

/// The last `limit` entries, newest first.
pub fn recent_activities(record: &Record, limit: usize) -> Vec<&ActivityLogEntry> {
    record.activities.iter().rev().take(limit).collect()
}

/// "Mon, Wed" for a `days` list; unknown entries render as "?".
pub fn format_days(days: &[String]) -> String {
    if days.is_empty() {
        return NONE_LABEL.to_string();
    }
    days.iter()
        .map(|d| {
            crate::model::parse_weekday_digit(d)
                .map(|i| WEEKDAY_LABELS[i as usize])
                .unwrap_or("?")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_time(time: Option<&str>) -> &str {
    time.filter(|t| !t.is_empty()).unwrap_or(NONE_LABEL)
}
