use std::collections::HashSet;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Clock;
use crate::model::{Record, Routine};
use crate::store::Store;
use crate::tracker::Tracker;

pub const DEFAULT_POLL_SECONDS: u64 = 30;

/// A user-facing reminder produced by a poll match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub routine_id: String,
    pub title: String,
    pub body: String,
    /// Epoch milliseconds.
    pub time: i64,
}

/// A routine at its scheduled minute fires when it repeats daily, lists
/// today, or lists no days at all.
pub fn is_eligible(r: &Routine, weekday: u8) -> bool {
    r.repeat.is_daily() || r.has_weekday(weekday) || r.days.is_empty()
}

/// Routines whose time is exactly `hhmm` and that are eligible today.
pub fn due_routines<'a>(record: &'a Record, hhmm: &str, weekday: u8) -> Vec<&'a Routine> {
    record
        .routines
        .iter()
        .filter(|r| r.scheduled_time() == Some(hhmm))
        .filter(|r| is_eligible(r, weekday))
        .collect()
}

/// Time-of-day poll.
///
/// Fires each due routine at most once per calendar minute: ids that fired
/// are remembered until the minute changes. A minute in which no tick
/// happens is skipped, not replayed.
#[derive(Debug, Default)]
pub struct SchedulerPoll {
    minute: Option<NaiveDateTime>,
    fired: HashSet<String>,
}

impl SchedulerPoll {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids that should fire at `now`, marking them as fired.
    pub fn select(&mut self, record: &Record, now: NaiveDateTime) -> Vec<String> {
        let minute = truncate_to_minute(now);
        if self.minute != Some(minute) {
            self.minute = Some(minute);
            self.fired.clear();
        }

        let hhmm = format!("{:02}:{:02}", now.hour(), now.minute());
        let weekday = now.weekday().num_days_from_sunday() as u8;

        due_routines(record, &hhmm, weekday)
            .into_iter()
            .filter(|r| self.fired.insert(r.id.clone()))
            .map(|r| r.id.clone())
            .collect()
    }

    /// Run one poll: log every match, persist once, and hand back the
    /// notifications to show when `notify` is on.
    pub fn tick<S: Store, C: Clock>(
        &mut self,
        tracker: &mut Tracker<S, C>,
        notify: bool,
    ) -> Vec<Notification> {
        let now = tracker.clock().local_now();
        let ids = self.select(tracker.record(), now);
        if ids.is_empty() {
            return Vec::new();
        }

        let stamp = tracker.clock().epoch_millis();
        let mut out = Vec::new();
        for id in &ids {
            let Some(r) = tracker.record().find(id) else {
                continue;
            };
            let n = Notification {
                routine_id: r.id.clone(),
                title: r.title.clone(),
                body: r.description.clone(),
                time: stamp,
            };
            info!("routine due: {} ({})", n.title, n.routine_id);
            tracker.append_activity(format!("Notification: {}", n.title));
            if notify {
                out.push(n);
            }
        }
        tracker.persist();
        out
    }
}

fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::RepeatKind;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn routine(id: &str, time: &str, repeat: RepeatKind, days: &[&str]) -> Routine {
        Routine {
            id: id.to_string(),
            title: format!("title {id}"),
            description: format!("body {id}"),
            time: Some(time.to_string()),
            repeat,
            days: days.iter().map(|d| d.to_string()).collect(),
            concluded: false,
            comments: Vec::new(),
        }
    }

    #[test]
    fn eligibility_rules() {
        let daily = routine("a", "07:30", RepeatKind::Daily, &["3"]);
        let weekday = routine("b", "07:30", RepeatKind::None, &["1"]);
        let every_day = routine("c", "07:30", RepeatKind::Weekly, &[]);
        let other_day = routine("d", "07:30", RepeatKind::None, &["2"]);
        let junk_day = routine("e", "07:30", RepeatKind::None, &["9"]);

        assert!(is_eligible(&daily, 1));
        assert!(is_eligible(&weekday, 1));
        assert!(is_eligible(&every_day, 1));
        assert!(!is_eligible(&other_day, 1));
        assert!(!is_eligible(&junk_day, 1));
    }

    #[test]
    fn due_routines_requires_exact_minute() {
        let mut rec = Record::default();
        rec.routines.push(routine("a", "07:30", RepeatKind::Daily, &[]));
        rec.routines.push(routine("b", "07:31", RepeatKind::Daily, &[]));
        rec.routines.push(routine("c", "7:30", RepeatKind::Daily, &[]));

        let due: Vec<&str> = due_routines(&rec, "07:30", 1)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(due, vec!["a"]);
    }

    #[test]
    fn select_fires_once_per_minute() {
        let mut rec = Record::default();
        rec.routines.push(routine("a", "07:30", RepeatKind::Daily, &[]));
        let clock = ManualClock::parse("2026-02-16 07:30:05").unwrap();
        let mut poll = SchedulerPoll::new();

        assert_eq!(poll.select(&rec, clock.local_now()), vec!["a".to_string()]);
        clock.advance_secs(30);
        assert!(poll.select(&rec, clock.local_now()).is_empty());

        // Same wall minute a day later fires again.
        clock.advance_secs(24 * 3600);
        assert_eq!(poll.select(&rec, clock.local_now()), vec!["a".to_string()]);
    }

    #[test]
    fn tick_logs_and_respects_notify_flag() {
        let clock = Arc::new(ManualClock::parse("2026-02-16 07:30:00").unwrap());
        let mut rec = Record::default();
        rec.routines.push(routine("a", "07:30", RepeatKind::None, &["1"]));
        let store = MemoryStore::with_raw(serde_json::to_string(&rec).unwrap());
        let mut tracker = Tracker::new(store, clock.clone());

        let mut poll = SchedulerPoll::new();
        let shown = poll.tick(&mut tracker, false);
        assert!(shown.is_empty());
        assert_eq!(tracker.record().activities.len(), 1);
        assert_eq!(tracker.record().activities[0].text, "Notification: title a");
        assert_eq!(tracker.store().saves(), 1);

        clock.advance_secs(60);
        let mut poll = SchedulerPoll::new();
        assert!(poll.tick(&mut tracker, true).is_empty());
        assert_eq!(tracker.record().activities.len(), 1);

        clock.set(
            NaiveDateTime::parse_from_str("2026-02-23 07:30:40", "%Y-%m-%d %H:%M:%S").unwrap(),
        );
        let shown = poll.tick(&mut tracker, true);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].body, "body a");
        assert_eq!(tracker.record().activities.len(), 2);
    }
}
