use std::sync::Arc;

use routine_core::model::RepeatKind;
use routine_core::{
    Clock, Command, CommandError, ManualClock, MemoryStore, Record, RoutineForm, SchedulerPoll,
    Store, Tracker,
};

// 2026-02-16 is a Monday.
const MONDAY_MORNING: &str = "2026-02-16 06:00:00";

fn walk_form() -> RoutineForm {
    RoutineForm {
        title: "Walk".to_string(),
        time: Some("07:30".to_string()),
        repeat: RepeatKind::Daily,
        days: ["1", "2", "3", "4", "5"].iter().map(|d| d.to_string()).collect(),
        ..Default::default()
    }
}

fn tracker_at(when: &str) -> (Tracker<MemoryStore, Arc<ManualClock>>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::parse(when).unwrap());
    (Tracker::new(MemoryStore::new(), clock.clone()), clock)
}

fn only_id(t: &Tracker<MemoryStore, Arc<ManualClock>>) -> String {
    t.record().routines[0].id.clone()
}

#[test]
fn walk_summary_before_and_after_completion() {
    let (mut t, clock) = tracker_at(MONDAY_MORNING);
    assert_eq!(clock.weekday_index(), 1);

    t.dispatch(Command::SaveRoutine(walk_form())).unwrap();
    let s = t.summary();
    assert_eq!(s.total_count, 1);
    assert_eq!(s.completed_today_count, 0);
    assert_eq!(s.next_routine_label(), "Walk at 07:30");

    t.dispatch(Command::ToggleComplete { id: only_id(&t) }).unwrap();
    assert_eq!(t.summary().completed_today_count, 1);
}

#[test]
fn import_empty_file_empties_record() {
    let (mut t, _) = tracker_at(MONDAY_MORNING);
    t.dispatch(Command::SaveRoutine(walk_form())).unwrap();

    t.dispatch(Command::Import {
        json: r#"{"routines":[],"activities":[]}"#.to_string(),
    })
    .unwrap();
    assert_eq!(t.record(), &Record::default());
    assert_eq!(t.summary().total_count, 0);
}

#[test]
fn import_without_routines_is_rejected() {
    let (mut t, _) = tracker_at(MONDAY_MORNING);
    t.dispatch(Command::SaveRoutine(walk_form())).unwrap();
    let before = t.record().clone();
    let saves = t.store().saves();

    let err = t
        .dispatch(Command::Import {
            json: r#"{"foo":1}"#.to_string(),
        })
        .unwrap_err();
    assert_eq!(err, CommandError::InvalidFile);
    assert_eq!(err.code(), "invalid_file");
    assert_eq!(t.record(), &before);
    assert_eq!(t.store().saves(), saves);
}

#[test]
fn poll_at_scheduled_minute_logs_exactly_once() {
    let (mut t, clock) = tracker_at(MONDAY_MORNING);
    t.dispatch(Command::SaveRoutine(walk_form())).unwrap();
    let logged = t.record().activities.len();

    let mut poll = SchedulerPoll::new();
    clock.advance_secs(90 * 60);
    assert_eq!(clock.hhmm(), "07:30");

    let shown = poll.tick(&mut t, true);
    assert_eq!(shown.len(), 1);
    assert_eq!(t.record().activities.len(), logged + 1);
    assert_eq!(t.record().activities[logged].text, "Notification: Walk");

    // A second tick inside the same minute does not fire again.
    clock.advance_secs(30);
    assert!(poll.tick(&mut t, true).is_empty());
    assert_eq!(t.record().activities.len(), logged + 1);
}

#[test]
fn delete_removes_routine_with_its_comments() {
    let (mut t, _) = tracker_at(MONDAY_MORNING);
    t.dispatch(Command::SaveRoutine(walk_form())).unwrap();
    let id = only_id(&t);
    t.dispatch(Command::AddComment {
        routine_id: id.clone(),
        text: "pending note".to_string(),
    })
    .unwrap();
    let logged = t.record().activities.len();

    t.dispatch(Command::DeleteRoutine {
        id: id.clone(),
        confirmed: true,
    })
    .unwrap();
    assert!(t.record().find(&id).is_none());
    assert_eq!(t.record().activities.len(), logged + 1);
    assert_eq!(
        t.record().activities.last().unwrap().text,
        "Deleted routine: Walk"
    );
}

#[test]
fn persisted_record_reloads_equal() {
    let (mut t, _) = tracker_at(MONDAY_MORNING);
    t.dispatch(Command::SaveRoutine(walk_form())).unwrap();
    t.dispatch(Command::AddComment {
        routine_id: only_id(&t),
        text: "note".to_string(),
    })
    .unwrap();

    let raw = t.store().raw().unwrap().to_string();
    let mut reopened = MemoryStore::with_raw(raw);
    assert_eq!(&reopened.load(), t.record());
}
