use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::clock::Clock;
use crate::error::CommandError;
use crate::model::{new_id, ActivityLogEntry, Comment, Record, RepeatKind, Routine, RoutineForm};
use crate::query::{self, DayCount, RoutineQuery, Summary};
use crate::store::Store;

/// A user intent, already translated from whatever surface raised it.
#[derive(Clone, Debug)]
pub enum Command {
    SaveRoutine(RoutineForm),
    ToggleComplete { id: String },
    DeleteRoutine { id: String, confirmed: bool },
    AddComment { routine_id: String, text: String },
    RemoveComment { routine_id: String, comment_id: String },
    ClearAll { confirmed: bool },
    CompleteAll,
    Import { json: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Created { id: String },
    Updated { id: String },
    Toggled { id: String, concluded: bool },
    Deleted { id: String },
    CommentAdded { routine_id: String, comment_id: String },
    CommentRemoved { routine_id: String, comment_id: String },
    Cleared { removed: usize },
    CompletedAll { count: usize },
    Imported { routines: usize, activities: usize },
}

/// Owner of the record and its only writer.
///
/// Every mutation follows the same path: validate, change the in-memory
/// record, append its log line, save the whole record.
pub struct Tracker<S, C> {
    store: S,
    clock: C,
    record: Record,
}

impl<S: Store, C: Clock> Tracker<S, C> {
    pub fn new(mut store: S, clock: C) -> Self {
        let record = store.load();
        info!(
            "loaded {} routine(s), {} activity entries",
            record.routines.len(),
            record.activities.len()
        );
        Self {
            store,
            clock,
            record,
        }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn today(&self) -> u8 {
        self.clock.weekday_index()
    }

    pub fn routines(&self, q: &RoutineQuery) -> Vec<&Routine> {
        query::filter_routines(&self.record, q, self.today())
    }

    pub fn summary(&self) -> Summary {
        query::summarize(&self.record, self.today())
    }

    pub fn by_weekday(&self) -> Vec<DayCount> {
        query::by_weekday_report(&self.record)
    }

    pub fn recent(&self, limit: usize) -> Vec<&ActivityLogEntry> {
        query::recent_activities(&self.record, limit)
    }

    /// Pretty JSON in the persisted layout.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.record)
    }

    pub fn dispatch(&mut self, cmd: Command) -> Result<Outcome, CommandError> {
        let outcome = match cmd {
            Command::SaveRoutine(form) => self.save_routine(form)?,
            Command::ToggleComplete { id } => self.toggle_complete(&id)?,
            Command::DeleteRoutine { id, confirmed } => self.delete_routine(&id, confirmed)?,
            Command::AddComment { routine_id, text } => self.add_comment(&routine_id, &text)?,
            Command::RemoveComment {
                routine_id,
                comment_id,
            } => self.remove_comment(&routine_id, &comment_id)?,
            Command::ClearAll { confirmed } => self.clear_all(confirmed)?,
            Command::CompleteAll => self.complete_all(),
            Command::Import { json } => self.import(&json)?,
        };
        self.persist();
        Ok(outcome)
    }

    /// Insert the sample routine when there is nothing to show yet.
    pub fn seed_demo_if_empty(&mut self) -> bool {
        if !self.record.routines.is_empty() {
            return false;
        }
        let now = self.clock.epoch_millis();
        self.record.routines.push(Routine {
            id: new_id(),
            title: "Morning walk".to_string(),
            description: "20 minute walk".to_string(),
            time: Some("07:30".to_string()),
            repeat: RepeatKind::Daily,
            days: ["1", "2", "3", "4", "5"].iter().map(|d| d.to_string()).collect(),
            concluded: false,
            comments: vec![Comment {
                id: new_id(),
                text: "Started last week, going well".to_string(),
                time: now,
            }],
        });
        self.persist();
        true
    }

    pub(crate) fn append_activity(&mut self, text: String) {
        let now = self.clock.epoch_millis();
        self.record.log(now, text);
    }

    /// Write failures are logged; the in-memory change stands.
    pub(crate) fn persist(&mut self) {
        if let Err(err) = self.store.save(&self.record) {
            error!("save record failed: {err:#}");
        }
    }

    fn save_routine(&mut self, form: RoutineForm) -> Result<Outcome, CommandError> {
        let id = form
            .id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(new_id);
        let mut routine = form.build(id.clone())?;

        if let Some(existing) = self.record.find_mut(&id) {
            routine.concluded = existing.concluded;
            routine.comments = std::mem::take(&mut existing.comments);
            let text = format!("Edited routine: {}", routine.title);
            *existing = routine;
            self.append_activity(text);
            Ok(Outcome::Updated { id })
        } else {
            let text = format!("Created routine: {}", routine.title);
            self.record.routines.push(routine);
            self.append_activity(text);
            Ok(Outcome::Created { id })
        }
    }

    fn toggle_complete(&mut self, id: &str) -> Result<Outcome, CommandError> {
        let r = self
            .record
            .find_mut(id)
            .ok_or_else(|| CommandError::RoutineNotFound(id.to_string()))?;
        r.concluded = !r.concluded;
        let concluded = r.concluded;
        let text = if concluded {
            format!("Completed: {}", r.title)
        } else {
            format!("Reopened: {}", r.title)
        };
        self.append_activity(text);
        Ok(Outcome::Toggled {
            id: id.to_string(),
            concluded,
        })
    }

    fn delete_routine(&mut self, id: &str, confirmed: bool) -> Result<Outcome, CommandError> {
        let idx = self
            .record
            .routines
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| CommandError::RoutineNotFound(id.to_string()))?;
        if !confirmed {
            return Err(CommandError::ConfirmationRequired);
        }
        let removed = self.record.routines.remove(idx);
        self.append_activity(format!("Deleted routine: {}", removed.title));
        Ok(Outcome::Deleted { id: removed.id })
    }

    fn add_comment(&mut self, routine_id: &str, text: &str) -> Result<Outcome, CommandError> {
        let now = self.clock.epoch_millis();
        let r = self
            .record
            .find_mut(routine_id)
            .ok_or_else(|| CommandError::RoutineNotFound(routine_id.to_string()))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(CommandError::EmptyComment);
        }
        let comment_id = new_id();
        r.comments.push(Comment {
            id: comment_id.clone(),
            text: text.to_string(),
            time: now,
        });
        let line = format!("Commented on {}", r.title);
        self.append_activity(line);
        Ok(Outcome::CommentAdded {
            routine_id: routine_id.to_string(),
            comment_id,
        })
    }

    fn remove_comment(
        &mut self,
        routine_id: &str,
        comment_id: &str,
    ) -> Result<Outcome, CommandError> {
        let r = self
            .record
            .find_mut(routine_id)
            .ok_or_else(|| CommandError::RoutineNotFound(routine_id.to_string()))?;
        let before = r.comments.len();
        r.comments.retain(|c| c.id != comment_id);
        if r.comments.len() == before {
            return Err(CommandError::CommentNotFound(comment_id.to_string()));
        }
        let line = format!("Removed comment on {}", r.title);
        self.append_activity(line);
        Ok(Outcome::CommentRemoved {
            routine_id: routine_id.to_string(),
            comment_id: comment_id.to_string(),
        })
    }

    fn clear_all(&mut self, confirmed: bool) -> Result<Outcome, CommandError> {
        if !confirmed {
            return Err(CommandError::ConfirmationRequired);
        }
        let removed = self.record.routines.len();
        self.record.routines.clear();
        self.append_activity("Deleted all routines".to_string());
        Ok(Outcome::Cleared { removed })
    }

    fn complete_all(&mut self) -> Outcome {
        for r in &mut self.record.routines {
            r.concluded = true;
        }
        self.append_activity("Marked all routines as completed".to_string());
        Outcome::CompletedAll {
            count: self.record.routines.len(),
        }
    }

    fn import(&mut self, json: &str) -> Result<Outcome, CommandError> {
        let record = parse_import(json)?;
        info!(
            "import replaces record: {} routine(s), {} activity entries",
            record.routines.len(),
            record.activities.len()
        );
        self.record = record;
        Ok(Outcome::Imported {
            routines: self.record.routines.len(),
            activities: self.record.activities.len(),
        })
    }
}

/// Accept any JSON object with a non-null `routines` key that fits the
/// record shape.
pub fn parse_import(json: &str) -> Result<Record, CommandError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| CommandError::InvalidJson(e.to_string()))?;
    match value.get("routines") {
        None | Some(Value::Null) => return Err(CommandError::InvalidFile),
        Some(_) => {}
    }
    serde_json::from_value(value).map_err(|_| CommandError::InvalidFile)
}
