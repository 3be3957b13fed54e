//! Routine tracking core: the persisted record, the pure views computed over
//! it, the time-of-day poll, and the single-writer state container that
//! applies typed commands.

pub mod clock;
pub mod error;
pub mod model;
pub mod query;
pub mod scheduler;
pub mod store;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CommandError;
pub use model::{ActivityLogEntry, Comment, Record, RepeatKind, Routine, RoutineForm};
pub use query::{FilterKind, RoutineQuery, SortKind, Summary};
pub use scheduler::{Notification, SchedulerPoll};
pub use store::{MemoryStore, Settings, SqliteStore, Store};
pub use tracker::{Command, Outcome, Tracker};
