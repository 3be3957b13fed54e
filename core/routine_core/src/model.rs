use serde::{Deserialize, Serialize};

use crate::error::CommandError;

/// Sunday-first short names, indexed by weekday index.
pub const WEEKDAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Recurrence mode of a routine.
///
/// Values this build doesn't know (hand-edited storage, imports from other
/// versions) are kept verbatim, surrounding whitespace included, so an export
/// gives them back unchanged; they behave like `none`. Blank means `none`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum RepeatKind {
    #[default]
    None,
    Daily,
    Weekly,
    Other(String),
}

impl RepeatKind {
    pub fn as_str(&self) -> &str {
        match self {
            RepeatKind::None => "none",
            RepeatKind::Daily => "daily",
            RepeatKind::Weekly => "weekly",
            RepeatKind::Other(s) => s.as_str(),
        }
    }

    pub fn is_daily(&self) -> bool {
        matches!(self, RepeatKind::Daily)
    }
}

impl From<Option<String>> for RepeatKind {
    fn from(v: Option<String>) -> Self {
        let Some(raw) = v else {
            return RepeatKind::None;
        };
        match raw.trim() {
            "" | "none" => RepeatKind::None,
            "daily" => RepeatKind::Daily,
            "weekly" => RepeatKind::Weekly,
            _ => RepeatKind::Other(raw),
        }
    }
}

impl From<RepeatKind> for String {
    fn from(v: RepeatKind) -> Self {
        v.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub text: String,
    /// Epoch milliseconds.
    pub time: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routine {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// "HH:MM", or absent when the routine has no fixed schedule.
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub repeat: RepeatKind,
    /// Weekday indices as digit strings, "0" = Sunday.
    #[serde(default)]
    pub days: Vec<String>,
    #[serde(default)]
    pub concluded: bool,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Routine {
    /// Scheduled time, treating an empty string like an absent one.
    pub fn scheduled_time(&self) -> Option<&str> {
        self.time.as_deref().filter(|t| !t.is_empty())
    }

    /// Whether `days` lists the given weekday. Entries outside "0".."6"
    /// never match.
    pub fn has_weekday(&self, weekday: u8) -> bool {
        let digit = weekday_digit(weekday);
        self.days.iter().any(|d| *d == digit)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    /// Epoch milliseconds.
    pub time: i64,
    pub text: String,
}

/// The whole persisted state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub routines: Vec<Routine>,
    #[serde(default)]
    pub activities: Vec<ActivityLogEntry>,
}

impl Record {
    pub fn find(&self, id: &str) -> Option<&Routine> {
        self.routines.iter().find(|r| r.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Routine> {
        self.routines.iter_mut().find(|r| r.id == id)
    }

    pub fn log(&mut self, time: i64, text: impl Into<String>) {
        self.activities.push(ActivityLogEntry {
            time,
            text: text.into(),
        });
    }
}

/// Raw create/edit input, as submitted by a client.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RoutineForm {
    /// Present when editing. An id that matches nothing creates a routine
    /// with that id.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub repeat: RepeatKind,
    #[serde(default)]
    pub days: Vec<String>,
}

impl RoutineForm {
    /// Validate and normalize the form into a fresh (not concluded, no
    /// comments) routine with the given id.
    pub fn build(&self, id: String) -> Result<Routine, CommandError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(CommandError::EmptyTitle);
        }

        let time = match self.time.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(t) => {
                if !is_valid_hhmm(t) {
                    return Err(CommandError::InvalidTime(t.to_string()));
                }
                Some(t.to_string())
            }
        };

        let mut days: Vec<String> = Vec::with_capacity(self.days.len());
        for d in &self.days {
            let d = d.trim();
            if parse_weekday_digit(d).is_none() {
                return Err(CommandError::InvalidDay(d.to_string()));
            }
            if !days.iter().any(|x| x == d) {
                days.push(d.to_string());
            }
        }

        Ok(Routine {
            id,
            title: title.to_string(),
            description: self.description.trim().to_string(),
            time,
            repeat: self.repeat.clone(),
            days,
            concluded: false,
            comments: Vec::new(),
        })
    }
}

pub fn weekday_digit(weekday: u8) -> String {
    weekday.to_string()
}

/// "0".."6" to the weekday index; anything else is `None`.
pub fn parse_weekday_digit(s: &str) -> Option<u8> {
    match s.as_bytes() {
        [b @ b'0'..=b'6'] => Some(b - b'0'),
        _ => None,
    }
}

/// Strict 24h "HH:MM".
pub fn is_valid_hhmm(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() != 5 || b[2] != b':' {
        return false;
    }
    if !b[..2].iter().chain(&b[3..]).all(u8::is_ascii_digit) {
        return false;
    }
    let h = (b[0] - b'0') * 10 + (b[1] - b'0');
    let m = (b[3] - b'0') * 10 + (b[4] - b'0');
    h < 24 && m < 60
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(title: &str) -> RoutineForm {
        RoutineForm {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn build_rejects_blank_title() {
        assert_eq!(form("   ").build("a".into()), Err(CommandError::EmptyTitle));
    }

    #[test]
    fn build_normalizes_fields() {
        let f = RoutineForm {
            title: "  Walk ".to_string(),
            description: " 20 min ".to_string(),
            time: Some("".to_string()),
            repeat: RepeatKind::Daily,
            days: vec!["1".into(), "3".into(), "1".into()],
            ..Default::default()
        };
        let r = f.build("id1".into()).unwrap();
        assert_eq!(r.title, "Walk");
        assert_eq!(r.description, "20 min");
        assert_eq!(r.time, None);
        assert_eq!(r.days, vec!["1".to_string(), "3".to_string()]);
        assert!(!r.concluded);
        assert!(r.comments.is_empty());
    }

    #[test]
    fn build_rejects_bad_time_and_day() {
        let mut f = form("x");
        f.time = Some("7:30".into());
        assert!(matches!(f.build("a".into()), Err(CommandError::InvalidTime(_))));
        f.time = Some("24:00".into());
        assert!(matches!(f.build("a".into()), Err(CommandError::InvalidTime(_))));
        f.time = Some("23:59".into());
        f.days = vec!["7".into()];
        assert!(matches!(f.build("a".into()), Err(CommandError::InvalidDay(_))));
    }

    #[test]
    fn repeat_kind_keeps_unknown_values() {
        let r: Routine = serde_json::from_str(
            r#"{"id":"a","title":"t","repeat":"monthly","days":["9"]}"#,
        )
        .unwrap();
        assert_eq!(r.repeat, RepeatKind::Other("monthly".into()));
        assert!(!r.repeat.is_daily());
        assert!(!r.has_weekday(9));
        let back = serde_json::to_value(&r).unwrap();
        assert_eq!(back["repeat"], "monthly");
    }

    #[test]
    fn repeat_kind_unknown_value_round_trips_untrimmed() {
        let r: Routine =
            serde_json::from_str(r#"{"id":"a","title":"t","repeat":" monthly"}"#).unwrap();
        assert_eq!(r.repeat, RepeatKind::Other(" monthly".into()));
        assert_eq!(serde_json::to_value(&r).unwrap()["repeat"], " monthly");

        let r: Routine =
            serde_json::from_str(r#"{"id":"a","title":"t","repeat":" daily "}"#).unwrap();
        assert!(r.repeat.is_daily());
    }

    #[test]
    fn routine_defaults_missing_fields() {
        let r: Routine = serde_json::from_str(r#"{"id":"a","title":"t","repeat":null}"#).unwrap();
        assert_eq!(r.description, "");
        assert_eq!(r.time, None);
        assert_eq!(r.repeat, RepeatKind::None);
        assert!(r.days.is_empty());
        assert!(!r.concluded);
    }

    #[test]
    fn empty_time_string_is_unscheduled() {
        let mut r = form("t").build("a".into()).unwrap();
        r.time = Some(String::new());
        assert_eq!(r.scheduled_time(), None);
    }
}
