use thiserror::Error;

/// Rejection of a command before it touches the record.
///
/// Every variant carries a stable snake_case code that the HTTP layer sends
/// back as `error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("title is required")]
    EmptyTitle,

    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("invalid weekday '{0}', expected 0-6")]
    InvalidDay(String),

    #[error("comment text is required")]
    EmptyComment,

    #[error("routine {0} not found")]
    RoutineNotFound(String),

    #[error("comment {0} not found")]
    CommentNotFound(String),

    #[error("destructive action needs confirmation")]
    ConfirmationRequired,

    #[error("import is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("import file has no routines")]
    InvalidFile,
}

impl CommandError {
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::EmptyTitle => "empty_title",
            CommandError::InvalidTime(_) => "invalid_time",
            CommandError::InvalidDay(_) => "invalid_day",
            CommandError::EmptyComment => "empty_comment",
            CommandError::RoutineNotFound(_) => "routine_not_found",
            CommandError::CommentNotFound(_) => "comment_not_found",
            CommandError::ConfirmationRequired => "confirmation_required",
            CommandError::InvalidJson(_) => "invalid_json",
            CommandError::InvalidFile => "invalid_file",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CommandError::RoutineNotFound(_) | CommandError::CommentNotFound(_)
        )
    }
}
