use std::fmt;

use editai_contracts::session::BUSY_MESSAGE;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitErrorKind {
    Validation,
    Transport,
    EmptyResult,
}

impl SubmitErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitErrorKind::Validation => "validation",
            SubmitErrorKind::Transport => "transport",
            SubmitErrorKind::EmptyResult => "empty_result",
        }
    }
}

/// User-facing failure of a submission. The message is what the front end
/// shows inline; none of these end the session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubmitError {
    Validation(String),
    Busy,
    Transport(String),
    Http { status: u16, message: String },
    EmptyResult(String),
}

impl SubmitError {
    pub fn kind(&self) -> SubmitErrorKind {
        match self {
            SubmitError::Validation(_) | SubmitError::Busy => SubmitErrorKind::Validation,
            SubmitError::Transport(_) | SubmitError::Http { .. } => SubmitErrorKind::Transport,
            SubmitError::EmptyResult(_) => SubmitErrorKind::EmptyResult,
        }
    }

    /// True when the request never left the process.
    pub fn is_local(&self) -> bool {
        self.kind() == SubmitErrorKind::Validation
    }

    pub fn message(&self) -> &str {
        match self {
            SubmitError::Validation(message)
            | SubmitError::Transport(message)
            | SubmitError::EmptyResult(message)
            | SubmitError::Http { message, .. } => message,
            SubmitError::Busy => BUSY_MESSAGE,
        }
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Http { status, message } => write!(f, "{message} (HTTP {status})"),
            other => f.write_str(other.message()),
        }
    }
}

impl std::error::Error for SubmitError {}

#[cfg(test)]
mod tests {
    use super::{SubmitError, SubmitErrorKind};

    #[test]
    fn taxonomy_groups_variants() {
        assert!(SubmitError::Validation("Please enter a prompt.".to_string()).is_local());
        assert!(SubmitError::Busy.is_local());
        assert_eq!(
            SubmitError::Http {
                status: 400,
                message: "bad size".to_string()
            }
            .kind(),
            SubmitErrorKind::Transport
        );
        assert_eq!(
            SubmitError::EmptyResult("No image returned.".to_string()).kind(),
            SubmitErrorKind::EmptyResult
        );
    }

    #[test]
    fn display_uses_inline_message() {
        let err = SubmitError::Http {
            status: 401,
            message: "Incorrect API key provided".to_string(),
        };
        assert_eq!(err.to_string(), "Incorrect API key provided (HTTP 401)");
        assert_eq!(err.message(), "Incorrect API key provided");
        assert_eq!(
            SubmitError::Busy.to_string(),
            "A request is already in progress."
        );
    }
}
