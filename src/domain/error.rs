//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Status kinds returned by region, field and group operations.
///
/// `NotFound` and `AlreadyExists` are reported by membership edits that found
/// nothing to do; callers usually treat them as successful no-ops.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZincError {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("operation failed: {0}")]
    General(String),

    #[error("allocation failed: {0}")]
    Memory(String),

    #[error("object not found")]
    NotFound,

    #[error("object already exists")]
    AlreadyExists,

    #[error("configuration error: {message}")]
    Config { message: String },
}

pub type ZincResult<T> = Result<T, ZincError>;

impl ZincError {
    pub fn argument(message: impl Into<String>) -> Self {
        ZincError::Argument(message.into())
    }

    pub fn general(message: impl Into<String>) -> Self {
        ZincError::General(message.into())
    }

    /// True for the set-membership outcomes that leave state unchanged.
    pub fn is_idempotent_no_op(&self) -> bool {
        matches!(self, ZincError::NotFound | ZincError::AlreadyExists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_membership_outcomes_when_checked_then_only_those_are_no_ops() {
        assert!(ZincError::NotFound.is_idempotent_no_op());
        assert!(ZincError::AlreadyExists.is_idempotent_no_op());
        assert!(!ZincError::argument("wrong mesh").is_idempotent_no_op());
        assert!(!ZincError::general("face cascade").is_idempotent_no_op());
    }

    #[test]
    fn given_argument_error_when_displayed_then_includes_message() {
        let err = ZincError::argument("node is from another region");
        assert_eq!(
            err.to_string(),
            "invalid argument: node is from another region"
        );
    }
}
