//! Input validation collaborator for the task service.
//!
//! # Responsibility
//! - Reject unsafe or oversized titles/descriptions before a mutation is
//!   applied or queued for auto-save.
//!
//! # Invariants
//! - Validation is pure: no state, no side effects.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

static UNSAFE_MARKUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)<\s*/?\s*(script|iframe|object|embed|style|link|meta)\b",
        r"|javascript\s*:",
        // Inline event handlers such as `onerror=`, only inside a tag.
        r"|<[^>]*\bon[a-z]+\s*=",
    ))
    .expect("valid unsafe markup regex")
});
static CONTROL_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("valid control regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyTitle,
    TooLong { field: &'static str, max_chars: usize },
    UnsafeContent { field: &'static str },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "title is required"),
            Self::TooLong { field, max_chars } => {
                write!(f, "{field} must be at most {max_chars} characters")
            }
            Self::UnsafeContent { field } => write!(f, "{field} contains unsafe content"),
        }
    }
}

impl Error for ValidationError {}

pub trait TaskValidator: Send + Sync {
    fn validate_title(&self, title: &str) -> Result<(), ValidationError>;
    fn validate_description(&self, description: &str) -> Result<(), ValidationError>;
}

/// Length limits plus markup/script injection screening.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTaskValidator;

impl TaskValidator for DefaultTaskValidator {
    fn validate_title(&self, title: &str) -> Result<(), ValidationError> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        check_text("title", trimmed, MAX_TITLE_CHARS)
    }

    fn validate_description(&self, description: &str) -> Result<(), ValidationError> {
        check_text("description", description, MAX_DESCRIPTION_CHARS)
    }
}

fn check_text(field: &'static str, value: &str, max_chars: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max_chars {
        return Err(ValidationError::TooLong { field, max_chars });
    }
    if UNSAFE_MARKUP_RE.is_match(value) || CONTROL_CHARS_RE.is_match(value) {
        return Err(ValidationError::UnsafeContent { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{DefaultTaskValidator, TaskValidator, ValidationError, MAX_TITLE_CHARS};

    #[test]
    fn accepts_plain_titles() {
        let validator = DefaultTaskValidator;
        assert!(validator.validate_title("Buy milk & eggs <3").is_ok());
        assert!(validator.validate_description("call mom at 5pm").is_ok());
    }

    #[test]
    fn rejects_script_injection() {
        let validator = DefaultTaskValidator;
        for input in [
            "<script>alert(1)</script>",
            "click javascript:alert(1)",
            "<img src=x onerror=alert(1)>",
        ] {
            assert_eq!(
                validator.validate_title(input),
                Err(ValidationError::UnsafeContent { field: "title" }),
                "input should be rejected: {input}"
            );
        }
    }

    #[test]
    fn rejects_blank_and_oversized_titles() {
        let validator = DefaultTaskValidator;
        assert_eq!(validator.validate_title("  "), Err(ValidationError::EmptyTitle));
        let long = "x".repeat(MAX_TITLE_CHARS + 1);
        assert!(matches!(
            validator.validate_title(&long),
            Err(ValidationError::TooLong { field: "title", .. })
        ));
    }
}
