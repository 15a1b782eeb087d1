//! Per-call results carrying a human-readable diagnostic

/// The value produced by a vault operation together with the status
/// message describing what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: T,
    pub message: Option<String>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, message: impl Into<String>) -> Self {
        Self {
            value,
            message: Some(message.into()),
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}
