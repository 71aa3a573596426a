//! Shared primitives used across Hoard crates.

pub mod logging;

use core::fmt;

/// Result alias used across the workspace.
pub type HoardResult<T> = Result<T, HoardError>;

/// Workspace-wide error carrying a stable dotted code and a human message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoardError {
    pub code: &'static str,
    pub message: String,
}

impl HoardError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns true when the code belongs to the given dotted component (`net`, `archive.protocol`).
    pub fn is_in(&self, component: &str) -> bool {
        self.code == component
            || self
                .code
                .strip_prefix(component)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl fmt::Display for HoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for HoardError {}
