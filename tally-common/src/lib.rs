//! Shared types for the Tally workspace.
//!
//! Kept small on purpose so every crate can depend on it: the
//! [`observability`] initialiser and the application-level [`TallyError`].
//!
//! ```rust
//! use tally_common::TallyError;
//!
//! let err = TallyError::Config("batch_size must be within 1..=100".into());
//! assert_eq!(
//!     err.to_string(),
//!     "Configuration error: batch_size must be within 1..=100"
//! );
//! ```

pub mod observability;

/// Error types surfaced by the Tally binary and its supporting crates.
#[derive(thiserror::Error, Debug)]
pub enum TallyError {
    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An input document (roster, check-in log, user list) could not be used.
    #[error("Input error: {0}")]
    Input(String),

    /// The user aborted the interactive authorization.
    #[error("Authorization aborted: {0}")]
    Aborted(String),
}

/// Convenient alias for results that use [`TallyError`].
pub type Result<T> = std::result::Result<T, TallyError>;
