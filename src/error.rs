//! Named failure kinds that callers and tests match on.
//!
//! Everything else flows through `anyhow`.

use thiserror::Error;

/// A `--source` or `--category` selection that is not configured.
///
/// Raised before any network or model call is made.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("unknown source '{name}' (configured: {})", available.join(", "))]
    UnknownSource { name: String, available: Vec<String> },
    #[error("unknown category '{name}' for source '{source_name}' (configured: {})", available.join(", "))]
    UnknownCategory {
        source_name: String,
        name: String,
        available: Vec<String>,
    },
}

/// Failure to interpret a rendered listing page.
///
/// Terminates pagination for the current category only.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("result count is not a number: '{0}'")]
    ResultCount(String),
}
