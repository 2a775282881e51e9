/// Errors surfaced by a single export invocation.
///
/// None of these are retried; each one ends the invocation.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Credential file missing or unreadable. Raised before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The name search returned something other than exactly one file.
    #[error("files found invalid amount = {count} for name '{name}'")]
    AmbiguousLookup { name: String, count: usize },

    /// Authentication, search, metadata, or export call failed.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// Output path unwritable or the export stream could not be persisted.
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Observed match count for an ambiguous lookup.
    pub fn lookup_count(&self) -> Option<usize> {
        match self {
            FetchError::AmbiguousLookup { count, .. } => Some(*count),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
