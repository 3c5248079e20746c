use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Tracker management errors
    #[error("Source returned no listings or is not a valid link: {0}")]
    InvalidSource(String),

    #[error("A tracker named '{0}' already exists")]
    DuplicateName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Job state errors
    #[error("Fetch job is already running for subscriber {0}")]
    AlreadyRunning(i64),

    #[error("Fetch job is not running for subscriber {0}")]
    NotRunning(i64),

    // Poll errors
    #[error("Fetching '{tracker}' failed: {reason}")]
    FetchFailure { tracker: String, reason: String },

    // Filter errors
    #[error("Invalid filter pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    // Network errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Channel errors from notebrook library
    #[error("Channel error: {0}")]
    Channel(String),
}

impl WatchError {
    pub fn fetch_failure(tracker: impl Into<String>, reason: impl ToString) -> Self {
        WatchError::FetchFailure {
            tracker: tracker.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<channels::ChannelError> for WatchError {
    fn from(err: channels::ChannelError) -> Self {
        WatchError::Channel(err.to_string())
    }
}

pub type WatchResult<T> = Result<T, WatchError>;
