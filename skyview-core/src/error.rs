use thiserror::Error;

/// Rejections raised locally before any request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a search term")]
    Empty,
    #[error("Search contains invalid characters")]
    InvalidCharacters,
}

/// Failure talking to one of the upstream endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Upstream responded with status {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Malformed upstream payload: {0}")]
    Decode(String),
}

/// Geocoding shares the upstream failure taxonomy.
pub type ResolutionError = FetchError;

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::Upstream { status: 429, .. })
    }

    /// Whether re-submitting the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Upstream { status, .. } => *status == 429 || *status >= 500,
            FetchError::BadRequest(_) | FetchError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Network(format!("request timed out: {err}"))
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Which step of the pipeline produced a fatal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Geocoding,
    Weather,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Geocoding => f.write_str("geocoding"),
            Stage::Weather => f.write_str("weather"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("No location data found for '{0}'")]
    NotFound(String),
    /// Soft failure: recorded on the view, never returned from `aggregate`.
    #[error("Air quality unavailable: {0}")]
    Partial(FetchError),
    #[error("Failed to fetch {stage} data: {source}")]
    Fatal {
        stage: Stage,
        #[source]
        source: FetchError,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode or decode stored value '{key}': {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything a search can end in, as seen by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

impl SearchError {
    /// Malformed input needs editing; everything else can be re-submitted.
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::Validation(_) => false,
            SearchError::Resolution(err) => err.is_retryable(),
        }
    }

    pub fn recovery_hint(&self) -> &'static str {
        match self {
            SearchError::Validation(ValidationError::Empty) => "Enter a city name to search",
            SearchError::Validation(ValidationError::InvalidCharacters) => {
                "Use only letters and spaces"
            }
            SearchError::Resolution(err) if err.is_rate_limited() => {
                "Wait a few seconds before searching again"
            }
            SearchError::Resolution(FetchError::Network(_)) => {
                "Check your internet connection and try again"
            }
            SearchError::Resolution(FetchError::Upstream { .. }) => {
                "The weather service is experiencing issues. Try again later"
            }
            SearchError::Resolution(_) => "Try a different search",
        }
    }
}
