use std::fmt;

/// Failure of a single provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    MissingCredential(&'static str),
    Timeout,
    Provider { status: u16, body: String },
    Transport(String),
    EmptyResponse,
}

impl GenerationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredential(_) => "configuration",
            Self::Timeout => "timeout",
            Self::Provider { .. } => "provider",
            Self::Transport(_) => "transport",
            Self::EmptyResponse => "empty_response",
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        Self::Transport(err.to_string())
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential(key) => write!(f, "{key} not set"),
            Self::Timeout => write!(f, "provider call exceeded the client deadline"),
            Self::Provider { status, body } => write!(f, "provider returned {status}: {body}"),
            Self::Transport(message) => write!(f, "provider transport failed: {message}"),
            Self::EmptyResponse => write!(f, "provider response contained no text"),
        }
    }
}

impl std::error::Error for GenerationError {}

/// Caller-facing failure of a coaching operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoachError {
    Validation(String),
    Configuration(String),
    Timeout,
    Provider { status: u16, body: String },
    MalformedAnalysis(String),
    Persistence(String),
}

impl CoachError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Configuration(_) => "configuration",
            Self::Timeout => "timeout",
            Self::Provider { .. } => "provider",
            Self::MalformedAnalysis(_) => "malformed_analysis",
            Self::Persistence(_) => "persistence",
        }
    }

    /// HTTP-style status a routing layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Configuration(_) => 500,
            Self::Timeout => 504,
            Self::Provider { .. } => 503,
            Self::MalformedAnalysis(_) => 502,
            Self::Persistence(_) => 500,
        }
    }

    /// Message safe to show a caller. Provider bodies never leave the server.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Configuration(_) => "Service is not configured.".to_string(),
            Self::Timeout | Self::Provider { .. } => {
                "Service temporarily unavailable. Please try again.".to_string()
            }
            Self::MalformedAnalysis(_) => {
                "Could not read the analysis for this photo. Please try again.".to_string()
            }
            Self::Persistence(_) => "Could not save the result.".to_string(),
        }
    }

    pub fn missing_fields(fields: &[&str]) -> Self {
        Self::Validation(format!("Missing required fields: {}", fields.join(", ")))
    }
}

impl From<GenerationError> for CoachError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::MissingCredential(key) => Self::Configuration(format!("{key} not set")),
            GenerationError::Timeout => Self::Timeout,
            GenerationError::Provider { status, body } => Self::Provider { status, body },
            GenerationError::Transport(message) => Self::Provider {
                status: 0,
                body: message,
            },
            GenerationError::EmptyResponse => Self::Provider {
                status: 200,
                body: "empty response".to_string(),
            },
        }
    }
}

impl fmt::Display for CoachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "invalid request: {message}"),
            Self::Configuration(message) => write!(f, "configuration error: {message}"),
            Self::Timeout => write!(f, "generation timed out"),
            Self::Provider { status, body } => write!(f, "provider error ({status}): {body}"),
            Self::MalformedAnalysis(message) => write!(f, "malformed analysis: {message}"),
            Self::Persistence(message) => write!(f, "persistence failed: {message}"),
        }
    }
}

impl std::error::Error for CoachError {}
