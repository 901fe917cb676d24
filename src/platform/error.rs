use thiserror::Error;

/// Error codes the remote API returns when an account has been removed or
/// disabled. A probe failing with either one means the credential can never
/// recover and the entity must be evicted.
const ACCOUNT_GONE_CODES: [&str; 2] = ["OAU-232", "CMN-405"];

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("api error {status} ({code:?}): {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    pub fn error_code(&self) -> Option<&str> {
        match self {
            ApiError::Status { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// True when the remote API signalled that the account no longer exists.
    pub fn is_account_gone(&self) -> bool {
        self.error_code()
            .map(|c| ACCOUNT_GONE_CODES.contains(&c))
            .unwrap_or(false)
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
