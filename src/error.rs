use thiserror::Error;

// Durable key-value store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store contents corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// REST client failures. RateLimited is kept apart from every other status
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Rate limited by server")]
    RateLimited,

    #[error("Not authorized")]
    Unauthorized,

    #[error("Server returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited)
    }
}

// Credential decode / lifecycle failures
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Malformed token")]
    MalformedToken,

    #[error("Token payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Token claims could not be parsed: {0}")]
    Claims(#[from] serde_json::Error),

    #[error("Token expired")]
    Expired,

    #[error("No refresh token stored")]
    NoRefreshToken,

    #[error("Failed to get user data")]
    UserLookup,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// Rating submission failures
#[derive(Error, Debug)]
pub enum RatingError {
    #[error("Log in to rate this recipe's difficulty")]
    NotAuthenticated,

    #[error("Rating must be between 1 and 5")]
    OutOfRange(u8),

    #[error("You've reached the rate limit. Please try again later.")]
    RateLimited,

    #[error("Failed to submit rating: {0}")]
    Api(ApiError),
}

impl From<ApiError> for RatingError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::RateLimited => RatingError::RateLimited,
            other => RatingError::Api(other),
        }
    }
}
