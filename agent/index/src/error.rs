#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: reqwest::Method,
        path: String,
        status: u16,
        body: String,
    },

    #[error("failed to encode document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL {0:?}")]
    InvalidUrl(String),

    #[error("{0}")]
    Unavailable(String),
}
