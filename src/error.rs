use thiserror::Error;

/// Failures along the bill-processing pipeline.
///
/// Every variant ends up as a log line plus the generic "try a clearer photo"
/// reply to the sender; the webhook itself still acknowledges with 200 so Meta
/// does not redeliver.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("graph api returned {status}: {body}")]
    Graph {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("gemini returned {status}: {body}")]
    Gemini {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("missing {0} in response")]
    MissingField(&'static str),

    #[error("model output was not valid bill json: {0}")]
    BadExtraction(#[from] serde_json::Error),
}
