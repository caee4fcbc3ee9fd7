use thiserror::Error;

/// Per-file failure taxonomy of the repair loop.
///
/// None of these abort a run; the retry controller turns each one into a
/// logged status and keeps going.
#[derive(Error, Debug)]
pub enum RepairError {
    #[error("Target file not found")]
    TargetNotFound,

    #[error("No source mapping for {0}")]
    Unmapped(String),

    #[error("Stitched context too large (~{tokens} tokens, limit {limit})")]
    ContextTooLarge { tokens: usize, limit: usize },

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Oracle returned no usable code")]
    EmptyResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("API key not set (expected env var {0})")]
    MissingKey(String),

    #[error("Authentication rejected ({0})")]
    Auth(u16),

    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<ureq::Error> for OracleError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code @ (401 | 403), _) => OracleError::Auth(code),
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                let body: String = body.chars().take(500).collect();
                OracleError::Status { code, body }
            }
            ureq::Error::Transport(t) => OracleError::Transport(t.to_string()),
        }
    }
}
