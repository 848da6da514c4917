use thiserror::Error;

/// Errors that can occur while decoding a control-plane message
#[derive(Debug, Error)]
pub enum MessageParseError {
    /// Payload was not valid JSON, or the `t` tag / required fields
    /// were missing. Carries the serde detail for the log line.
    #[error("Malformed control message: {0}")]
    Malformed(#[from] serde_json::Error),
}
