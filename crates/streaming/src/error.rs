use thiserror::Error;

/// Failures surfaced by the channel layer.
///
/// None of these are fatal to the process and none are retried here;
/// retry policy belongs to whoever drives the gateway.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("join failed: {0}")]
    JoinFailed(String),

    #[error("join timed out")]
    JoinTimedOut,

    #[error("push abandoned before it was acknowledged")]
    PublishAbandoned,

    #[error("transport closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),
}
