use thiserror::Error;

/// Failures reported by the media transport engine.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to acquire media transport: {0}")]
    Acquisition(String),
    #[error("negotiation failed: {0}")]
    Negotiation(String),
    #[error("session description rejected: {0}")]
    DescriptionRejected(String),
    #[error("failed to add ICE candidate: {0}")]
    Candidate(String),
    #[error("failed to attach local track: {0}")]
    Track(String),
    #[error("failed to close media transport: {0}")]
    Closed(String),
}

/// Failures from the room service (create/join/upload calls).
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("room service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("room service returned {status} ({code}): {message}")]
    Rpc {
        status: u16,
        code: String,
        message: String,
    },
    #[error("invalid room service url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("failed to open signaling channel: {0}")]
    Connect(String),
}

/// Why an inbound signaling frame could not be turned into an event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown session description type {0}")]
    UnknownDescriptionType(i64),
    #[error("invalid sdpMLineIndex {0:?}")]
    InvalidMLineIndex(String),
    #[error("malformed signaling event: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by `Session::start`. Everything that happens after a
/// successful start is logged instead.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is already active")]
    AlreadyActive,
    #[error("session was stopped while starting")]
    Stopped,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Signaling(#[from] SignalingError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read ICE server list: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse ICE server list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid ICE server {id}: {reason}")]
    InvalidServer { id: String, reason: String },
}
