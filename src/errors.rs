//! Error types for the intercom panel.
//!
//! Each seam of the panel has its own error enum so callers can match on
//! the failure class that matters to them: directory lookups distinguish
//! not-found from malformed identities, transport errors distinguish
//! subscribe from publish failures, and command preconditions surface as
//! [`StateError`] without any broadcast being sent. [`PanelError`] is the
//! umbrella returned by the panel lifecycle.

use thiserror::Error;

// ---------------------------------------------------------------------------
// DirectoryError
// ---------------------------------------------------------------------------

/// Errors from the directory/config lookup service.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No intercom with the given session name exists.
    #[error("Intercom not found: {name}")]
    IntercomNotFound { name: String },

    /// The participant identity is not registered.
    #[error("Companion ID not found: {identity}")]
    IdentityNotFound { identity: String },

    /// The participant identity is not even well-formed.
    #[error("Invalid user ID: {identity}")]
    MalformedIdentity { identity: String },

    /// The lookup request itself failed (network, decode, server error).
    #[error("Directory request error: {message}")]
    Request { message: String },
}

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Errors from the broadcast pub/sub transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Subscribing to the topic failed.
    #[error("Subscribe failed: {message}")]
    Subscribe { message: String },

    /// Publishing a broadcast failed. The local store must not be mutated
    /// when this is returned.
    #[error("Publish failed: {message}")]
    Publish { message: String },

    /// The underlying channel has been torn down.
    #[error("Broadcast channel closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// ProtocolError
// ---------------------------------------------------------------------------

/// Errors decoding an inbound broadcast payload.
///
/// These are logged and dropped at the engine boundary; they are never
/// fatal to the panel.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload carried an event kind this panel does not know.
    #[error("Unknown event kind: {kind}")]
    UnknownEvent { kind: String },

    /// The payload named a known event kind but did not match its shape.
    #[error("Malformed payload: {message}")]
    Malformed { message: String },
}

// ---------------------------------------------------------------------------
// StateError
// ---------------------------------------------------------------------------

/// Local command rejections. No broadcast is sent and no state is mutated
/// when one of these is returned.
#[derive(Debug, Error)]
pub enum StateError {
    /// A command was issued before the sync handshake completed.
    #[error("Command rejected: sync with the group has not completed")]
    NotSynced,

    /// A command named a channel index outside the active channel list.
    #[error("Command rejected: channel {channel_id} out of range (have {channel_count})")]
    InvalidChannel {
        channel_id: usize,
        channel_count: usize,
    },

    /// The active role has no channel row in the configured matrix.
    #[error("Command rejected: role {role_id} has no channel matrix row")]
    RoleNotConfigured { role_id: usize },
}

// ---------------------------------------------------------------------------
// PanelError
// ---------------------------------------------------------------------------

/// Umbrella error for the panel lifecycle and command surface.
#[derive(Debug, Error)]
pub enum PanelError {
    /// Fatal configuration problem; the panel holds a bad-config status
    /// with the same human-readable reason and does not retry.
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    State(#[from] StateError),
}
