//! Error types for the wand connection layer.

/// Errors reported by a transport backend (adapter, link, characteristic operations).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] bluest::Error),

    #[error("no Bluetooth adapter found")]
    NoAdapter,

    #[error("device not found with ID: {0}")]
    DeviceNotFound(String),

    #[error("link is not connected")]
    NotConnected,

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced to callers of [`WandSession`](crate::WandSession).
#[derive(Debug, thiserror::Error)]
pub enum WandError {
    /// The transport gave up establishing a link (after its own retries).
    #[error("failed to connect to {name}: {source}")]
    TransportConnect {
        name: String,
        #[source]
        source: TransportError,
    },

    /// Required characteristics were still missing after one cache-clear and reconnect.
    #[error("failed to find supported characteristics, device may not be supported")]
    CharacteristicMissing,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no device connected")]
    NotConnected,

    #[error("command characteristic not available on this device")]
    CommandUnavailable,
}
