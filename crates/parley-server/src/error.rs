//! Server error types.

/// Errors from the production runtime.
///
/// None of these are fatal per connection event; the accept and read loops
/// log them and carry on. Only bind failures abort startup.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Socket-level I/O failure (bind, accept, read, write).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket handshake or framing failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The engine reported a programming-error condition.
    ///
    /// Logged and ignored; the worst outcome of any single event is a
    /// no-op.
    #[error("engine error: {0}")]
    Engine(#[from] parley_core::ChatError),
}
