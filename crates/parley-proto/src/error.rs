//! Protocol error type.

/// Errors from envelope encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Inbound text was not a well-formed event envelope.
    ///
    /// Covers syntactically invalid JSON, unknown event names, and payloads
    /// whose shape does not match the event. The sender gets no reply for
    /// these; the transport drops the frame.
    #[error("malformed event envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}
