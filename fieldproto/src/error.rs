use thiserror::Error;

/// Error kinds the per-connection state machine needs to distinguish: a
/// transient I/O failure should trigger a silent reconnect, while a protocol
/// violation should send `PROTOCOL_ERROR` and terminate the connection with
/// no retry (spec.md §7).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for peer")]
    Timeout,

    #[error("declared id was empty or whitespace-only")]
    EmptyId,

    #[error("declared id exceeded 1024 bytes")]
    OversizedId,

    #[error("length prefix was not 8 ASCII decimal digits: {0:?}")]
    BadLength(Vec<u8>),

    #[error("expected literal {expected:?}, got {got:?}")]
    UnexpectedLiteral {
        expected: &'static str,
        got: Vec<u8>,
    },

    #[error("peer closed the connection")]
    Closed,
}

impl ProtocolError {
    /// True for errors that warrant a one-shot `PROTOCOL_ERROR` reply before
    /// closing, as opposed to a silent disconnect-and-retry.
    pub fn is_fatal_violation(&self) -> bool {
        matches!(self, ProtocolError::BadLength(_))
    }
}
