use std::io;

/// Errors raised by the WebSocket frame codec and connection state machine.
///
/// Decoder and protocol errors recover locally by transitioning the
/// connection towards `Closed`; `WriteFailed` skips straight there.
#[derive(thiserror::Error, Debug)]
pub enum WebSocketError {
  #[error("incomplete frame: {0}")]
  IncompleteFrame(io::Error),

  #[error("malformed frame: {0}")]
  MalformedFrame(String),

  #[error("protocol violation: {0}")]
  ProtocolViolation(String),

  #[error("write failed: {0}")]
  WriteFailed(io::Error),

  #[error("handshake rejected: {0}")]
  HandshakeRejected(String),

  #[error("connection is not open")]
  ConnectionClosed,
}
