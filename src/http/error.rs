use std::fmt;

/// An HTTP-level error: a status code plus a message, matching the shape
/// of `gosocks/http/errors.go`'s `HttpError` rather than the richer
/// `WebSocketError` enum (`SPEC_FULL.md` §7 — the two collaborators have
/// independent error vocabularies).
#[derive(Debug, Clone)]
pub struct HttpError {
  pub status: u16,
  pub message: String,
}

impl HttpError {
  pub fn bad_request(message: impl Into<String>) -> Self {
    HttpError {
      status: 400,
      message: message.into(),
    }
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    HttpError {
      status: 404,
      message: message.into(),
    }
  }

  pub fn internal_server_error(message: impl Into<String>) -> Self {
    HttpError {
      status: 500,
      message: message.into(),
    }
  }
}

impl fmt::Display for HttpError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.status, self.message)
  }
}

impl std::error::Error for HttpError {}
