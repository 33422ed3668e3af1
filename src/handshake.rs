//! Validates an HTTP upgrade request and builds the `101 Switching
//! Protocols` response, per `spec.md` §4.B.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha1::{Digest, Sha1};

use crate::error::WebSocketError;
use crate::http::{Request, Response};

const MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Validates `request` against the five checks in `spec.md` §4.B, in order,
/// and returns the `101` response carrying `Sec-WebSocket-Accept` on
/// success.
///
/// The `Connection` header check is case-sensitive on input (it must be
/// exactly `Upgrade`), matching the stricter behavior of the source this
/// spec was distilled from rather than RFC 6455's case-insensitive token
/// comparison (`spec.md` §9 flags this as an open question resolved in
/// favor of the source).
pub fn accept(request: &Request) -> Result<Response, WebSocketError> {
  if request.method != "GET" {
    return Err(reject(format!(
      "expected method GET, got {}",
      request.method
    )));
  }

  expect_header(request, "Upgrade", "websocket")?;
  expect_header(request, "Connection", "Upgrade")?;

  let key = request
    .header("Sec-WebSocket-Key")
    .filter(|v| !v.is_empty())
    .ok_or_else(|| reject("missing Sec-WebSocket-Key header".to_string()))?;

  expect_header(request, "Sec-WebSocket-Version", "13")?;

  let mut response = Response::new(101);
  response.set_header("Upgrade", "websocket");
  response.set_header("Connection", "upgrade");
  response.set_header("Sec-WebSocket-Accept", &accept_value(key));
  Ok(response)
}

fn expect_header(
  request: &Request,
  name: &str,
  expected: &str,
) -> Result<(), WebSocketError> {
  match request.header(name) {
    Some(value) if value == expected => Ok(()),
    Some(value) => Err(reject(format!(
      "unexpected {name} value: got {value}, expected {expected}"
    ))),
    None => Err(reject(format!("missing {name} header"))),
  }
}

fn reject(message: String) -> WebSocketError {
  WebSocketError::HandshakeRejected(message)
}

/// `base64(SHA1(key ∥ "258EAFA5-E914-47DA-95CA-C5AB0DC85B11"))`.
fn accept_value(key: &str) -> String {
  let mut hasher = Sha1::new();
  hasher.update(key.as_bytes());
  hasher.update(MAGIC.as_bytes());
  let digest = hasher.finalize();
  STANDARD.encode(digest)
}
