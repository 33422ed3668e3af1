//! The TCP accept loop (`spec.md` §4.G / `SPEC_FULL.md` §4.G). Grounded on
//! `gosocks/server/server.go`'s `Listen`, which also spawns one goroutine
//! per accepted connection and dispatches through the same router used for
//! plain HTTP.

use std::io::BufReader;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::thread;

use crate::error::WebSocketError;
use crate::http::{HttpError, Request, Response};
use crate::router::Router;

/// Owns the listening socket and the router handlers dispatch through.
/// `serve_forever` blocks the calling thread, spawning one worker thread
/// per accepted connection (`spec.md` §5) so a slow or long-lived
/// WebSocket connection never blocks new connections from being accepted.
pub struct Server {
  listener: TcpListener,
  router: Router,
}

impl Server {
  pub fn bind(addr: impl ToSocketAddrs, router: Router) -> std::io::Result<Self> {
    let listener = TcpListener::bind(addr)?;
    Ok(Server { listener, router })
  }

  pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
    self.listener.local_addr()
  }

  /// Accepts connections until the listener errors, dispatching each to a
  /// fresh worker thread. Never returns on success; accept errors are
  /// logged and do not stop the loop, mirroring the source's behavior of
  /// tolerating individual failed accepts.
  pub fn serve_forever(self) {
    let router = std::sync::Arc::new(self.router);
    for incoming in self.listener.incoming() {
      match incoming {
        Ok(stream) => {
          let router = router.clone();
          thread::spawn(move || handle_connection(stream, &router));
        }
        Err(err) => log::warn!("failed to accept connection: {err}"),
      }
    }
  }
}

fn handle_connection(stream: TcpStream, router: &Router) {
  let mut reader = BufReader::new(match stream.try_clone() {
    Ok(s) => s,
    Err(err) => {
      log::warn!("failed to clone socket for reading: {err}");
      return;
    }
  });

  let request = match Request::parse(&mut reader) {
    Ok(request) => request,
    Err(err) => {
      respond_error(stream, &err);
      return;
    }
  };

  if is_websocket_upgrade(&request) {
    handle_websocket_request(stream, reader, request, router);
  } else {
    handle_http_request(stream, &request, router);
  }
}

fn is_websocket_upgrade(request: &Request) -> bool {
  request
    .header("Upgrade")
    .map(|v| v.eq_ignore_ascii_case("websocket"))
    .unwrap_or(false)
}

fn handle_websocket_request(
  mut stream: TcpStream,
  reader: BufReader<TcpStream>,
  request: Request,
  router: &Router,
) {
  let handler = match router.route_websocket(&request.path) {
    Ok(handler) => handler,
    Err(err) => {
      respond_error(stream, &err);
      return;
    }
  };

  let response = match crate::handshake::accept(&request) {
    Ok(response) => response,
    Err(err) => {
      respond_error(stream, &websocket_error_to_http(err));
      return;
    }
  };

  let peer_addr = match stream.peer_addr() {
    Ok(addr) => addr,
    Err(err) => {
      log::warn!("failed to read peer address: {err}");
      return;
    }
  };

  if let Err(err) = response.write(&mut stream) {
    log::warn!("failed to write handshake response: {err}");
    return;
  }

  handler(stream, reader, peer_addr);
}

fn handle_http_request(stream: TcpStream, request: &Request, router: &Router) {
  let response = match router.route_http(request) {
    Ok(handler) => handler(request),
    Err(err) => http_error_response(&err),
  };
  write_response(stream, &response);
}

fn websocket_error_to_http(err: WebSocketError) -> HttpError {
  HttpError::bad_request(err.to_string())
}

fn respond_error(stream: TcpStream, err: &HttpError) {
  write_response(stream, &http_error_response(err));
}

fn http_error_response(err: &HttpError) -> Response {
  Response::with_body(err.status, err.message.as_bytes().to_vec())
}

fn write_response(mut stream: TcpStream, response: &Response) {
  if let Err(err) = response.write(&mut stream) {
    log::warn!("failed to write response: {err}");
  }
}
