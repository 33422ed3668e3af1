//! A path-trie router dispatching to either an HTTP handler or a WebSocket
//! handler (the "router collaborator" of `spec.md` §6, made concrete per
//! `SPEC_FULL.md` §4.F). Grounded on `gosocks/server/routing.go`'s
//! `recursiveRouter`, which keeps one trie per handler kind.

use std::collections::HashMap;
use std::io::BufReader;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use crate::http::{HttpError, Request, Response};

pub type HttpHandler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Takes ownership of the socket and its buffered reader, exactly as
/// `spec.md` §6 specifies for the router's WebSocket handler signature.
pub type WebSocketHandler =
  Arc<dyn Fn(TcpStream, BufReader<TcpStream>, SocketAddr) + Send + Sync>;

struct Node<H> {
  children: HashMap<String, Node<H>>,
  handler: Option<H>,
}

impl<H> Node<H> {
  fn empty() -> Self {
    Node {
      children: HashMap::new(),
      handler: None,
    }
  }

  fn merge(&mut self, segments: &[&str], handler: H) -> Result<(), HttpError> {
    match segments.split_first() {
      None => {
        if self.handler.is_some() {
          return Err(HttpError::internal_server_error("conflicting path"));
        }
        self.handler = Some(handler);
        Ok(())
      }
      Some((segment, rest)) => self
        .children
        .entry((*segment).to_string())
        .or_insert_with(Node::empty)
        .merge(rest, handler),
    }
  }

  fn route(&self, segments: &[&str]) -> Option<&H> {
    match segments.split_first() {
      None => self.handler.as_ref(),
      Some((segment, rest)) => self.children.get(*segment)?.route(rest),
    }
  }
}

fn segments(path: &str) -> Vec<&str> {
  let trimmed = path.strip_prefix('/').unwrap_or(path);
  if trimmed.is_empty() {
    Vec::new()
  } else {
    trimmed.split('/').collect()
  }
}

/// Dispatches paths to registered HTTP and WebSocket handlers. The two
/// handler kinds live in independent tries, so the same path may be
/// registered once per kind.
pub struct Router {
  http: Node<HttpHandler>,
  websocket: Node<WebSocketHandler>,
}

impl Router {
  pub fn new() -> Self {
    Router {
      http: Node::empty(),
      websocket: Node::empty(),
    }
  }

  pub fn add_route(
    &mut self,
    path: &str,
    handler: impl Fn(&Request) -> Response + Send + Sync + 'static,
  ) -> Result<(), HttpError> {
    self.http.merge(&segments(path), Arc::new(handler))
  }

  pub fn add_websocket(
    &mut self,
    path: &str,
    handler: impl Fn(TcpStream, BufReader<TcpStream>, SocketAddr) + Send + Sync + 'static,
  ) -> Result<(), HttpError> {
    self.websocket.merge(&segments(path), Arc::new(handler))
  }

  pub fn route_http(&self, request: &Request) -> Result<HttpHandler, HttpError> {
    self
      .http
      .route(&segments(&request.path))
      .cloned()
      .ok_or_else(|| HttpError::not_found(format!("no route for: {}", request.path)))
  }

  pub fn route_websocket(&self, path: &str) -> Result<WebSocketHandler, HttpError> {
    self
      .websocket
      .route(&segments(path))
      .cloned()
      .ok_or_else(|| HttpError::not_found(format!("no route for: {path}")))
  }
}

impl Default for Router {
  fn default() -> Self {
    Router::new()
  }
}
