//! A minimal, blocking HTTP/1.1 + WebSocket (RFC 6455) server library.
//!
//! A [`Server`] accepts TCP connections and dispatches each one, on its own
//! thread, through a [`Router`] to either a plain HTTP handler or a
//! WebSocket [`Handler`] registered against a path. The WebSocket half
//! implements framing, masking, fragmentation reassembly, and close
//! coordination directly against RFC 6455 — there is no async runtime and
//! no permessage-deflate.

mod close;
mod connection;
mod error;
mod frame;
mod handshake;
mod http;
mod mask;
mod router;
mod server;

pub use close::{parse_close_payload, CloseCode};
pub use connection::{serve as serve_connection, CloseEvent, ConnectionHandle, Handler, MessageEvent, State};
pub use error::WebSocketError;
pub use frame::{Frame, OpCode};
pub use handshake::accept as accept_handshake;
pub use http::{HttpError, Request, Response};
pub use router::Router;
pub use server::Server;
