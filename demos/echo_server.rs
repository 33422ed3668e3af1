//! Echoes every text and binary message back to the sender on `/echo`, and
//! serves a tiny status page over plain HTTP on `/`. Run with:
//!
//! ```sh
//! cargo run --example echo_server
//! ```

use harbor_ws::{Handler, Request, Response, Router, Server};

fn main() {
  env_logger::init();

  let mut router = Router::new();

  router
    .add_route("/", |_req: &Request| {
      Response::with_body(200, b"harbor-ws echo server is running\n".to_vec())
    })
    .expect("register http route");

  router
    .add_websocket("/echo", |stream, reader, peer_addr| {
      log::info!("websocket connection from {peer_addr}");
      let handler = Handler::new()
        .on_open(move |_| log::info!("{peer_addr}: open"))
        .on_message(move |event, handle| {
          log::info!("{peer_addr}: {} byte message", event.data.len());
          if let Err(err) = handle.send_binary(&event.data) {
            log::warn!("{peer_addr}: failed to echo message: {err}");
          }
        })
        .on_close(move |event, _| {
          log::info!(
            "{peer_addr}: closed (code {}, clean {})",
            event.code,
            event.was_clean
          );
        })
        .on_error(move |err, _| log::warn!("{peer_addr}: {err}"));
      harbor_ws::serve_connection(stream, reader, handler);
    })
    .expect("register websocket route");

  let server = Server::bind("127.0.0.1:8080", router).expect("bind to 127.0.0.1:8080");
  log::info!("listening on {}", server.local_addr().unwrap());
  server.serve_forever();
}
