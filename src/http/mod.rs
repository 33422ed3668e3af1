//! The HTTP/1.1 request/response types and router that `spec.md` §6 treats
//! as an external "HTTP collaborator". Implemented here so the crate is
//! runnable end to end (`SPEC_FULL.md` §4.E).

mod error;
mod request;
mod response;

pub use error::HttpError;
pub use request::Request;
pub use response::Response;
