//!
//! Request, response and session of one dispatch.
//!

mod request;
mod response;
mod session;

pub use request::Request;
pub use response::Response;
pub use session::Session;
