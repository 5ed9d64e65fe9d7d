//! ocrw core - the worker's protocol loop, command dispatch and backend session.

pub mod handler;
pub mod protocol;
pub mod session;
pub mod worker;

pub use handler::CommandHandler;
pub use protocol::{DependencyReport, DetectRequest, Detection, Request, RequestError, Response};
pub use session::{BackendSession, DependencyError, DetectError};
pub use worker::serve;
