//! Blocking HTTP transport for qsign protocol clients
//!
//! Trust-list, timestamp and OCSP clients talk to the network only through
//! [`HttpTransport`], so tests can substitute an in-process implementation.

pub mod error;
pub mod http;

pub use error::{Error, Result};
pub use http::{HttpResponse, HttpTransport, ReqwestTransport};
