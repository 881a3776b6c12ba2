//! Core types and data structures for qualified electronic signatures
//!
//! This crate provides the data structures shared by every qsign component:
//! digest and encoding wrappers, the signature package produced by the
//! signing engine, and the clock abstraction used for freshness decisions.

pub mod encoding;
pub mod error;
pub mod hash;
pub mod package;
pub mod time;

pub(crate) use encoding::{base64_bytes, base64_bytes_opt, base64_bytes_seq};

pub use encoding::Sha256Hash;
pub use error::{Error, Result};
pub use hash::{HashAlgorithm, MessageImprint};
pub use package::{MigrationPlan, MigrationStatus, SignatureFormat, SignaturePackage};
pub use time::{Clock, FixedClock, SystemClock};
