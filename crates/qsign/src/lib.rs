//! Qualified electronic signatures
//!
//! This is the main entry point of the qsign workspace. [`SignatureEngine`]
//! signs content with a qualified certificate, anchors the signature to an
//! RFC 3161 timestamp and, when possible, attaches OCSP revocation evidence.
//! [`PackageVerifier`] checks stored packages again later. Both validate
//! certificates against the EU trusted lists.
//!
//! # Example
//!
//! ```no_run
//! use qsign::{SignatureEngine, SigningConfig};
//!
//! # fn example() -> qsign::Result<()> {
//! let config = SigningConfig::from_file("/etc/qsign/config.json")?;
//! let engine = SignatureEngine::from_config(&config)?;
//!
//! let package = engine.sign(b"filing contents", &serde_json::json!({"period": "2026-Q3"}))?;
//! println!("{}", package.signature_format);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod payload;
pub mod sign;
pub mod verify;

// Re-export component crates
pub use qsign_cache as cache;
pub use qsign_crypto as crypto;
pub use qsign_ocsp as ocsp;
pub use qsign_transport as transport;
pub use qsign_trust_list as trust_list;
pub use qsign_tsa as tsa;
pub use qsign_types as types;

pub use config::{IdentityConfig, SigningConfig};
pub use error::{Error, ErrorKind, Result};
pub use identity::SigningIdentity;
pub use payload::SignaturePayload;
pub use sign::SignatureEngine;
pub use verify::{verify_package, PackageVerifier, VerificationOutcome};

pub use qsign_types::{SignatureFormat, SignaturePackage};
