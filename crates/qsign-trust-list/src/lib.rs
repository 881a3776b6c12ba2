//! EU trust list support for qsign
//!
//! This crate fetches the EU list of trusted lists (LOTL) and the national
//! trusted lists it points to, turns the listed CA, TSA and OCSP certificates
//! into a [`TrustAnchorSet`], caches it, and validates certificate paths
//! against it.
//!
//! # Example
//!
//! ```no_run
//! use qsign_trust_list::{KeyPurpose, TrustListConfig, TrustListStore};
//!
//! # fn example(tsa_cert: &[u8]) -> Result<(), qsign_trust_list::Error> {
//! let store = TrustListStore::new(TrustListConfig::production())?;
//! let anchors = store.load()?;
//! anchors.verify_chain(tsa_cert, &[], chrono::Utc::now(), KeyPurpose::TimeStamping)?;
//! # Ok(())
//! # }
//! ```

pub mod anchors;
pub mod error;
pub mod fallback;
pub mod store;
pub mod tsl;

pub use anchors::{KeyPurpose, TrustAnchor, TrustAnchorSet};
pub use error::{Error, Result};
pub use store::{TrustListConfig, TrustListStore, DEFAULT_LOTL_URL, DEGRADED_RETRY_SECS};
pub use tsl::{ServiceType, TrustService, TslPointer};
