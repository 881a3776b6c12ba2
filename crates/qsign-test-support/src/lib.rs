//! Test fixtures shared by the qsign crates
//!
//! Everything here runs offline: certificates come from rcgen, the mock
//! authorities sign real RFC 3161 and RFC 6960 structures, and
//! [`MockTransport`] routes requests to them by URL.

pub mod ocsp;
pub mod pki;
pub mod transport;
pub mod tsa;
pub mod tsl;

pub use ocsp::{MockOcsp, OcspBehavior};
pub use pki::{
    aia_extension, leaf, root_ca, rsa_leaf, TestCert, TestPki, Usage, DEFAULT_OCSP_URL,
};
pub use transport::{Endpoint, Method, MockTransport, RecordedRequest, TimesOut, Unreachable};
pub use tsa::{generalized_time, MockTsa, TsaBehavior, DEFAULT_POLICY};
pub use tsl::{lotl_xml, trust_list_xml, ServiceEntry};

use qsign_cache::InMemoryCache;
use qsign_trust_list::{TrustListConfig, TrustListStore};
use qsign_types::{Clock, SystemClock};
use std::sync::Arc;

/// Location of the mock list of trusted lists
pub const LOTL_URL: &str = "https://lotl.test/eu-lotl.xml";
/// Location of the mock national list
pub const NATIONAL_LIST_URL: &str = "https://tl.test/at.xml";
/// Primary mock TSA
pub const TSA_URL: &str = "https://tsa.test/tsr";
/// Backup mock TSA
pub const BACKUP_TSA_URL: &str = "https://tsa-backup.test/tsr";

/// Route the mock LOTL and a national list trusting `pki.root` (as CA/QC)
/// and `pki.tsa` (as TSA/QTST)
pub fn serve_trust_lists(transport: &MockTransport, pki: &TestPki) {
    transport.route(
        LOTL_URL,
        qsign_transport::HttpResponse::ok(
            "application/xml",
            lotl_xml(&[(NATIONAL_LIST_URL, "AT")]).into_bytes(),
        ),
    );
    transport.route(
        NATIONAL_LIST_URL,
        qsign_transport::HttpResponse::ok(
            "application/xml",
            trust_list_xml(
                "AT",
                &[
                    ServiceEntry::granted("qsign Test Root", "CA/QC", pki.root.der()),
                    ServiceEntry::granted("qsign Test TSA", "TSA/QTST", pki.tsa.der()),
                ],
            )
            .into_bytes(),
        ),
    );
}

/// A trust list store over `transport` with an in-memory cache, no fallback
/// anchors and the given clock
pub fn trust_store(transport: Arc<MockTransport>, clock: Arc<dyn Clock>) -> Arc<TrustListStore> {
    let config = TrustListConfig::default()
        .with_lotl_url(LOTL_URL)
        .with_fallback_pem("");
    Arc::new(TrustListStore::with_parts(
        config,
        Arc::new(InMemoryCache::new()),
        transport,
        clock,
    ))
}

/// [`trust_store`] on the system clock
pub fn system_trust_store(transport: Arc<MockTransport>) -> Arc<TrustListStore> {
    trust_store(transport, Arc::new(SystemClock))
}
