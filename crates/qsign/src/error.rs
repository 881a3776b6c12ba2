//! Error types for qsign
//!
//! Component errors are folded into four kinds. Callers branch on
//! [`Error::kind`]; the message keeps the component's description of the
//! cause.

use thiserror::Error;

/// Classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid key material or settings
    Configuration,
    /// Unreachable or failing remote endpoint
    Network,
    /// Malformed or inconsistent protocol data
    ProtocolViolation,
    /// No path to a trust anchor
    TrustChain,
}

/// Errors that can occur while signing or verifying packages
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid key material or settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unreachable or failing remote endpoint
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed structure, nonce or digest mismatch, bad signature
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// No path from a certificate to a known anchor
    #[error("Trust chain error: {0}")]
    TrustChain(String),
}

impl Error {
    /// The kind of failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Network(_) => ErrorKind::Network,
            Error::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            Error::TrustChain(_) => ErrorKind::TrustChain,
        }
    }
}

impl From<qsign_tsa::Error> for Error {
    fn from(e: qsign_tsa::Error) -> Self {
        use qsign_tsa::Error as Tsa;
        match e {
            Tsa::Transport(_) | Tsa::InvalidResponse(_) => Error::Network(e.to_string()),
            Tsa::CertificateValidationError(_) => Error::TrustChain(e.to_string()),
            Tsa::TrustList(inner) => inner.into(),
            Tsa::Configuration(_) => Error::Configuration(e.to_string()),
            Tsa::Asn1(_)
            | Tsa::ParseError(_)
            | Tsa::NoTstInfo
            | Tsa::NonceMismatch { .. }
            | Tsa::ImprintMismatch { .. }
            | Tsa::MessageDigestMismatch { .. }
            | Tsa::SignatureVerificationError(_) => Error::ProtocolViolation(e.to_string()),
        }
    }
}

impl From<qsign_trust_list::Error> for Error {
    fn from(e: qsign_trust_list::Error) -> Self {
        use qsign_trust_list::Error as TrustList;
        match e {
            TrustList::Transport(_) => Error::Network(e.to_string()),
            TrustList::Url(_) => Error::Configuration(e.to_string()),
            _ => Error::TrustChain(e.to_string()),
        }
    }
}

impl From<qsign_ocsp::Error> for Error {
    fn from(e: qsign_ocsp::Error) -> Self {
        use qsign_ocsp::Error as Ocsp;
        match e {
            Ocsp::Transport(_) => Error::Network(e.to_string()),
            Ocsp::TrustChain(_) => Error::TrustChain(e.to_string()),
            Ocsp::TrustList(inner) => inner.into(),
            Ocsp::InsecureUrl(_) => Error::Configuration(e.to_string()),
            _ => Error::ProtocolViolation(e.to_string()),
        }
    }
}

impl From<qsign_transport::Error> for Error {
    fn from(e: qsign_transport::Error) -> Self {
        Error::Network(e.to_string())
    }
}

impl From<qsign_cache::Error> for Error {
    fn from(e: qsign_cache::Error) -> Self {
        Error::Configuration(format!("cache: {}", e))
    }
}

/// Result type for qsign operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tsa_errors_are_classified() {
        let imprint: Error = qsign_tsa::Error::ImprintMismatch {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        }
        .into();
        assert_eq!(imprint.kind(), ErrorKind::ProtocolViolation);
        assert!(imprint.to_string().contains("message imprint"));

        let network: Error =
            qsign_tsa::Error::Transport(qsign_transport::Error::Timeout("https://tsa".into()))
                .into();
        assert_eq!(network.kind(), ErrorKind::Network);

        let chain: Error =
            qsign_tsa::Error::CertificateValidationError("no path".to_string()).into();
        assert_eq!(chain.kind(), ErrorKind::TrustChain);
    }

    #[test]
    fn test_trust_list_errors_are_classified() {
        let missing: Error =
            qsign_trust_list::Error::TrustChain("no trust anchors available".to_string()).into();
        assert_eq!(missing.kind(), ErrorKind::TrustChain);

        let nested: Error = qsign_tsa::Error::TrustList(qsign_trust_list::Error::Transport(
            qsign_transport::Error::Http("refused".to_string()),
        ))
        .into();
        assert_eq!(nested.kind(), ErrorKind::Network);
    }
}
