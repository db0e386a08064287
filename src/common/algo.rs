//! The global digest/signature algorithm map (spec §4.2, design note in §9).
//!
//! Initialised once at startup from a static list; digest-uri and signature-uri both
//! resolve to the same table entry, mirroring the original system's self-registering
//! algorithm table which must be populated before any handler runs.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// A shorthand accepted on ingress per spec §6 ("Algorithm policy"). `Sha1` is carried
/// only for the legacy OAEP MGF1 case in §4.2/§4.3 and is never accepted for envelope
/// signature verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alg {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

#[derive(Debug, Clone, Copy)]
pub struct AlgEntry {
    pub alg: Alg,
    pub digest_uri: &'static str,
    pub signature_uri: &'static str,
    /// DER prefix prepended to the raw digest for PKCS#1 v1.5 signing (RFC 8017 §9.2).
    pub der_prefix: &'static [u8],
}

const SHA1: AlgEntry = AlgEntry {
    alg: Alg::Sha1,
    digest_uri: "http://www.w3.org/2000/09/xmldsig#sha1",
    signature_uri: "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
    der_prefix: &[
        0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04, 0x14,
    ],
};

const SHA256: AlgEntry = AlgEntry {
    alg: Alg::Sha256,
    digest_uri: "http://www.w3.org/2001/04/xmlenc#sha256",
    signature_uri: "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
    der_prefix: &[
        0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01,
        0x05, 0x00, 0x04, 0x20,
    ],
};

const SHA384: AlgEntry = AlgEntry {
    alg: Alg::Sha384,
    digest_uri: "http://www.w3.org/2001/04/xmldsig-more#sha384",
    signature_uri: "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
    der_prefix: &[
        0x30, 0x41, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02,
        0x05, 0x00, 0x04, 0x30,
    ],
};

const SHA512: AlgEntry = AlgEntry {
    alg: Alg::Sha512,
    digest_uri: "http://www.w3.org/2001/04/xmlenc#sha512",
    signature_uri: "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
    der_prefix: &[
        0x30, 0x51, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03,
        0x05, 0x00, 0x04, 0x40,
    ],
};

/// Algorithms accepted on ingress per spec §6. `sha1` is deliberately excluded here —
/// it is reachable only through [`entry_for_shorthand`] for the legacy OAEP path.
pub const INGRESS_ALLOWED: &[Alg] = &[Alg::Sha256, Alg::Sha384, Alg::Sha512];

pub const DEFAULT_ALG: Alg = Alg::Sha256;

static BY_URI: Lazy<HashMap<&'static str, AlgEntry>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for e in [SHA1, SHA256, SHA384, SHA512] {
        m.insert(e.digest_uri, e);
        m.insert(e.signature_uri, e);
    }
    m
});

static BY_SHORTHAND: Lazy<HashMap<&'static str, AlgEntry>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("sha1", SHA1);
    m.insert("sha256", SHA256);
    m.insert("sha384", SHA384);
    m.insert("sha512", SHA512);
    m
});

pub fn entry_for_uri(uri: &str) -> Option<AlgEntry> {
    BY_URI.get(uri).copied()
}

pub fn entry_for_shorthand(name: &str) -> Option<AlgEntry> {
    BY_SHORTHAND.get(name).copied()
}

pub fn is_allowed_for_ingress(alg: Alg) -> bool {
    INGRESS_ALLOWED.contains(&alg)
}

impl Alg {
    pub fn shorthand(self) -> &'static str {
        match self {
            Alg::Sha1 => "sha1",
            Alg::Sha256 => "sha256",
            Alg::Sha384 => "sha384",
            Alg::Sha512 => "sha512",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_and_signature_uri_alias_the_same_entry() {
        let by_digest = entry_for_uri(SHA256.digest_uri).unwrap();
        let by_sig = entry_for_uri(SHA256.signature_uri).unwrap();
        assert_eq!(by_digest.alg, by_sig.alg);
    }

    #[test]
    fn sha1_rejected_for_ingress() {
        assert!(!is_allowed_for_ingress(Alg::Sha1));
        assert!(is_allowed_for_ingress(Alg::Sha256));
    }
}
