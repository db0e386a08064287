//! Consent gating (spec §4.6): whether the hub must show the user an attribute-release
//! confirmation page before completing SSO, and what it records when it does.

use sha2::{Digest, Sha256};

use super::AttributeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentPolicy {
    /// Never show the confirmation page for this SP (pre-established trust).
    BypassConfirmation,
    /// Always show the confirmation page, even if the user has consented before.
    ForceConfirmation,
    /// Show it once per distinct (SP, attribute set) combination, remembered by a hash
    /// of the released attribute names and values (spec §4.6).
    Hash,
}

/// What the hub needs to decide, and later record, a consent decision.
#[derive(Debug, Clone)]
pub struct AttributeReleaseData {
    pub sp_entity_id: String,
    pub released: AttributeSet,
    pub consent_hash: String,
}

/// A stable digest of the (SP, released-attribute-set) pair, used both to detect "has
/// the user already consented to exactly this" and as the value stored for that fact.
pub fn consent_hash(sp_entity_id: &str, released: &AttributeSet) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sp_entity_id.as_bytes());
    for (name, values) in released {
        hasher.update(b"\n");
        hasher.update(name.as_bytes());
        for v in values {
            hasher.update(b"=");
            hasher.update(v.as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

pub fn build_release_data(sp_entity_id: &str, released: AttributeSet) -> AttributeReleaseData {
    let consent_hash = consent_hash(sp_entity_id, &released);
    AttributeReleaseData {
        sp_entity_id: sp_entity_id.to_string(),
        released,
        consent_hash,
    }
}

/// True if the confirmation page must be shown given the policy and whether
/// `previous_hash` (the last hash the user consented to for this SP, if any) matches
/// the current release.
pub fn must_confirm(policy: ConsentPolicy, current_hash: &str, previous_hash: Option<&str>) -> bool {
    match policy {
        ConsentPolicy::BypassConfirmation => false,
        ConsentPolicy::ForceConfirmation => true,
        ConsentPolicy::Hash => previous_hash != Some(current_hash),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(name: &str, values: &[&str]) -> AttributeSet {
        let mut s = AttributeSet::new();
        s.insert(name.to_string(), values.iter().map(|v| v.to_string()).collect());
        s
    }

    #[test]
    fn hash_policy_confirms_only_on_change() {
        let released = set("mail", &["a@example.org"]);
        let hash = consent_hash("https://sp/md", &released);
        assert!(!must_confirm(ConsentPolicy::Hash, &hash, Some(&hash)));
        assert!(must_confirm(ConsentPolicy::Hash, &hash, None));
    }

    #[test]
    fn bypass_never_confirms() {
        assert!(!must_confirm(ConsentPolicy::BypassConfirmation, "h", None));
    }

    #[test]
    fn force_always_confirms() {
        assert!(must_confirm(ConsentPolicy::ForceConfirmation, "h", Some("h")));
    }
}
