//! Property-based and table-driven tests for self-contained pieces of the hub, run as
//! a separate binary so quickcheck's randomized inputs don't slow down `cargo test`'s
//! default in-crate unit test pass.

use chrono::{Duration, Utc};
use fedhub::attributes::arp::{Arp, ValuePattern};
use fedhub::common::time::within_skew;
use quickcheck_macros::quickcheck;

/// Any payload sealed under a given key and timestamp decodes back to itself as long
/// as it's read back within its TTL.
#[quickcheck]
fn opaque_cookie_round_trips_arbitrary_payloads(payload: Vec<u8>) -> bool {
    let now = Utc::now();
    let key = b"quickcheck-hmac-key";
    let sealed = fedhub::cookie::opaque::encode(&payload, key, now);
    fedhub::cookie::opaque::decode(&sealed, key, 300, now).map(|p| p == payload).unwrap_or(false)
}

/// A cookie sealed under one key never opens under a different one.
#[quickcheck]
fn opaque_cookie_rejects_wrong_key(payload: Vec<u8>, tweak: u8) -> bool {
    let now = Utc::now();
    let key_a = b"key-a-material";
    let mut key_b = *key_a;
    key_b[0] ^= tweak.max(1);

    let sealed = fedhub::cookie::opaque::encode(&payload, key_a, now);
    fedhub::cookie::opaque::decode(&sealed, &key_b, 300, now).is_err()
}

/// `within_skew` is symmetric around `now` regardless of which side the timestamp
/// falls on.
#[quickcheck]
fn timing_skew_window_is_symmetric(offset_seconds: i32) -> bool {
    let now = Utc::now();
    let skew = 90i64;
    let offset = offset_seconds as i64 % 1000;
    let ts = now + Duration::seconds(offset);
    within_skew(now, ts, skew) == (offset.abs() <= skew)
}

#[test]
fn arp_wildcard_pattern_matches_scoped_affiliation() {
    let policy = Arp::new().allow("eduPersonScopedAffiliation", ValuePattern::Wildcard("*@idp.example.org".to_string()));
    assert!(policy_allows(&policy, "eduPersonScopedAffiliation", "member@idp.example.org"));
    assert!(!policy_allows(&policy, "eduPersonScopedAffiliation", "member@other.example.org"));
}

#[test]
fn arp_exact_pattern_rejects_near_misses() {
    let policy = Arp::new().allow("eduPersonPrincipalName", ValuePattern::Exact("alice@idp.example.org".to_string()));
    assert!(policy_allows(&policy, "eduPersonPrincipalName", "alice@idp.example.org"));
    assert!(!policy_allows(&policy, "eduPersonPrincipalName", "alice@idp.example.org.evil"));
}

#[test]
fn arp_denies_attributes_with_no_rule() {
    let policy = Arp::new().allow("mail", ValuePattern::Any);
    assert!(!policy_allows(&policy, "mail", "anything"));
    let mut only_mail_allowed_raw = fedhub::attributes::AttributeSet::new();
    only_mail_allowed_raw.insert("eduPersonPrincipalName".to_string(), vec!["alice@idp.example.org".to_string()]);
    let released = fedhub::attributes::build_release_set(only_mail_allowed_raw, Some("idp.example.org"), "idp.example.org", &policy).unwrap();
    assert!(!released.contains_key("eduPersonPrincipalName"));
}

/// Runs `value` for `attribute` through the full release pipeline under `policy`,
/// padding in the scope-carrying `eduPersonPrincipalName` every real request asserts so
/// the required-attribute check and scope enforcement both pass regardless of which
/// attribute is actually under test.
fn policy_allows(policy: &Arp, attribute: &str, value: &str) -> bool {
    let idp_scope = "idp.example.org";
    let mut raw = fedhub::attributes::AttributeSet::new();
    raw.insert("eduPersonPrincipalName".to_string(), vec![format!("someone@{idp_scope}")]);
    raw.insert(attribute.to_string(), vec![value.to_string()]);

    let released = fedhub::attributes::build_release_set(raw, Some(idp_scope), idp_scope, policy).unwrap_or_default();
    released.get(attribute).map(|v| v.iter().any(|x| x == value)).unwrap_or(false)
}
