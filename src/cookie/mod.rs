//! Authenticated, stateless cookie codec (spec §4.5, component C5): no server-side
//! session store — every cookie is an HMAC-SHA256-authenticated, timestamp-framed blob
//! the hub can verify and expire without a lookup.
//!
//! Frame layout: `0xC4 0x10 || hmac[0:16] || 0xD6 0xFF || be32(unix_seconds) || payload`.
//! The two fixed marker byte-pairs let a corrupted or foreign cookie be rejected before
//! the (constant-time) HMAC comparison even runs.

pub mod sloinfo;
pub mod samlrequest;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::common::error::HubError;

type HmacSha256 = Hmac<Sha256>;

const MAGIC_HEAD: [u8; 2] = [0xC4, 0x10];
const MAGIC_MID: [u8; 2] = [0xD6, 0xFF];
const HEADER_LEN: usize = 2 + 16 + 2 + 4;

fn mac_over(hmac_key: &[u8], ts: u32, payload: &[u8]) -> [u8; 16] {
    let mut mac = HmacSha256::new_from_slice(hmac_key).expect("hmac key of any length");
    mac.update(&MAGIC_HEAD);
    mac.update(&MAGIC_MID);
    mac.update(&ts.to_be_bytes());
    mac.update(payload);
    let full = mac.finalize().into_bytes();
    let mut truncated = [0u8; 16];
    truncated.copy_from_slice(&full[..16]);
    truncated
}

/// Frames and authenticates `payload` under `hmac_key`, stamped with `now`.
pub fn seal(payload: &[u8], hmac_key: &[u8], now: chrono::DateTime<chrono::Utc>) -> Vec<u8> {
    let ts = now.timestamp() as u32;
    let mac = mac_over(hmac_key, ts, payload);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC_HEAD);
    out.extend_from_slice(&mac);
    out.extend_from_slice(&MAGIC_MID);
    out.extend_from_slice(&ts.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Verifies and unframes a cookie, rejecting on magic-byte mismatch, HMAC mismatch, or
/// an age beyond `ttl_seconds`.
pub fn open(
    frame: &[u8],
    hmac_key: &[u8],
    ttl_seconds: i64,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<u8>, HubError> {
    if frame.len() < HEADER_LEN {
        return Err(HubError::transport("cookie too short"));
    }
    if frame[0..2] != MAGIC_HEAD {
        return Err(HubError::transport("cookie magic mismatch"));
    }
    if frame[18..20] != MAGIC_MID {
        return Err(HubError::transport("cookie magic mismatch"));
    }

    let claimed_mac = &frame[2..18];
    let ts = u32::from_be_bytes(frame[20..24].try_into().unwrap());
    let payload = &frame[HEADER_LEN..];

    let expected_mac = mac_over(hmac_key, ts, payload);
    if !constant_time_eq(claimed_mac, &expected_mac) {
        return Err(HubError::transport("cookie hmac mismatch"));
    }

    let age = now.timestamp() - ts as i64;
    if age < 0 || age > ttl_seconds {
        return Err(HubError::transport("cookie expired"));
    }

    Ok(payload.to_vec())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// The "opaque" sub-codec: the payload is carried verbatim (already serialized by the
/// caller — JSON for human-debuggable cookies, spec §4.5).
pub mod opaque {
    use super::*;

    pub fn encode(payload: &[u8], hmac_key: &[u8], now: chrono::DateTime<chrono::Utc>) -> String {
        base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, seal(payload, hmac_key, now))
    }

    pub fn decode(
        cookie: &str,
        hmac_key: &[u8],
        ttl_seconds: i64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<u8>, HubError> {
        let frame = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, cookie)
            .map_err(|_| HubError::transport("cookie base64"))?;
        open(&frame, hmac_key, ttl_seconds, now)
    }
}

/// The "space-saving" sub-codec (spec §4.5): only the first `split` bytes of the
/// payload are HMAC-framed and base64-encoded; the remainder is appended verbatim
/// after a `.` separator. Meant for payloads whose tail is already a URL-safe
/// identifier (e.g. an `AuthnRequest/@ID`) that would otherwise be base64-encoded a
/// second time for no benefit.
pub mod space_saving {
    use super::*;

    pub fn encode(payload: &[u8], split: usize, hmac_key: &[u8], now: chrono::DateTime<chrono::Utc>) -> String {
        let split = split.min(payload.len());
        let (head, tail) = payload.split_at(split);
        let framed = seal(head, hmac_key, now);
        let head_b64 = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, framed);
        format!("{head_b64}.{}", String::from_utf8_lossy(tail))
    }

    pub fn decode(
        cookie: &str,
        hmac_key: &[u8],
        ttl_seconds: i64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<u8>, HubError> {
        let (head_b64, tail) = cookie
            .split_once('.')
            .ok_or_else(|| HubError::transport("cookie malformed"))?;
        let frame = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, head_b64)
            .map_err(|_| HubError::transport("cookie base64"))?;
        let mut head = open(&frame, hmac_key, ttl_seconds, now)?;
        head.extend_from_slice(tail.as_bytes());
        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn seals_and_opens_round_trip() {
        let now = chrono::Utc::now();
        let frame = seal(b"payload bytes", b"secret", now);
        let opened = open(&frame, b"secret", 300, now).unwrap();
        assert_eq!(opened, b"payload bytes");
    }

    #[test]
    fn rejects_wrong_key() {
        let now = chrono::Utc::now();
        let frame = seal(b"payload bytes", b"secret", now);
        assert!(open(&frame, b"wrong", 300, now).is_err());
    }

    #[test]
    fn rejects_expired_cookie() {
        let now = chrono::Utc::now();
        let frame = seal(b"payload bytes", b"secret", now - Duration::seconds(400));
        assert!(open(&frame, b"secret", 300, now).is_err());
    }

    #[test]
    fn rejects_tampered_payload() {
        let now = chrono::Utc::now();
        let mut frame = seal(b"payload bytes", b"secret", now);
        let last = frame.len() - 1;
        frame[last] ^= 1;
        assert!(open(&frame, b"secret", 300, now).is_err());
    }

    #[test]
    fn space_saving_round_trips_with_verbatim_tail() {
        let now = chrono::Utc::now();
        let payload = b"headbytes_req123";
        let split = "headbytes".len();
        let encoded = space_saving::encode(payload, split, b"secret", now);
        assert!(encoded.ends_with("_req123"));
        let decoded = space_saving::decode(&encoded, b"secret", 300, now).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn space_saving_rejects_tampered_head() {
        let now = chrono::Utc::now();
        let payload = b"headbytes_req123";
        let encoded = space_saving::encode(payload, "headbytes".len(), b"secret", now);
        let mut tampered = encoded.clone();
        tampered.replace_range(0..1, "z");
        assert!(space_saving::decode(&tampered, b"secret", 300, now).is_err());
    }

    #[test]
    fn space_saving_rejects_malformed_cookie_without_separator() {
        let now = chrono::Utc::now();
        assert!(space_saving::decode("no-separator-here", b"secret", 300, now).is_err());
    }
}
