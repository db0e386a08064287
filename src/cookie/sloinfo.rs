//! The `SLOInfoList` cookie (spec §4.5, §4.8): per-browser list of the parties that must
//! each receive a `LogoutRequest` before Single Logout completes, correlated by the SP
//! or IdP's entityID.

use serde::{Deserialize, Serialize};

use crate::common::error::HubError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SloInfo {
    pub entity_id: String,
    pub name_id: String,
    pub session_index: Option<String>,
    pub is_idp: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SloInfoList(pub Vec<SloInfo>);

fn write_field(out: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn read_field<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a str, HubError> {
    if buf.len() < *pos + 2 {
        return Err(HubError::malformed("slo info cookie truncated"));
    }
    let len = u16::from_be_bytes(buf[*pos..*pos + 2].try_into().unwrap()) as usize;
    *pos += 2;
    if buf.len() < *pos + len {
        return Err(HubError::malformed("slo info cookie truncated"));
    }
    let s = std::str::from_utf8(&buf[*pos..*pos + len])
        .map_err(|_| HubError::malformed("slo info cookie not utf8"))?;
    *pos += len;
    Ok(s)
}

impl SloInfoList {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.0.len() as u16).to_be_bytes());
        for entry in &self.0 {
            write_field(&mut out, &entry.entity_id);
            write_field(&mut out, &entry.name_id);
            write_field(&mut out, entry.session_index.as_deref().unwrap_or(""));
            out.push(entry.is_idp as u8);
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, HubError> {
        if buf.len() < 2 {
            return Err(HubError::malformed("slo info cookie truncated"));
        }
        let count = u16::from_be_bytes(buf[0..2].try_into().unwrap()) as usize;
        let mut pos = 2;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let entity_id = read_field(buf, &mut pos)?.to_string();
            let name_id = read_field(buf, &mut pos)?.to_string();
            let session_index = read_field(buf, &mut pos)?.to_string();
            if buf.len() < pos + 1 {
                return Err(HubError::malformed("slo info cookie truncated"));
            }
            let is_idp = buf[pos] != 0;
            pos += 1;
            entries.push(SloInfo {
                entity_id,
                name_id,
                session_index: if session_index.is_empty() { None } else { Some(session_index) },
                is_idp,
            });
        }
        Ok(Self(entries))
    }

    pub fn seal(&self, hmac_key: &[u8], now: chrono::DateTime<chrono::Utc>) -> String {
        crate::cookie::opaque::encode(&self.encode(), hmac_key, now)
    }

    pub fn open(
        cookie: &str,
        hmac_key: &[u8],
        ttl_seconds: i64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Self, HubError> {
        let payload = crate::cookie::opaque::decode(cookie, hmac_key, ttl_seconds, now)?;
        Self::decode(&payload)
    }

    /// Removes the entry the hub has just finished notifying (spec §4.8 cascade).
    pub fn remove(&mut self, entity_id: &str) {
        self.0.retain(|e| e.entity_id != entity_id);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SloInfoList {
        SloInfoList(vec![
            SloInfo {
                entity_id: "https://sp1.example.org/md".to_string(),
                name_id: "user-1".to_string(),
                session_index: Some("_sess1".to_string()),
                is_idp: false,
            },
            SloInfo {
                entity_id: "https://idp.example.org/md".to_string(),
                name_id: "user-1".to_string(),
                session_index: None,
                is_idp: true,
            },
        ])
    }

    #[test]
    fn round_trips_through_seal_and_open() {
        let list = sample();
        let now = chrono::Utc::now();
        let sealed = list.seal(b"key", now);
        let opened = SloInfoList::open(&sealed, b"key", 300, now).unwrap();
        assert_eq!(opened, list);
    }

    #[test]
    fn remove_drops_matching_entity_only() {
        let mut list = sample();
        list.remove("https://sp1.example.org/md");
        assert_eq!(list.0.len(), 1);
        assert!(list.0[0].is_idp);
    }
}
