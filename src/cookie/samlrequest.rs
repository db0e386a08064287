//! The `SamlRequest` cookie (spec §4.5): the state the hub needs to process the IdP's
//! answer to an `AuthnRequest` it issued — since there is no session store, this is
//! carried round-trip in a cookie set before the redirect to the IdP and read back when
//! the browser returns to the ACS endpoint.

use crate::common::error::HubError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlRequest {
    /// The hub's own outbound `AuthnRequest` ID, echoed by the IdP as `InResponseTo` —
    /// this is what correlates the IdP's answer back to this cookie (spec §4.7
    /// "IDP-DISPATCH ... persist SamlRequest in cookie via @ID").
    pub id: String,
    /// The original SP's entityID, needed to mint the hub's Response back to it.
    pub sp_entity_id: String,
    /// The original SP `AuthnRequest`'s ID, carried forward as the final Response's
    /// `InResponseTo`.
    pub sp_request_id: String,
    pub acs_url: String,
    /// The ACS URL the hub advertised to the IdP on its own outbound `AuthnRequest` —
    /// what the IdP's `SubjectConfirmationData/@Recipient` and `Response/@Destination`
    /// must both echo back (spec §4.3 step 8).
    pub hub_acs_url: String,
    pub relay_state: Option<String>,
}

fn write_field(out: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn read_field<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a str, HubError> {
    if buf.len() < *pos + 2 {
        return Err(HubError::malformed("saml request cookie truncated"));
    }
    let len = u16::from_be_bytes(buf[*pos..*pos + 2].try_into().unwrap()) as usize;
    *pos += 2;
    if buf.len() < *pos + len {
        return Err(HubError::malformed("saml request cookie truncated"));
    }
    let s = std::str::from_utf8(&buf[*pos..*pos + len])
        .map_err(|_| HubError::malformed("saml request cookie not utf8"))?;
    *pos += len;
    Ok(s)
}

impl SamlRequest {
    /// Compact, non-JSON binary encoding — kept deliberately small since this cookie is
    /// sent on every SSO round trip. `id` is appended last and unprefixed so it can
    /// stand as the verbatim suffix of the space-saving codec (spec §4.5): the rest of
    /// the fields are HMAC-covered, `id` rides along without a second base64 layer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_field(&mut out, &self.sp_entity_id);
        write_field(&mut out, &self.sp_request_id);
        write_field(&mut out, &self.acs_url);
        write_field(&mut out, &self.hub_acs_url);
        write_field(&mut out, self.relay_state.as_deref().unwrap_or(""));
        out.extend_from_slice(self.id.as_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, HubError> {
        let mut pos = 0;
        let sp_entity_id = read_field(buf, &mut pos)?.to_string();
        let sp_request_id = read_field(buf, &mut pos)?.to_string();
        let acs_url = read_field(buf, &mut pos)?.to_string();
        let hub_acs_url = read_field(buf, &mut pos)?.to_string();
        let relay_state = read_field(buf, &mut pos)?.to_string();
        let id = std::str::from_utf8(&buf[pos..])
            .map_err(|_| HubError::malformed("saml request cookie not utf8"))?
            .to_string();
        Ok(Self {
            id,
            sp_entity_id,
            sp_request_id,
            acs_url,
            hub_acs_url,
            relay_state: if relay_state.is_empty() { None } else { Some(relay_state) },
        })
    }

    pub fn seal(&self, hmac_key: &[u8], now: chrono::DateTime<chrono::Utc>) -> String {
        let payload = self.encode();
        let split = payload.len() - self.id.len();
        crate::cookie::space_saving::encode(&payload, split, hmac_key, now)
    }

    pub fn open(
        cookie: &str,
        hmac_key: &[u8],
        ttl_seconds: i64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Self, HubError> {
        let payload = crate::cookie::space_saving::decode(cookie, hmac_key, ttl_seconds, now)?;
        Self::decode(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SamlRequest {
        SamlRequest {
            id: "_req1".to_string(),
            sp_entity_id: "https://sp.example.org/md".to_string(),
            sp_request_id: "_sp1".to_string(),
            acs_url: "https://sp.example.org/acs".to_string(),
            hub_acs_url: "https://wayf.example.org/acs".to_string(),
            relay_state: Some("/landing".to_string()),
        }
    }

    #[test]
    fn round_trips_through_seal_and_open() {
        let req = sample();
        let now = chrono::Utc::now();
        let sealed = req.seal(b"key", now);
        let opened = SamlRequest::open(&sealed, b"key", 300, now).unwrap();
        assert_eq!(opened, req);
    }

    #[test]
    fn empty_relay_state_round_trips_as_none() {
        let mut req = sample();
        req.relay_state = None;
        let decoded = SamlRequest::decode(&req.encode()).unwrap();
        assert_eq!(decoded.relay_state, None);
    }
}
