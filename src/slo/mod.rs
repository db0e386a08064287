//! Single Logout tracker (spec §4.8, component C8): cascades a `LogoutRequest` to every
//! party the `SLOInfoList` cookie names, correlating answers by freshly minted request
//! IDs rather than the original session's.

use std::collections::HashMap;

use crate::cookie::sloinfo::{SloInfo, SloInfoList};
use crate::saml::model::{fresh_id, LogoutRequest};

/// One outstanding logout request sent to a participant, tracked by the fresh ID the
/// hub minted for it (spec §4.8 — "correlation by fresh ID").
#[derive(Debug, Clone)]
pub struct PendingLogout {
    pub request_id: String,
    pub entity_id: String,
    pub asynchronous: bool,
}

/// Drives one round of the cascade: pops the next participant off the list (front of
/// queue) and builds the `LogoutRequest` to send it, or reports the cascade complete.
pub struct SloCascade {
    pub remaining: SloInfoList,
    pub pending: HashMap<String, PendingLogout>,
}

impl SloCascade {
    pub fn new(remaining: SloInfoList) -> Self {
        Self {
            remaining,
            pending: HashMap::new(),
        }
    }

    /// Builds the next `LogoutRequest` in the cascade, if any participants remain.
    /// `asynchronous` participants (spec §4.8) get their logout fired without the hub
    /// waiting on a `LogoutResponse` before continuing the cascade.
    pub fn next_request(&mut self, hub_issuer: &str, destination_of: impl Fn(&SloInfo) -> Option<String>) -> Option<(LogoutRequest, PendingLogout)> {
        let next = self.remaining.0.first()?.clone();
        let destination = destination_of(&next)?;
        self.remaining.remove(&next.entity_id);

        let request = LogoutRequest::new(hub_issuer, &destination, &next.name_id);
        let request_id = request.0.id().unwrap_or_else(fresh_id);

        let pending = PendingLogout {
            request_id: request_id.clone(),
            entity_id: next.entity_id.clone(),
            asynchronous: false,
        };
        self.pending.insert(request_id, pending.clone());
        Some((request, pending))
    }

    /// Records a `LogoutResponse` for a still-pending participant; returns whether the
    /// whole cascade (all participants answered or removed) is now complete.
    pub fn acknowledge(&mut self, request_id: &str) -> bool {
        self.pending.remove(request_id);
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty() && self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(entity_id: &str) -> SloInfo {
        SloInfo {
            entity_id: entity_id.to_string(),
            name_id: "user-1".to_string(),
            session_index: None,
            is_idp: false,
        }
    }

    #[test]
    fn cascade_drains_participants_in_order() {
        let list = SloInfoList(vec![info("https://sp1/md"), info("https://sp2/md")]);
        let mut cascade = SloCascade::new(list);

        let (_, p1) = cascade
            .next_request("https://hub/md", |i| Some(format!("{}/slo", i.entity_id)))
            .unwrap();
        assert_eq!(p1.entity_id, "https://sp1/md");
        assert!(!cascade.is_complete());

        let (_, p2) = cascade
            .next_request("https://hub/md", |i| Some(format!("{}/slo", i.entity_id)))
            .unwrap();
        assert_eq!(p2.entity_id, "https://sp2/md");

        assert!(cascade.next_request("https://hub/md", |_| None).is_none());

        assert!(!cascade.acknowledge(&p1.request_id));
        assert!(cascade.acknowledge(&p2.request_id));
    }
}
