//! Typed SAML protocol message wrappers built on the arena DOM (spec §4.3).

use uuid::Uuid;

use crate::common::error::HubError;
use crate::common::time::format_instant;
use crate::xml::querydashp::query_dash_p;
use crate::xml::xpath::{query1, query_value, query_multi};
use crate::xml::{parse, serialize, Dom, NodeId};

const SAMLP: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
const SAML: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// Generates the `_`-prefixed identifiers SAML requires (IDs must not start with a
/// digit, spec §4.3).
pub fn fresh_id() -> String {
    format!("_{}", Uuid::new_v4().simple())
}

/// Thin handle over a parsed/constructed document plus its protocol-message root.
pub struct SamlDoc {
    pub dom: Dom,
    pub root: NodeId,
}

impl SamlDoc {
    pub fn parse(bytes: &[u8]) -> Result<Self, HubError> {
        let dom = parse(bytes)?;
        let root = dom.root.ok_or_else(|| HubError::malformed("empty document"))?;
        Ok(Self { dom, root })
    }

    pub fn serialize(&self) -> Vec<u8> {
        serialize(&self.dom, self.root)
    }

    pub fn id(&self) -> Option<String> {
        self.dom.attr(self.root, "ID").map(str::to_string)
    }

    pub fn issuer(&self) -> Option<String> {
        query_value(&self.dom, self.root, "saml:Issuer")
    }

    pub fn destination(&self) -> Option<String> {
        self.dom.attr(self.root, "Destination").map(str::to_string)
    }

    pub fn issue_instant(&self) -> Option<String> {
        self.dom.attr(self.root, "IssueInstant").map(str::to_string)
    }

    pub fn in_response_to(&self) -> Option<String> {
        self.dom.attr(self.root, "InResponseTo").map(str::to_string)
    }
}

fn new_root(dom: &mut Dom, tag: &str) -> NodeId {
    dom.register_namespace("samlp", SAMLP);
    dom.register_namespace("saml", SAML);
    let root = dom.create_element(None, tag);
    dom.root = Some(root);
    root
}

fn stamp_common(dom: &mut Dom, root: NodeId, issuer: &str, destination: Option<&str>) -> String {
    let id = fresh_id();
    dom.set_attr(root, "ID", &id);
    dom.set_attr(root, "Version", "2.0");
    dom.set_attr(root, "IssueInstant", &format_instant(chrono::Utc::now()));
    if let Some(d) = destination {
        dom.set_attr(root, "Destination", d);
    }
    query_dash_p(dom, root, "saml:Issuer", issuer, None);
    id
}

pub struct AuthnRequest(pub SamlDoc);

impl AuthnRequest {
    pub fn new(issuer: &str, destination: &str, acs_url: &str, force_authn: bool) -> Self {
        let mut dom = Dom::new();
        let root = new_root(&mut dom, "samlp:AuthnRequest");
        stamp_common(&mut dom, root, issuer, Some(destination));
        dom.set_attr(root, "AssertionConsumerServiceURL", acs_url);
        dom.set_attr(root, "ProtocolBinding", "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST");
        if force_authn {
            dom.set_attr(root, "ForceAuthn", "true");
        }
        Self(SamlDoc { dom, root })
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, HubError> {
        Ok(Self(SamlDoc::parse(bytes)?))
    }

    pub fn acs_url(&self) -> Option<String> {
        self.0.dom.attr(self.0.root, "AssertionConsumerServiceURL").map(str::to_string)
    }

    pub fn name_id_policy_format(&self) -> Option<String> {
        query_value(&self.0.dom, self.0.root, "samlp:NameIDPolicy/@Format")
    }
}

pub struct Response(pub SamlDoc);

impl Response {
    pub fn new_success(issuer: &str, destination: &str, in_response_to: &str) -> Self {
        let mut dom = Dom::new();
        let root = new_root(&mut dom, "samlp:Response");
        stamp_common(&mut dom, root, issuer, Some(destination));
        dom.set_attr(root, "InResponseTo", in_response_to);
        let status = query_dash_p(&mut dom, root, "samlp:Status", "", None);
        query_dash_p(
            &mut dom,
            status,
            "samlp:StatusCode/@Value",
            "urn:oasis:names:tc:SAML:2.0:status:Success",
            None,
        );
        Self(SamlDoc { dom, root })
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, HubError> {
        Ok(Self(SamlDoc::parse(bytes)?))
    }

    pub fn status_code(&self) -> Option<String> {
        query_value(&self.0.dom, self.0.root, "samlp:Status/samlp:StatusCode/@Value")
    }

    pub fn is_success(&self) -> bool {
        self.status_code().as_deref() == Some("urn:oasis:names:tc:SAML:2.0:status:Success")
    }

    pub fn assertions(&self) -> Vec<NodeId> {
        query_multi(&self.0.dom, self.0.root, "saml:Assertion")
    }

    pub fn encrypted_assertions(&self) -> Vec<NodeId> {
        query_multi(&self.0.dom, self.0.root, "saml:EncryptedAssertion")
    }
}

/// Assertion-scoped accessors (spec §4.3 step 8, §4.6): these take an explicit
/// `(dom, assertion)` pair rather than hanging off `Response` so they work equally on
/// an assertion decrypted out-of-line from the wrapping `Response` document.
pub fn assertion_issuer(dom: &Dom, assertion: NodeId) -> Option<String> {
    query_value(dom, assertion, "saml:Issuer")
}

pub fn assertion_name_id(dom: &Dom, assertion: NodeId) -> Option<String> {
    query_value(dom, assertion, "saml:Subject/saml:NameID")
}

pub fn assertion_name_id_format(dom: &Dom, assertion: NodeId) -> Option<String> {
    query_value(dom, assertion, "saml:Subject/saml:NameID/@Format")
}

pub fn assertion_attribute_statement(dom: &Dom, assertion: NodeId) -> Option<NodeId> {
    query1(dom, assertion, "saml:AttributeStatement")
}

pub fn assertion_not_before(dom: &Dom, assertion: NodeId) -> Option<String> {
    query_value(dom, assertion, "saml:Conditions/@NotBefore")
}

pub fn assertion_not_on_or_after(dom: &Dom, assertion: NodeId) -> Option<String> {
    query_value(dom, assertion, "saml:Conditions/@NotOnOrAfter")
}

pub fn assertion_audience(dom: &Dom, assertion: NodeId) -> Option<String> {
    query_value(dom, assertion, "saml:Conditions/saml:AudienceRestriction/saml:Audience")
}

pub fn assertion_subject_confirmation_recipient(dom: &Dom, assertion: NodeId) -> Option<String> {
    query_value(
        dom,
        assertion,
        "saml:Subject/saml:SubjectConfirmation/saml:SubjectConfirmationData/@Recipient",
    )
}

pub fn assertion_subject_confirmation_in_response_to(dom: &Dom, assertion: NodeId) -> Option<String> {
    query_value(
        dom,
        assertion,
        "saml:Subject/saml:SubjectConfirmation/saml:SubjectConfirmationData/@InResponseTo",
    )
}

pub struct LogoutRequest(pub SamlDoc);

impl LogoutRequest {
    pub fn new(issuer: &str, destination: &str, name_id: &str) -> Self {
        let mut dom = Dom::new();
        let root = new_root(&mut dom, "samlp:LogoutRequest");
        stamp_common(&mut dom, root, issuer, Some(destination));
        query_dash_p(&mut dom, root, "saml:NameID", name_id, None);
        Self(SamlDoc { dom, root })
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, HubError> {
        Ok(Self(SamlDoc::parse(bytes)?))
    }

    pub fn name_id(&self) -> Option<String> {
        query_value(&self.0.dom, self.0.root, "saml:NameID")
    }

    pub fn session_index(&self) -> Option<String> {
        query_value(&self.0.dom, self.0.root, "samlp:SessionIndex")
    }
}

pub struct LogoutResponse(pub SamlDoc);

impl LogoutResponse {
    pub fn new_success(issuer: &str, destination: &str, in_response_to: &str) -> Self {
        let mut dom = Dom::new();
        let root = new_root(&mut dom, "samlp:LogoutResponse");
        stamp_common(&mut dom, root, issuer, Some(destination));
        dom.set_attr(root, "InResponseTo", in_response_to);
        let status = query_dash_p(&mut dom, root, "samlp:Status", "", None);
        query_dash_p(
            &mut dom,
            status,
            "samlp:StatusCode/@Value",
            "urn:oasis:names:tc:SAML:2.0:status:Success",
            None,
        );
        Self(SamlDoc { dom, root })
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, HubError> {
        Ok(Self(SamlDoc::parse(bytes)?))
    }

    pub fn status_code(&self) -> Option<String> {
        query_value(&self.0.dom, self.0.root, "samlp:Status/samlp:StatusCode/@Value")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authn_request_round_trips_core_fields() {
        let req = AuthnRequest::new("https://hub/md", "https://idp/sso", "https://sp/acs", true);
        let bytes = req.0.serialize();
        let parsed = AuthnRequest::parse(&bytes).unwrap();
        assert_eq!(parsed.0.issuer().as_deref(), Some("https://hub/md"));
        assert_eq!(parsed.0.destination().as_deref(), Some("https://idp/sso"));
        assert_eq!(parsed.acs_url().as_deref(), Some("https://sp/acs"));
    }

    #[test]
    fn response_success_status_detected() {
        let resp = Response::new_success("https://hub/md", "https://sp/acs", "_req1");
        assert!(resp.is_success());
        assert_eq!(resp.0.in_response_to().as_deref(), Some("_req1"));
    }
}
