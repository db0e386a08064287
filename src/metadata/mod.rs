//! Metadata resolver (spec §4.4, component C4): four disjoint named sets — Hub,
//! Internal, ExternalIDP, ExternalSP — each with a "reverse partner" set used to decide
//! whether a hub-mediated flow between two entities is federation-authorized.

pub mod refresh;

use rsa::RsaPublicKey;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::sync::Arc;

use crate::common::error::HubError;
use crate::crypto::keys::public_key_from_cert_pem;
use crate::xml::xpath::{query_multi, query_value};
use crate::xml::{parse, Dom, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetName {
    Hub,
    Internal,
    ExternalIdp,
    ExternalSp,
}

impl SetName {
    /// The set whose entities this set's entities are allowed to talk to (spec §4.4):
    /// `Internal` IdPs and SPs talk amongst themselves via the hub; `ExternalIdp` only
    /// ever pairs with `ExternalSp` and vice versa (Birk/Krib mirroring, spec §4.7).
    pub fn reverse_partner(self) -> SetName {
        match self {
            SetName::Hub => SetName::Hub,
            SetName::Internal => SetName::Internal,
            SetName::ExternalIdp => SetName::ExternalSp,
            SetName::ExternalSp => SetName::ExternalIdp,
        }
    }
}

/// A single `EntityDescriptor`'s data the hub actually consults: identity, signing
/// certificates (first match wins during rollover), and the role-specific endpoints.
#[derive(Debug, Clone)]
pub struct Entity {
    pub entity_id: String,
    pub sha1_hash: String,
    pub certs: Vec<RsaPublicKey>,
    pub sso_endpoint: Option<String>,
    pub acs_endpoint: Option<String>,
    pub slo_endpoint: Option<String>,
    pub name_id_formats: Vec<String>,
    /// The `wayf:feds` extension (spec §4.4): the federations this entity participates
    /// in. Empty means the entity participates in no federation and never intersects.
    pub feds: Vec<String>,
    /// The `wayf:persistentEntityID` extension (spec §4.6 step 5), if the entity
    /// publishes one in place of its own `entityID` for EPTID derivation.
    pub persistent_entity_id: Option<String>,
}

impl Entity {
    /// The `persistentEntityID` this entity's metadata designates for EPTID derivation,
    /// falling back to its real `entityID` when no extension is present (spec §4.6).
    pub fn persistent_entity_id(&self) -> &str {
        self.persistent_entity_id.as_deref().unwrap_or(&self.entity_id)
    }
}

fn sha1_hex(entity_id: &str) -> String {
    hex::encode(Sha1::digest(entity_id.as_bytes()))
}

/// Normalises a federation label (spec §4.4): whitespace-trimmed, any character outside
/// `[A-Za-z0-9._-]` replaced by a neutral sentinel so cosmetic encoding differences
/// between feeds don't defeat the intersection check.
fn normalize_fed(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect()
}

fn parse_feds(dom: &Dom, descriptor: NodeId) -> Vec<String> {
    query_value(dom, descriptor, "md:Extensions/wayf:feds")
        .map(|raw| raw.split_whitespace().map(normalize_fed).collect())
        .unwrap_or_default()
}

/// The MDQ federation-intersection rule (spec §4.4): two entities may be mediated
/// through the hub iff they share at least one federation label.
pub fn feds_intersect(a: &[String], b: &[String]) -> bool {
    a.iter().any(|fed| b.contains(fed))
}

fn entity_from_descriptor(dom: &Dom, descriptor: NodeId) -> Option<Entity> {
    let entity_id = dom.attr(descriptor, "entityID")?.to_string();
    let sha1_hash = sha1_hex(&entity_id);

    let certs = query_multi(
        dom,
        descriptor,
        "md:IDPSSODescriptor/md:KeyDescriptor/ds:KeyInfo/ds:X509Data/ds:X509Certificate",
    )
    .into_iter()
    .chain(query_multi(
        dom,
        descriptor,
        "md:SPSSODescriptor/md:KeyDescriptor/ds:KeyInfo/ds:X509Data/ds:X509Certificate",
    ))
    .filter_map(|n| {
        let b64 = dom.text_content(n);
        let der = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64.trim()).ok()?;
        let pem = pem::Pem::new("CERTIFICATE", der);
        public_key_from_cert_pem(&pem::encode(&pem)).ok()
    })
    .collect();

    Some(Entity {
        entity_id,
        sha1_hash,
        certs,
        sso_endpoint: query_value(
            dom,
            descriptor,
            "md:IDPSSODescriptor/md:SingleSignOnService/@Location",
        ),
        acs_endpoint: query_value(
            dom,
            descriptor,
            "md:SPSSODescriptor/md:AssertionConsumerService/@Location",
        ),
        slo_endpoint: query_value(dom, descriptor, "md:IDPSSODescriptor/md:SingleLogoutService/@Location")
            .or_else(|| query_value(dom, descriptor, "md:SPSSODescriptor/md:SingleLogoutService/@Location")),
        name_id_formats: query_multi(dom, descriptor, "md:IDPSSODescriptor/md:NameIDFormat")
            .into_iter()
            .map(|n| dom.text_content(n))
            .collect(),
        feds: parse_feds(dom, descriptor),
        persistent_entity_id: query_value(dom, descriptor, "md:Extensions/wayf:persistentEntityID"),
    })
}

/// Renders an `Entity` back into a minimal `md:EntityDescriptor` document, for the MDQ
/// route (spec §6): the hub only ever re-serves what it already parsed, not the
/// original feed's raw bytes, so only the fields `Entity` actually models are emitted.
pub fn render_entity_descriptor(entity: &Entity) -> Vec<u8> {
    let mut dom = Dom::new();
    dom.register_namespace("md", "urn:oasis:names:tc:SAML:2.0:metadata");
    dom.register_namespace("ds", "http://www.w3.org/2000/09/xmldsig#");
    dom.register_namespace("wayf", "http://wayf.dk/2014/08/wayf");
    let root = dom.create_element(None, "md:EntityDescriptor");
    dom.root = Some(root);
    dom.set_attr(root, "entityID", &entity.entity_id);

    if !entity.feds.is_empty() || entity.persistent_entity_id.is_some() {
        let extensions = dom.create_element(Some(root), "md:Extensions");
        if !entity.feds.is_empty() {
            let feds = dom.create_element(Some(extensions), "wayf:feds");
            dom.set_text(feds, &entity.feds.join(" "));
        }
        if let Some(peid) = &entity.persistent_entity_id {
            let e = dom.create_element(Some(extensions), "wayf:persistentEntityID");
            dom.set_text(e, peid);
        }
    }

    if entity.sso_endpoint.is_some() || entity.slo_endpoint.is_some() {
        let idp = dom.create_element(Some(root), "md:IDPSSODescriptor");
        dom.set_attr(idp, "protocolSupportEnumeration", "urn:oasis:names:tc:SAML:2.0:protocol");
        add_key_descriptors(&mut dom, idp, &entity.certs);
        if let Some(slo) = &entity.slo_endpoint {
            let e = dom.create_element(Some(idp), "md:SingleLogoutService");
            dom.set_attr(e, "Location", slo);
        }
        for format in &entity.name_id_formats {
            let e = dom.create_element(Some(idp), "md:NameIDFormat");
            dom.set_text(e, format);
        }
        if let Some(sso) = &entity.sso_endpoint {
            let e = dom.create_element(Some(idp), "md:SingleSignOnService");
            dom.set_attr(e, "Location", sso);
        }
    }
    if entity.acs_endpoint.is_some() {
        let sp = dom.create_element(Some(root), "md:SPSSODescriptor");
        dom.set_attr(sp, "protocolSupportEnumeration", "urn:oasis:names:tc:SAML:2.0:protocol");
        add_key_descriptors(&mut dom, sp, &entity.certs);
        if let Some(acs) = &entity.acs_endpoint {
            let e = dom.create_element(Some(sp), "md:AssertionConsumerService");
            dom.set_attr(e, "Location", acs);
            dom.set_attr(e, "index", "0");
        }
    }

    crate::xml::serialize(&dom, root)
}

fn add_key_descriptors(dom: &mut Dom, parent: NodeId, certs: &[RsaPublicKey]) {
    use rsa::pkcs1::EncodeRsaPublicKey;
    for cert in certs {
        let Ok(der) = cert.to_pkcs1_der() else { continue };
        let kd = dom.create_element(Some(parent), "md:KeyDescriptor");
        let key_info = dom.create_element(Some(kd), "ds:KeyInfo");
        let x509_data = dom.create_element(Some(key_info), "ds:X509Data");
        let x509_cert = dom.create_element(Some(x509_data), "ds:X509Certificate");
        dom.set_text(x509_cert, &base64::Engine::encode(&base64::engine::general_purpose::STANDARD, der.as_bytes()));
    }
}

/// One loaded `EntitiesDescriptor` feed: entities indexed by entityID and by SHA-1 hash
/// (spec §4.4 — the hash lets `/mdq/<set>/<hash>` resolve without leaking entityIDs in
/// the common case where they already embed meaningful strings).
#[derive(Debug, Default, Clone)]
pub struct MetadataSet {
    by_entity_id: HashMap<String, Arc<Entity>>,
    by_hash: HashMap<String, Arc<Entity>>,
}

impl MetadataSet {
    pub fn parse(xml: &[u8]) -> Result<Self, HubError> {
        let dom = parse(xml)?;
        let root = dom.root.ok_or_else(|| HubError::malformed("empty metadata document"))?;

        let descriptors = if dom.tag_of(root) == Some("md:EntitiesDescriptor") {
            query_multi(&dom, root, "md:EntityDescriptor")
        } else {
            vec![root]
        };

        let mut set = MetadataSet::default();
        for d in descriptors {
            if let Some(entity) = entity_from_descriptor(&dom, d) {
                let arc = Arc::new(entity);
                set.by_entity_id.insert(arc.entity_id.clone(), arc.clone());
                set.by_hash.insert(arc.sha1_hash.clone(), arc);
            }
        }
        Ok(set)
    }

    pub fn by_entity_id(&self, entity_id: &str) -> Option<Arc<Entity>> {
        self.by_entity_id.get(entity_id).cloned()
    }

    pub fn by_hash(&self, hash: &str) -> Option<Arc<Entity>> {
        self.by_hash.get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_entity_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity_id.is_empty()
    }
}

/// The four named sets, held behind a lock so [`refresh`] can atomically swap one in
/// place without readers observing a half-loaded set (spec §4.4/§5).
pub struct MetadataStore {
    sets: parking_lot::RwLock<HashMap<SetName, Arc<MetadataSet>>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self {
            sets: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    pub fn install(&self, name: SetName, set: MetadataSet) {
        self.sets.write().insert(name, Arc::new(set));
    }

    pub fn get(&self, name: SetName) -> Option<Arc<MetadataSet>> {
        self.sets.read().get(&name).cloned()
    }

    pub fn find_by_entity_id(&self, name: SetName, entity_id: &str) -> Result<Arc<Entity>, HubError> {
        self.get(name)
            .and_then(|s| s.by_entity_id(entity_id))
            .ok_or_else(|| HubError::metadata_not_found(entity_id.to_string()))
    }

    pub fn find_by_hash(&self, name: SetName, hash: &str) -> Result<Arc<Entity>, HubError> {
        self.get(name)
            .and_then(|s| s.by_hash(hash))
            .ok_or_else(|| HubError::metadata_not_found(hash.to_string()))
    }

    /// Federation-intersection gate (spec §4.4): an SP in `sp_set` may only reach an IdP
    /// in `idp_set` if the IdP's set is the SP's set's reverse partner, or both are in
    /// the hub's own `Internal` set (the hub mediates internal-internal flows freely).
    pub fn authorized(&self, idp_set: SetName, sp_set: SetName) -> bool {
        sp_set.reverse_partner() == idp_set || (idp_set == SetName::Internal && sp_set == SetName::Internal)
    }
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new()
    }
}
