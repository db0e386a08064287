//! `saml:EncryptedAssertion` generation and decryption (spec §4.2, §4.3): AES-256-GCM
//! content encryption under a per-message key, the key itself wrapped with RSA-OAEP for
//! the recipient.

use base64::{engine::general_purpose::STANDARD, Engine};
use rsa::RsaPublicKey;

use crate::common::algo::Alg;
use crate::common::error::HubError;
use crate::crypto::{self, Signer};
use crate::xml::querydashp::query_dash_p;
use crate::xml::xpath::query_value;
use crate::xml::{serialize, Dom, NodeId};

const XENC: &str = "http://www.w3.org/2001/04/xmlenc#";

/// Serialises `assertion`, seals it under a fresh AES-256-GCM key, wraps the key with
/// RSA-OAEP for `recipient`, and builds the `saml:EncryptedAssertion` wrapper in place
/// of `assertion` under `parent`.
pub fn encrypt_assertion(
    dom: &mut Dom,
    parent: NodeId,
    assertion: NodeId,
    recipient: &RsaPublicKey,
    oaep_digest: Alg,
) -> Result<NodeId, HubError> {
    dom.register_namespace("xenc", XENC);
    let plaintext = serialize(dom, assertion);
    let (key, frame) = crypto::aes_seal(&plaintext)?;
    let wrapped_key = crypto::encrypt_oaep(recipient, oaep_digest, &key)?;

    let wrapper = dom.create_element(None, "saml:EncryptedAssertion");
    dom.node_mut(wrapper).parent = Some(parent);
    let index = dom.children(parent).iter().position(|&c| c == assertion);
    dom.insert_child_at(parent, wrapper, index);
    dom.remove_child(parent, assertion);

    let enc_data = dom.create_element(Some(wrapper), "xenc:EncryptedData");
    dom.set_attr(enc_data, "Type", "http://www.w3.org/2001/04/xmlenc#Element");
    let enc_method = dom.create_element(Some(enc_data), "xenc:EncryptionMethod");
    dom.set_attr(enc_method, "Algorithm", "http://www.w3.org/2009/xmlenc11#aes256-gcm");

    let key_info = dom.create_element(Some(enc_data), "ds:KeyInfo");
    let enc_key = dom.create_element(Some(key_info), "xenc:EncryptedKey");
    let key_method = dom.create_element(Some(enc_key), "xenc:EncryptionMethod");
    dom.set_attr(
        key_method,
        "Algorithm",
        match oaep_digest {
            Alg::Sha1 => "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p",
            _ => "http://www.w3.org/2009/xmlenc11#rsa-oaep",
        },
    );
    query_dash_p(
        dom,
        enc_key,
        "xenc:CipherData/xenc:CipherValue",
        &STANDARD.encode(&wrapped_key),
        None,
    );

    query_dash_p(
        dom,
        enc_data,
        "xenc:CipherData/xenc:CipherValue",
        &STANDARD.encode(&frame),
        None,
    );

    Ok(wrapper)
}

/// Decrypts an `saml:EncryptedAssertion` previously produced by [`encrypt_assertion`],
/// returning the plaintext `saml:Assertion` bytes.
pub async fn decrypt_assertion(dom: &Dom, wrapper: NodeId, signer: &Signer) -> Result<Vec<u8>, HubError> {
    let wrapped_key_b64 = query_value(dom, wrapper, "ds:KeyInfo/xenc:EncryptedKey/xenc:CipherData/xenc:CipherValue")
        .ok_or_else(|| HubError::crypto("decrypt"))?;
    let wrapped_key = STANDARD
        .decode(wrapped_key_b64)
        .map_err(|_| HubError::crypto("decrypt"))?;

    let key_method = query_value(dom, wrapper, "ds:KeyInfo/xenc:EncryptedKey/xenc:EncryptionMethod/@Algorithm")
        .unwrap_or_default();
    let oaep_digest = if key_method.contains("rsa-oaep-mgf1p") {
        Alg::Sha1
    } else {
        Alg::Sha256
    };

    let content_key = signer.decrypt_oaep(oaep_digest, &wrapped_key).await?;

    let frame_b64 = query_value(dom, wrapper, "xenc:CipherData/xenc:CipherValue")
        .ok_or_else(|| HubError::crypto("decrypt"))?;
    let frame = STANDARD.decode(frame_b64).map_err(|_| HubError::crypto("decrypt"))?;

    crypto::aes_open(&content_key, &frame)
}
