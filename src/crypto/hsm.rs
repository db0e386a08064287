//! HSM RPC delegation (spec §4.2). Signing and decryption for keys configured as
//! `hsm:<label>:<endpoint>` are delegated to an external service rather than performed
//! with in-process key material.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::common::algo::Alg;
use crate::common::error::HubError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HsmOp {
    Sign,
    Decrypt,
}

impl HsmOp {
    fn as_str(self) -> &'static str {
        match self {
            HsmOp::Sign => "sign",
            HsmOp::Decrypt => "decrypt",
        }
    }
}

#[derive(Debug, Serialize)]
struct HsmRequest<'a> {
    op: &'a str,
    label: &'a str,
    alg: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct HsmResponse {
    result: String,
}

/// Delegates a single sign/decrypt operation to the HSM endpoint named in a
/// `hsm:<label>:<endpoint>` key reference. No local retry: a timeout or malformed
/// response surfaces as a `Transport` error like any other upstream failure.
#[async_trait]
pub trait HsmClient: Send + Sync {
    async fn call(
        &self,
        endpoint: &str,
        op: HsmOp,
        label: &str,
        alg: Alg,
        data: &[u8],
    ) -> Result<Vec<u8>, HubError>;
}

pub struct HttpHsmClient {
    http: reqwest::Client,
}

impl HttpHsmClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpHsmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HsmClient for HttpHsmClient {
    async fn call(
        &self,
        endpoint: &str,
        op: HsmOp,
        label: &str,
        alg: Alg,
        data: &[u8],
    ) -> Result<Vec<u8>, HubError> {
        let req = HsmRequest {
            op: op.as_str(),
            label,
            alg: alg.shorthand(),
            data: STANDARD.encode(data),
        };

        let resp = self
            .http
            .post(endpoint)
            .json(&req)
            .send()
            .await
            .map_err(|e| HubError::transport(format!("hsm rpc: {e}")))?;

        if !resp.status().is_success() {
            return Err(HubError::transport(format!(
                "hsm rpc returned {}",
                resp.status()
            )));
        }

        let body: HsmResponse = resp
            .json()
            .await
            .map_err(|e| HubError::transport(format!("hsm rpc decode: {e}")))?;
        STANDARD
            .decode(body.result)
            .map_err(|e| HubError::transport(format!("hsm rpc decode: {e}")))
    }
}
