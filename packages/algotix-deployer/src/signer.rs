//! Signer abstraction: local ed25519 key or a remote signing service.
//!
//! Both backends produce the node's signed-transaction form. `Local` signs
//! `"TX" || msgpack(txn)` in-process. `Remote` hands the transaction, with
//! its canonical encoding, to a signing service that returns signed bytes.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use ed25519_dalek::{Signer as _, SigningKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::Error;
use crate::ledger::address;
use crate::ledger::wire::EncodedTransaction;
use crate::ledger::{SignedTransaction, Transaction};

const SIGNER_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Signing backend for the deployer account.
pub enum DeployerSigner {
    Local {
        address: String,
        key: SigningKey,
    },

    /// Private key never leaves the signing service.
    Remote {
        address: String,
        url: String,
        http: reqwest::Client,
    },
}

#[derive(Serialize)]
struct SignRequest<'a> {
    signer: &'a str,
    transaction: &'a Transaction,
    /// Base64 canonical encoding; the bytes to sign are `"TX"` followed by it.
    encoded: String,
}

#[derive(Deserialize)]
struct SignResponse {
    signed_transaction: String,
}

impl DeployerSigner {
    /// Local signer from a signing key; the address is derived from it.
    pub fn from_signing_key(key: SigningKey) -> Self {
        let address = address::encode_address(&key.verifying_key().to_bytes());
        Self::Local { address, key }
    }

    /// Local signer from a base64 secret: a 32-byte seed, or the 64-byte
    /// seed‖public-key form wallets export.
    pub fn local(secret_b64: &str, expected_address: Option<&str>) -> Result<Self, Error> {
        let raw = B64
            .decode(secret_b64.trim())
            .map_err(|e| Error::InvalidConfiguration(format!("Invalid secret key base64: {e}")))?;
        if raw.len() != 32 && raw.len() != 64 {
            return Err(Error::InvalidConfiguration(format!(
                "Secret key must be 32 or 64 bytes, got {}",
                raw.len()
            )));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&raw[..32]);
        let signer = Self::from_signing_key(SigningKey::from_bytes(&seed));

        if let Some(expected) = expected_address {
            if expected != signer.address() {
                return Err(Error::InvalidConfiguration(format!(
                    "secret key belongs to {}, not {expected}",
                    signer.address()
                )));
            }
        }
        Ok(signer)
    }

    /// Remote signer for `address` at `url`.
    pub fn remote(address: &str, url: &str) -> Result<Self, Error> {
        address::validate_address(address)?;
        let http = reqwest::Client::builder()
            .timeout(SIGNER_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("HTTP client build failed: {e}")))?;
        Ok(Self::Remote {
            address: address.to_string(),
            url: url.to_string(),
            http,
        })
    }

    /// Pick the backend the configuration names. A local key wins.
    pub fn from_config(config: &crate::Config) -> Result<Self, Error> {
        let signer = match (&config.deployer_secret_key, &config.signer_url) {
            (Some(secret), _) => Self::local(secret, config.deployer_address.as_deref())?,
            (None, Some(url)) => {
                let address = config.deployer_address.as_deref().ok_or_else(|| {
                    Error::InvalidConfiguration("signer_url requires deployer_address".into())
                })?;
                Self::remote(address, url)?
            }
            (None, None) => {
                return Err(Error::InvalidConfiguration(
                    "configure deployer_secret_key or signer_url".into(),
                ))
            }
        };
        info!(address = signer.address(), backend = signer.backend(), "Loaded deployer signer");
        Ok(signer)
    }

    pub fn address(&self) -> &str {
        match self {
            Self::Local { address, .. } | Self::Remote { address, .. } => address,
        }
    }

    fn backend(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Remote { .. } => "remote",
        }
    }

    /// Sign `txn`. The sender must be this signer's account.
    pub async fn sign(&self, txn: &Transaction) -> Result<SignedTransaction, Error> {
        if txn.sender != self.address() {
            return Err(Error::InvalidConfiguration(format!(
                "cannot sign for {} with key of {}",
                txn.sender,
                self.address()
            )));
        }
        let encoded = EncodedTransaction::new(txn)?;
        match self {
            Self::Local { key, .. } => {
                let signature = key.sign(&encoded.signing_message());
                let blob = encoded.sign_with(&signature.to_bytes())?;
                debug!(kind = txn.kind.label(), tx_id = %encoded.id(), "Signed transaction locally");
                Ok(SignedTransaction::new(blob))
            }

            Self::Remote { address, url, http } => {
                let context = format!("POST {url}");
                let resp = http
                    .post(url)
                    .json(&SignRequest {
                        signer: address,
                        transaction: txn,
                        encoded: B64.encode(encoded.as_bytes()),
                    })
                    .send()
                    .await
                    .map_err(|e| Error::from_transport(e, &context))?;
                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(Error::from_status(status.as_u16(), &body, &context));
                }
                let signed: SignResponse = resp
                    .json()
                    .await
                    .map_err(|e| Error::Network(format!("{context}: malformed response: {e}")))?;
                let blob = B64.decode(signed.signed_transaction.trim()).map_err(|e| {
                    Error::Network(format!("{context}: signed transaction is not base64: {e}"))
                })?;
                debug!(kind = txn.kind.label(), tx_id = %encoded.id(), "Signed transaction remotely");
                Ok(SignedTransaction::new(blob))
            }
        }
    }
}

impl std::fmt::Debug for DeployerSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local { address, .. } => write!(f, "DeployerSigner::Local({address})"),
            Self::Remote { address, url, .. } => {
                write!(f, "DeployerSigner::Remote({address} via {url})")
            }
        }
    }
}
