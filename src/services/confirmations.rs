use std::sync::Arc;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};

use crate::settings::{ConfirmationProviderKind, Confirmations};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmationStatus {
    pub confirmations: u64,
    pub finalized: bool,
}

impl ConfirmationStatus {
    pub fn unconfirmed() -> Self {
        Self {
            confirmations: 0,
            finalized: false,
        }
    }
}

/// Answers how far a payment has progressed on chain.
#[async_trait]
pub trait ConfirmationProvider: Send + Sync + 'static {
    async fn confirmation_status(&self, tx_ref: &str) -> Result<ConfirmationStatus, anyhow::Error>;

    /// A payment reference for packages that have none yet. Only providers
    /// that do not observe real payments return one.
    fn synthesize_reference(&self) -> Option<String> {
        None
    }
}

/// A payment needs at least one confirmation whatever `required` says.
pub fn should_activate(status: &ConfirmationStatus, required: u64) -> bool {
    status.finalized || status.confirmations >= required.max(1)
}

pub fn provider_from_settings(
    settings: &Confirmations,
) -> Result<Arc<dyn ConfirmationProvider>, anyhow::Error> {
    match settings.provider {
        ConfirmationProviderKind::Simulated => Ok(Arc::new(SimulatedConfirmations::new(
            settings.success_probability,
            settings.required,
        ))),
        ConfirmationProviderKind::JsonRpc => {
            let url = settings
                .rpc_url
                .clone()
                .ok_or_else(|| anyhow!("confirmations.rpc_url is required for json_rpc."))?;

            Ok(Arc::new(JsonRpcConfirmations::new(url, settings.required)))
        }
    }
}

const REFERENCE_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const REFERENCE_LENGTH: usize = 26;

/// Demo provider: every check is a coin flip.
pub struct SimulatedConfirmations {
    probability: f64,
    required: u64,
}

impl SimulatedConfirmations {
    pub fn new(probability: f64, required: u64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            required,
        }
    }
}

#[async_trait]
impl ConfirmationProvider for SimulatedConfirmations {
    async fn confirmation_status(&self, tx_ref: &str) -> Result<ConfirmationStatus, anyhow::Error> {
        let draw: f64 = rand::thread_rng().gen();

        if draw < self.probability {
            log::debug!("Simulated confirmation for {}.", tx_ref);
            return Ok(ConfirmationStatus {
                confirmations: self.required,
                finalized: true,
            });
        }

        Ok(ConfirmationStatus::unconfirmed())
    }

    fn synthesize_reference(&self) -> Option<String> {
        let mut rng = rand::thread_rng();
        let body: String = (0..REFERENCE_LENGTH)
            .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
            .collect();

        Some(format!("0x{}", body))
    }
}

pub fn parse_quantity(value: &Value) -> Option<u64> {
    let text = value.as_str()?;
    let digits = text.strip_prefix("0x")?;

    u64::from_str_radix(digits, 16).ok()
}

/// Confirmation count for a receipt observed at chain head `head`. Reverted
/// and unmined transactions never count.
pub fn status_from_receipt(receipt: &Value, head: u64, required: u64) -> ConfirmationStatus {
    if receipt.is_null() {
        return ConfirmationStatus::unconfirmed();
    }

    if receipt.get("status").and_then(|s| s.as_str()) == Some("0x0") {
        return ConfirmationStatus::unconfirmed();
    }

    let block = match receipt.get("blockNumber").and_then(parse_quantity) {
        Some(block) if block <= head => block,
        _ => return ConfirmationStatus::unconfirmed(),
    };

    let confirmations = head - block + 1;

    ConfirmationStatus {
        confirmations,
        finalized: confirmations >= required,
    }
}

/// Ethereum-style JSON-RPC chain data.
pub struct JsonRpcConfirmations {
    url: String,
    required: u64,
    client: reqwest::Client,
}

impl JsonRpcConfirmations {
    pub fn new(url: String, required: u64) -> Self {
        Self {
            url,
            required,
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, anyhow::Error> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self.client.post(&self.url).json(&request).send().await?;
        if !response.status().is_success() {
            bail!("{} returned HTTP {}", method, response.status());
        }

        let mut body: Value = response.json().await?;
        if let Some(error) = body.get("error") {
            bail!("{} failed: {}", method, error);
        }

        Ok(body
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ConfirmationProvider for JsonRpcConfirmations {
    async fn confirmation_status(&self, tx_ref: &str) -> Result<ConfirmationStatus, anyhow::Error> {
        let receipt = self
            .call("eth_getTransactionReceipt", json!([tx_ref]))
            .await?;
        if receipt.is_null() {
            return Ok(ConfirmationStatus::unconfirmed());
        }

        let head = self.call("eth_blockNumber", json!([])).await?;
        let head = parse_quantity(&head).ok_or_else(|| anyhow!("Invalid block number: {}", head))?;

        Ok(status_from_receipt(&receipt, head, self.required))
    }
}
