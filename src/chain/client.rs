//! Block-explorer REST client with timeout and failover handling.
//!
//! # Responsibilities
//! - Fetch address UTXOs, broadcast raw transactions, query tx status
//! - Bound every request with a deadline
//! - Fail over to secondary endpoints on transport errors
//! - Turn upstream rejections into typed [`RejectReason`]s

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

use crate::chain::provider::ChainProvider;
use crate::chain::types::{
    BroadcastReceipt, ProviderConfig, ProviderError, ProviderResult, RejectReason, TxStatus,
    UnspentOutput,
};

/// UTXO entry as returned by explorers. Field names vary between Esplora-style
/// and indexer-style APIs.
#[derive(Debug, Deserialize)]
struct WireUtxo {
    txid: String,
    #[serde(alias = "outputIndex", alias = "output_index")]
    vout: u32,
    #[serde(alias = "satoshis", alias = "valueSats", alias = "value_sats")]
    value: u64,
    #[serde(default, alias = "scriptPubKey", alias = "scriptpubkey", alias = "script")]
    script_pubkey: String,
    #[serde(default, alias = "confs")]
    confirmations: Option<u32>,
    #[serde(default)]
    status: Option<TxStatus>,
}

impl From<WireUtxo> for UnspentOutput {
    fn from(w: WireUtxo) -> Self {
        let confirmations = match (w.confirmations, w.status) {
            (Some(c), _) => c,
            (None, Some(s)) => u32::try_from(s.confirmations).unwrap_or(u32::MAX),
            (None, None) => 0,
        };
        Self {
            txid: w.txid.to_ascii_lowercase(),
            output_index: w.vout,
            value_sats: w.value,
            script_pubkey: w.script_pubkey,
            confirmations,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireBroadcast {
    #[serde(alias = "txId", alias = "result")]
    txid: String,
    #[serde(default, alias = "alreadyKnown")]
    already_known: bool,
}

/// Explorer client implementing [`ChainProvider`].
#[derive(Clone)]
pub struct ExplorerClient {
    http: reqwest::Client,
    /// Primary endpoint followed by failovers.
    endpoints: Vec<Url>,
    config: ProviderConfig,
    timeout_duration: Duration,
}

impl ExplorerClient {
    /// Create a new explorer client.
    ///
    /// Fails only if the primary URL is invalid or the HTTP client cannot be
    /// built; invalid failover URLs are skipped with a warning.
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        let timeout_duration = Duration::from_millis(config.timeout_ms);
        let mut endpoints = Vec::new();

        let primary: Url = config.base_url.parse().map_err(|e| {
            ProviderError::Unavailable(format!("Invalid provider URL '{}': {}", config.base_url, e))
        })?;
        endpoints.push(primary);

        for url_str in &config.failover_urls {
            match url_str.parse::<Url>() {
                Ok(url) => endpoints.push(url),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover provider URL"),
            }
        }

        let http = reqwest::Client::builder()
            .timeout(timeout_duration)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("HTTP client init failed: {}", e)))?;

        tracing::info!(
            base_url = %config.base_url,
            failovers = endpoints.len() - 1,
            timeout_ms = config.timeout_ms,
            "Explorer client initialized"
        );

        Ok(Self {
            http,
            endpoints,
            config,
            timeout_duration,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Append `segments` to `base`, percent-encoding each one so caller data
    /// cannot add path levels or a query.
    fn endpoint(base: &Url, segments: &[&str]) -> ProviderResult<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Unavailable(format!("Provider URL '{}' cannot take a path", base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET `segments` on each endpoint in turn until one answers with success.
    async fn get_json<T>(&self, segments: &[&str]) -> ProviderResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let path = segments.join("/");
        let mut last_error = ProviderError::Unavailable("All providers failed".to_string());

        for (i, base) in self.endpoints.iter().enumerate() {
            let url = Self::endpoint(base, segments)?;
            let fut = self.http.get(url).send();
            let response = match timeout(self.timeout_duration, fut).await {
                Ok(Ok(r)) => r,
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, error = %e, "Provider request failed, trying next");
                    last_error = map_transport_error(e, self.config.timeout_ms);
                    continue;
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, "Provider timeout, trying next");
                    last_error = ProviderError::Timeout(self.config.timeout_ms);
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                tracing::warn!(provider_idx = i, status = %status, path = %path, "Provider returned non-success");
                last_error = if status == StatusCode::NOT_FOUND {
                    ProviderError::Unavailable(format!("{} not found", path))
                } else {
                    ProviderError::Unavailable(format!("HTTP {} for {}", status, path))
                };
                continue;
            }

            return response
                .json::<T>()
                .await
                .map_err(|e| ProviderError::Malformed(e.to_string()));
        }

        Err(last_error)
    }
}

fn map_transport_error(e: reqwest::Error, timeout_ms: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_ms)
    } else {
        ProviderError::Unavailable(e.to_string())
    }
}

fn parse_broadcast_body(body: &str) -> ProviderResult<BroadcastReceipt> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        let wire: WireBroadcast =
            serde_json::from_str(trimmed).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(BroadcastReceipt {
            txid: wire.txid.to_ascii_lowercase(),
            already_known: wire.already_known,
        })
    } else if trimmed.is_empty() {
        Err(ProviderError::Malformed("empty broadcast response".to_string()))
    } else {
        Ok(BroadcastReceipt {
            txid: trimmed.trim_matches('"').to_ascii_lowercase(),
            already_known: false,
        })
    }
}

#[async_trait]
impl ChainProvider for ExplorerClient {
    async fn fetch_address_utxos(&self, address: &str) -> ProviderResult<Vec<UnspentOutput>> {
        let wire: Vec<WireUtxo> = self.get_json(&["address", address, "utxo"]).await?;
        Ok(wire.into_iter().map(UnspentOutput::from).collect())
    }

    async fn broadcast_raw_transaction(&self, raw_hex: &str) -> ProviderResult<BroadcastReceipt> {
        let mut last_error = ProviderError::Unavailable("All providers failed".to_string());

        for (i, base) in self.endpoints.iter().enumerate() {
            let url = Self::endpoint(base, &["tx"])?;
            let fut = self
                .http
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .body(raw_hex.to_string())
                .send();

            let response = match timeout(self.timeout_duration, fut).await {
                Ok(Ok(r)) => r,
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, error = %e, "Broadcast transport error, trying next");
                    last_error = map_transport_error(e, self.config.timeout_ms);
                    continue;
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, "Broadcast timeout, trying next");
                    last_error = ProviderError::Timeout(self.config.timeout_ms);
                    continue;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| ProviderError::Malformed(e.to_string()))?;

            if !status.is_success() {
                let reason = RejectReason::classify(&body);
                // An unexplained server error says nothing about the transaction.
                if status.is_server_error() && reason == RejectReason::Other {
                    tracing::warn!(provider_idx = i, status = %status, "Broadcast endpoint failing, trying next");
                    last_error = ProviderError::Unavailable(format!("HTTP {} on broadcast", status));
                    continue;
                }
                tracing::warn!(provider_idx = i, status = %status, ?reason, "Broadcast rejected");
                return Err(ProviderError::Rejected {
                    reason,
                    message: body.trim().to_string(),
                });
            }

            return parse_broadcast_body(&body);
        }

        Err(last_error)
    }

    async fn query_tx_status(&self, txid: &str) -> ProviderResult<TxStatus> {
        self.get_json(&["tx", txid, "status"]).await
    }
}

impl std::fmt::Debug for ExplorerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplorerClient")
            .field("base_url", &self.config.base_url)
            .field("failovers", &(self.endpoints.len() - 1))
            .field("timeout_ms", &self.config.timeout_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ProviderConfig {
        ProviderConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            failover_urls: Vec::new(),
            timeout_ms: 500,
        }
    }

    #[test]
    fn test_client_creation() {
        let client = ExplorerClient::new(test_config());
        assert!(client.is_ok());
    }

    #[test]
    fn test_invalid_primary_url() {
        let mut config = test_config();
        config.base_url = "not a url".to_string();
        let err = ExplorerClient::new(config).unwrap_err();
        assert!(err.to_string().contains("Invalid provider URL"));
    }

    #[test]
    fn test_invalid_failover_is_skipped() {
        let mut config = test_config();
        config.failover_urls.push("::bad::".to_string());
        config.failover_urls.push("http://127.0.0.1:2".to_string());
        let client = ExplorerClient::new(config).unwrap();
        assert_eq!(client.endpoints.len(), 2);
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let base: Url = "http://127.0.0.1:1/api/".parse().unwrap();
        let url = ExplorerClient::endpoint(&base, &["address", "a/../b?c#d", "utxo"]).unwrap();
        assert_eq!(url.path(), "/api/address/a%2F..%2Fb%3Fc%23d/utxo");
        assert_eq!(url.query(), None);

        let bare: Url = "http://127.0.0.1:1".parse().unwrap();
        let url = ExplorerClient::endpoint(&bare, &["tx"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:1/tx");
    }

    #[test]
    fn test_wire_utxo_shapes() {
        let esplora = r#"{"txid":"AA","vout":1,"value":5000,"status":{"confirmed":true,"block_height":5}}"#;
        let u: UnspentOutput = serde_json::from_str::<WireUtxo>(esplora).unwrap().into();
        assert_eq!(u.txid, "aa");
        assert_eq!(u.output_index, 1);
        assert_eq!(u.value_sats, 5000);
        assert_eq!(u.confirmations, 1);

        let indexer = r#"{"txid":"bb","outputIndex":0,"satoshis":700,"scriptPubKey":"76a9","confs":12}"#;
        let u: UnspentOutput = serde_json::from_str::<WireUtxo>(indexer).unwrap().into();
        assert_eq!(u.value_sats, 700);
        assert_eq!(u.script_pubkey, "76a9");
        assert_eq!(u.confirmations, 12);
    }

    #[test]
    fn test_broadcast_body_forms() {
        let r = parse_broadcast_body("ABCDEF\n").unwrap();
        assert_eq!(r.txid, "abcdef");
        assert!(!r.already_known);

        let r = parse_broadcast_body(r#"{"txid":"ff","alreadyKnown":true}"#).unwrap();
        assert_eq!(r.txid, "ff");
        assert!(r.already_known);

        assert!(parse_broadcast_body("   ").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_provider_fails() {
        let mut config = test_config();
        config.failover_urls.push("http://127.0.0.1:2".to_string());
        let client = ExplorerClient::new(config).unwrap();

        let result = client.query_tx_status(&"00".repeat(32)).await;
        let err = result.unwrap_err();
        assert!(err.is_retryable());
    }
}
