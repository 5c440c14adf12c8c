//! Caller-facing payout result, also the payload stored in the ledger.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, PayoutError, PayoutResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutResponse {
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_sats: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_sats: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Amount the failed request tried to pay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_sats: Option<u64>,

    /// Broadcast attempts made; 0 when the pipeline stopped before broadcasting.
    pub attempt_count: u32,

    /// Broadcast succeeded but no confirmation row was written for the txid.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tracking_failed: bool,
}

impl PayoutResponse {
    pub fn submitted(
        txid: String,
        fee_sats: u64,
        change_sats: u64,
        input_count: usize,
        output_count: usize,
        attempt_count: u32,
    ) -> Self {
        Self {
            ok: true,
            txid: Some(txid),
            fee_sats: Some(fee_sats),
            change_sats: Some(change_sats),
            input_count: Some(input_count),
            output_count: Some(output_count),
            error: None,
            message: None,
            requested_sats: None,
            attempt_count,
            tracking_failed: false,
        }
    }

    pub fn failed(
        err: &PayoutError,
        attempt_count: u32,
        input_count: Option<usize>,
        requested_sats: u64,
    ) -> Self {
        Self {
            ok: false,
            txid: None,
            fee_sats: None,
            change_sats: None,
            input_count,
            output_count: None,
            error: Some(err.kind()),
            message: Some(err.to_string()),
            requested_sats: Some(requested_sats),
            attempt_count,
            tracking_failed: false,
        }
    }

    pub fn to_json(&self) -> PayoutResult<String> {
        serde_json::to_string(self).map_err(|e| {
            PayoutError::InternalInconsistency(format!("response encoding failed: {}", e))
        })
    }

    pub fn from_json(payload: &str) -> PayoutResult<Self> {
        serde_json::from_str(payload).map_err(|e| {
            PayoutError::InternalInconsistency(format!("stored result unreadable: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_shape() {
        let json = PayoutResponse::submitted("ab".repeat(32), 236, 0, 1, 1, 1)
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(value["feeSats"], 236);
        assert_eq!(value["attemptCount"], 1);
        assert!(value.get("error").is_none());
        assert!(value.get("trackingFailed").is_none());
    }

    #[test]
    fn test_tracking_failure_is_flagged() {
        let mut response = PayoutResponse::submitted("ab".repeat(32), 236, 0, 1, 1, 1);
        response.tracking_failed = true;
        let json = response.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["trackingFailed"], true);
        assert!(PayoutResponse::from_json(&json).unwrap().tracking_failed);
    }

    #[test]
    fn test_failure_shape() {
        let err = PayoutError::InsufficientFunds {
            available_sats: 100,
            required_sats: 900,
        };
        let json = PayoutResponse::failed(&err, 0, None, 800).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"], "InsufficientFunds");
        assert_eq!(value["requestedSats"], 800);
        assert_eq!(value["attemptCount"], 0);
        assert!(value.get("txid").is_none());
        assert!(value.get("inputCount").is_none());

        let back = PayoutResponse::from_json(&json).unwrap();
        assert_eq!(back.error, Some(ErrorKind::InsufficientFunds));
    }
}
