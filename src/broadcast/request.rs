//! Funding request schema.

use serde::{Deserialize, Serialize};

use crate::error::{PayoutError, PayoutResult};
use crate::idempotency::hash_request;

/// Longest pool reference accepted.
pub const MAX_POOL_REF_LEN: usize = 128;

/// A request to pay `amount_sats` from `source_address` to
/// `destination_address`. Change returns to the source address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FundingRequest {
    pub source_address: String,
    pub destination_address: String,
    pub amount_sats: u64,
    pub fee_rate_sats_per_byte: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_ref: Option<String>,
}

impl FundingRequest {
    /// Parse a JSON body. Unknown fields are rejected.
    pub fn from_json(body: &str) -> PayoutResult<Self> {
        serde_json::from_str(body)
            .map_err(|e| PayoutError::InvalidRequest(format!("malformed request body: {}", e)))
    }

    /// Check field-level constraints. Dust and funding checks belong to
    /// selection.
    pub fn validate(&self) -> PayoutResult<()> {
        if self.source_address.trim().is_empty() {
            return Err(PayoutError::InvalidRequest("sourceAddress is required".to_string()));
        }
        if self.destination_address.trim().is_empty() {
            return Err(PayoutError::InvalidRequest(
                "destinationAddress is required".to_string(),
            ));
        }
        if self.amount_sats == 0 {
            return Err(PayoutError::InvalidRequest("amountSats must be > 0".to_string()));
        }
        if !self.fee_rate_sats_per_byte.is_finite() || self.fee_rate_sats_per_byte <= 0.0 {
            return Err(PayoutError::InvalidRequest(
                "feeRateSatsPerByte must be a positive number".to_string(),
            ));
        }
        if let Some(pool_ref) = &self.pool_ref {
            if pool_ref.len() > MAX_POOL_REF_LEN {
                return Err(PayoutError::InvalidRequest(format!(
                    "poolRef longer than {} bytes",
                    MAX_POOL_REF_LEN
                )));
            }
        }
        Ok(())
    }

    /// Canonical form: trimmed addresses, trimmed pool ref, blank pool ref
    /// dropped.
    pub fn normalized(&self) -> Self {
        Self {
            source_address: self.source_address.trim().to_string(),
            destination_address: self.destination_address.trim().to_string(),
            amount_sats: self.amount_sats,
            fee_rate_sats_per_byte: self.fee_rate_sats_per_byte,
            pool_ref: self
                .pool_ref
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
        }
    }

    /// Hash of the canonical JSON encoding of the normalized request.
    pub fn request_hash(&self) -> PayoutResult<String> {
        let canonical = serde_json::to_vec(&self.normalized()).map_err(|e| {
            PayoutError::InternalInconsistency(format!("request encoding failed: {}", e))
        })?;
        Ok(hash_request(&canonical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> FundingRequest {
        FundingRequest {
            source_address: "bc1qsource".into(),
            destination_address: "bc1qdest".into(),
            amount_sats: 10_000,
            fee_rate_sats_per_byte: 2.0,
            pool_ref: Some("pool-7".into()),
        }
    }

    #[test]
    fn test_parse_camel_case() {
        let req = FundingRequest::from_json(
            r#"{"sourceAddress":"a","destinationAddress":"b","amountSats":1000,"feeRateSatsPerByte":1.5}"#,
        )
        .unwrap();
        assert_eq!(req.amount_sats, 1000);
        assert_eq!(req.pool_ref, None);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = FundingRequest::from_json(
            r#"{"sourceAddress":"a","destinationAddress":"b","amountSats":1000,"feeRateSatsPerByte":1,"memo":"x"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PayoutError::InvalidRequest(_)));
    }

    #[test]
    fn test_validate() {
        assert!(request().validate().is_ok());

        let mut bad = request();
        bad.amount_sats = 0;
        assert!(bad.validate().is_err());

        let mut bad = request();
        bad.fee_rate_sats_per_byte = f64::NAN;
        assert!(bad.validate().is_err());

        let mut bad = request();
        bad.destination_address = "   ".into();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_hash_ignores_whitespace_only_differences() {
        let mut padded = request();
        padded.source_address = "  bc1qsource ".into();
        padded.pool_ref = Some(" pool-7\n".into());
        assert_eq!(padded.request_hash().unwrap(), request().request_hash().unwrap());

        let mut other = request();
        other.amount_sats += 1;
        assert_ne!(other.request_hash().unwrap(), request().request_hash().unwrap());
    }

    #[test]
    fn test_blank_pool_ref_normalizes_to_none() {
        let mut req = request();
        req.pool_ref = Some("  ".into());
        assert_eq!(req.normalized().pool_ref, None);
    }
}
