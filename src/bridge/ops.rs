//! Inbound ledger operations and the typed request envelope they map to.
//!
//! Two operation kinds cross the bridge:
//! - `custom_json`, whose `json` field is a `[action, method, data]` array
//! - `transfer`, whose `amount` is `"<value> <asset>"`, e.g. `"1.000 HIVE"`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::BridgeError;

#[derive(Debug, Clone, Deserialize)]
pub struct CustomJsonOp {
    #[serde(default)]
    pub required_auths: Vec<String>,
    #[serde(default)]
    pub required_posting_auths: Vec<String>,
    pub id: String,
    pub json: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferOp {
    pub from: String,
    pub to: String,
    pub amount: String,
    #[serde(default)]
    pub memo: String,
}

/// An operation as delivered by the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum LedgerOp {
    CustomJson(CustomJsonOp),
    Transfer(TransferOp),
}

/// Inbound batch: the ledger block and its operations.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerBlock {
    pub block: u64,
    pub ops: Vec<LedgerOp>,
}

/// A fixed-precision asset amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Amount {
    /// Value in the smallest unit, `value * 10^precision`.
    pub units: u64,
    pub precision: u8,
    pub asset: String,
}

impl FromStr for Amount {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BridgeError::InvalidAmount(s.to_string());

        let mut parts = s.split_whitespace();
        let (Some(value), Some(asset), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        if !asset.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
            return Err(invalid());
        }

        let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
        let digits_only = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !digits_only(whole) || !digits_only(fraction) || fraction.len() > 18 {
            return Err(invalid());
        }

        let units = format!("{whole}{fraction}").parse::<u64>().map_err(|_| invalid())?;
        Ok(Amount {
            units,
            precision: fraction.len() as u8,
            asset: asset.to_string(),
        })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = self.precision as usize;
        let digits = format!("{:0>width$}", self.units, width = precision + 1);
        let (whole, fraction) = digits.split_at(digits.len() - precision);
        if precision == 0 {
            write!(f, "{whole} {}", self.asset)
        } else {
            write!(f, "{whole}.{fraction} {}", self.asset)
        }
    }
}

/// Validated request, keyed by what it asks the node to do.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BridgeRequest {
    Call {
        sender: String,
        action: String,
        method: String,
        data: Value,
    },
    Transfer {
        sender: String,
        recipient: String,
        amount: Amount,
        memo: String,
    },
}

impl BridgeRequest {
    /// Dispatch key: `action.method` for calls, `transfer` for transfers.
    pub fn key(&self) -> String {
        match self {
            BridgeRequest::Call { action, method, .. } => format!("{action}.{method}"),
            BridgeRequest::Transfer { .. } => "transfer".to_string(),
        }
    }

    pub fn sender(&self) -> &str {
        match self {
            BridgeRequest::Call { sender, .. } | BridgeRequest::Transfer { sender, .. } => sender,
        }
    }
}

impl TryFrom<LedgerOp> for BridgeRequest {
    type Error = BridgeError;

    fn try_from(op: LedgerOp) -> Result<Self, Self::Error> {
        match op {
            LedgerOp::CustomJson(op) => parse_custom_json(op),
            LedgerOp::Transfer(op) => parse_transfer(op),
        }
    }
}

fn parse_custom_json(op: CustomJsonOp) -> Result<BridgeRequest, BridgeError> {
    let sender = op
        .required_auths
        .first()
        .or_else(|| op.required_posting_auths.first())
        .cloned()
        .ok_or_else(|| BridgeError::InvalidOp(format!("custom_json {} has no signer", op.id)))?;

    let parsed: Value = serde_json::from_str(&op.json)
        .map_err(|e| BridgeError::InvalidOp(format!("custom_json {} payload is not JSON: {e}", op.id)))?;
    let Some([action, method, data]) = parsed.as_array().map(Vec::as_slice).and_then(|a| <&[Value; 3]>::try_from(a).ok()) else {
        return Err(BridgeError::InvalidOp(format!(
            "custom_json {} payload must be [action, method, data]",
            op.id
        )));
    };
    let (Some(action), Some(method)) = (non_empty_str(action), non_empty_str(method)) else {
        return Err(BridgeError::InvalidOp(format!(
            "custom_json {} action and method must be non-empty strings",
            op.id
        )));
    };

    Ok(BridgeRequest::Call {
        sender,
        action: action.to_string(),
        method: method.to_string(),
        data: data.clone(),
    })
}

fn parse_transfer(op: TransferOp) -> Result<BridgeRequest, BridgeError> {
    if op.from.is_empty() || op.to.is_empty() {
        return Err(BridgeError::InvalidOp("transfer needs both sender and recipient".into()));
    }
    let amount: Amount = op.amount.parse()?;
    Ok(BridgeRequest::Transfer {
        sender: op.from,
        recipient: op.to,
        amount,
        memo: op.memo,
    })
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

/// A request tagged with the ledger block it came from, ready to submit.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeEnvelope {
    pub source_block: u64,
    pub key: String,
    pub request: BridgeRequest,
}

impl BridgeEnvelope {
    pub fn new(source_block: u64, request: BridgeRequest) -> Self {
        Self {
            source_block,
            key: request.key(),
            request,
        }
    }

    /// Transaction payload for this envelope.
    pub fn to_payload(&self) -> Value {
        serde_json::json!({ "bridge": self })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom_json(json: &str) -> LedgerOp {
        LedgerOp::CustomJson(CustomJsonOp {
            required_auths: vec!["alice".into()],
            required_posting_auths: vec![],
            id: "hsc".into(),
            json: json.into(),
        })
    }

    #[test]
    fn custom_json_becomes_call() {
        let request = BridgeRequest::try_from(custom_json(r#"["token", "mint", {"qty": 5}]"#)).unwrap();
        assert_eq!(request.key(), "token.mint");
        assert_eq!(request.sender(), "alice");
        match request {
            BridgeRequest::Call { data, .. } => assert_eq!(data["qty"], 5),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn malformed_custom_json_rejected() {
        for json in [r#"["token", "mint"]"#, r#"{"action": "x"}"#, "not json", r#"["", "mint", 1]"#] {
            assert!(
                matches!(BridgeRequest::try_from(custom_json(json)), Err(BridgeError::InvalidOp(_))),
                "accepted {json}"
            );
        }
    }

    #[test]
    fn unsigned_custom_json_rejected() {
        let op = LedgerOp::CustomJson(CustomJsonOp {
            required_auths: vec![],
            required_posting_auths: vec![],
            id: "hsc".into(),
            json: r#"["a", "b", null]"#.into(),
        });
        assert!(BridgeRequest::try_from(op).is_err());
    }

    #[test]
    fn amount_parsing() {
        let amount: Amount = "1.000 HIVE".parse().unwrap();
        assert_eq!(amount.units, 1000);
        assert_eq!(amount.precision, 3);
        assert_eq!(amount.to_string(), "1.000 HIVE");
        assert_eq!("0.005 HBD".parse::<Amount>().unwrap().to_string(), "0.005 HBD");
        assert_eq!("42 HSC".parse::<Amount>().unwrap().units, 42);

        for bad in ["1.000", "HIVE 1.000", "1.0.0 HIVE", "-1 HIVE", "1 hive", "1.000 HIVE extra", ""] {
            assert!(bad.parse::<Amount>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn ledger_block_deserializes() {
        let block: LedgerBlock = serde_json::from_value(serde_json::json!({
            "block": 7,
            "ops": [
                {"type": "transfer", "value": {"from": "alice", "to": "bob", "amount": "2.500 HIVE"}},
                {"type": "custom_json", "value": {"required_auths": ["bob"], "id": "hsc", "json": "[\"a\",\"b\",1]"}}
            ]
        }))
        .unwrap();
        assert_eq!(block.ops.len(), 2);

        let envelope = BridgeEnvelope::new(block.block, BridgeRequest::try_from(block.ops[0].clone()).unwrap());
        assert_eq!(envelope.key, "transfer");
        assert_eq!(envelope.to_payload()["bridge"]["request"]["amount"]["units"], 2500);
    }
}
