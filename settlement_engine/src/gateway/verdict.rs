//! Signal normalization. Every gateway signal, whichever channel it arrives on, becomes one [`Verdict`].
use lms_common::Money;
use log::{debug, warn};
use serde::Serialize;

use crate::{
    db_types::{Evidence, MerchantOrderId, NewSignal, SignalChannel, VerdictOutcome},
    gateway::signals::SignalFields,
    traits::SettlementDetails,
};

const SUCCESS_CODES: [&str; 4] = ["CAPTURED", "PAID", "SUCCESS", "APPROVED"];
const FAILURE_CODES: [&str; 7] = ["DECLINED", "VOIDED", "FAILED", "REJECTED", "CANCELLED", "EXPIRED", "REFUNDED"];
const PENDING_CODES: [&str; 3] = ["PENDING", "PROCESSING", "INITIATED"];

pub const DEFAULT_FAILURE_REASON: &str = "payment declined";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub outcome: VerdictOutcome,
    pub evidence: Evidence,
    pub reason: Option<String>,
    pub needs_review: bool,
}

impl Classification {
    fn new(outcome: VerdictOutcome, evidence: Evidence) -> Self {
        Self { outcome, evidence, reason: None, needs_review: false }
    }

    fn failed(evidence: Evidence, fields: &SignalFields) -> Self {
        Self { reason: Some(failure_reason(fields)), ..Self::new(VerdictOutcome::Failure, evidence) }
    }
}

fn failure_reason(fields: &SignalFields) -> String {
    if let Some(msg) = fields.message.clone().or_else(|| fields.txn_response_code.clone()) {
        return msg;
    }
    if fields.is_voided == Some(true) {
        return "transaction voided".to_string();
    }
    if fields.is_refunded == Some(true) {
        return "transaction refunded".to_string();
    }
    fields.status.clone().unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string())
}

fn classify_code(code: &str) -> Option<VerdictOutcome> {
    let code = code.trim().to_ascii_uppercase();
    if SUCCESS_CODES.contains(&code.as_str()) {
        Some(VerdictOutcome::Success)
    } else if FAILURE_CODES.contains(&code.as_str()) {
        Some(VerdictOutcome::Failure)
    } else if PENDING_CODES.contains(&code.as_str()) {
        Some(VerdictOutcome::Pending)
    } else {
        None
    }
}

/// Decides the outcome of a signal. Rules are applied in order and the first match wins:
///
/// 1. Explicit flags. A success flag alongside a failure flag is contradictory and is held as pending for review.
/// 2. Textual status codes (`status`, or failing that `txn_response_code`).
/// 3. Amount reconciliation: the paid amount covers `expected_total` and no failure flag is set.
/// 4. Otherwise the signal is unclassified and the outcome is pending.
pub fn classify(fields: &SignalFields, expected_total: Option<Money>) -> Classification {
    use VerdictOutcome::*;
    let failure_flag = fields.has_failure_flag();
    match fields.success {
        Some(true) if failure_flag => {
            return Classification {
                reason: Some("success flag contradicted by a failure flag".into()),
                needs_review: true,
                ..Classification::new(Pending, Evidence::Contradictory)
            };
        },
        Some(true) if fields.pending == Some(true) => return Classification::new(Pending, Evidence::ExplicitFlag),
        Some(true) => return Classification::new(Success, Evidence::ExplicitFlag),
        _ => {},
    }
    if fields.pending == Some(true) {
        return Classification::new(Pending, Evidence::ExplicitFlag);
    }
    if fields.success == Some(false) || failure_flag {
        return Classification::failed(Evidence::ExplicitFlag, fields);
    }
    let code = fields.status.as_deref().or(fields.txn_response_code.as_deref());
    if let Some(outcome) = code.and_then(classify_code) {
        return match outcome {
            Failure => Classification::failed(Evidence::StatusCode, fields),
            o => Classification::new(o, Evidence::StatusCode),
        };
    }
    if let (Some(paid), Some(expected)) = (fields.paid_amount, expected_total) {
        if paid >= expected {
            return Classification::new(Success, Evidence::AmountReconciliation);
        }
    }
    Classification::new(Pending, Evidence::Unclassified)
}

/// The normalized outcome of one gateway signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub merchant_order_id: Option<MerchantOrderId>,
    pub transaction_id: Option<String>,
    pub gateway_order_id: Option<String>,
    pub outcome: VerdictOutcome,
    pub evidence: Evidence,
    pub reason: Option<String>,
    pub verified: bool,
    pub needs_review: bool,
    pub channel: SignalChannel,
    pub raw_payload: String,
}

impl Verdict {
    /// Builds the verdict for a signal. `expected_total` is the total of the order the signal refers to, if known,
    /// and enables amount reconciliation.
    pub fn normalize(
        fields: SignalFields,
        channel: SignalChannel,
        expected_total: Option<Money>,
        verified: bool,
        raw_payload: String,
    ) -> Self {
        let c = classify(&fields, expected_total);
        match (c.outcome, c.needs_review) {
            (_, true) => warn!("💳️ Ambiguous {channel} signal flagged for review: {:?}", fields.merchant_order_id),
            (VerdictOutcome::Pending, _) => {
                debug!("💳️ {channel} signal for {:?} is pending ({:?})", fields.merchant_order_id, c.evidence)
            },
            (o, _) => debug!("💳️ {channel} signal for {:?} says {o} ({:?})", fields.merchant_order_id, c.evidence),
        }
        Self {
            merchant_order_id: fields.merchant_order_id,
            transaction_id: fields.transaction_id,
            gateway_order_id: fields.gateway_order_id,
            outcome: c.outcome,
            evidence: c.evidence,
            reason: c.reason,
            verified,
            needs_review: c.needs_review,
            channel,
            raw_payload,
        }
    }

    /// The verdict for an order with nothing to pay. It settles without contacting the gateway.
    pub fn zero_total(merchant_order_id: &MerchantOrderId) -> Self {
        Self {
            merchant_order_id: Some(merchant_order_id.clone()),
            transaction_id: None,
            gateway_order_id: None,
            outcome: VerdictOutcome::Success,
            evidence: Evidence::ZeroTotal,
            reason: None,
            verified: true,
            needs_review: false,
            channel: SignalChannel::Internal,
            raw_payload: r#"{"zero_total":true}"#.to_string(),
        }
    }

    /// An internally generated failure, e.g. when no payment session could be created.
    pub fn internal_failure(merchant_order_id: &MerchantOrderId, reason: &str) -> Self {
        Self {
            outcome: VerdictOutcome::Failure,
            evidence: Evidence::ExplicitFlag,
            reason: Some(reason.to_string()),
            raw_payload: serde_json::json!({ "internal_failure": reason }).to_string(),
            ..Self::zero_total(merchant_order_id)
        }
    }

    pub fn failure_reason(&self) -> &str {
        self.reason.as_deref().unwrap_or(DEFAULT_FAILURE_REASON)
    }

    pub fn settlement_details(&self) -> SettlementDetails {
        SettlementDetails {
            transaction_id: self.transaction_id.clone(),
            gateway_order_id: self.gateway_order_id.clone(),
            gateway_response: Some(self.raw_payload.clone()),
        }
    }

    pub fn to_signal(&self) -> NewSignal {
        NewSignal {
            merchant_order_id: self.merchant_order_id.clone(),
            channel: self.channel,
            outcome: self.outcome,
            evidence: self.evidence,
            reason: self.reason.clone(),
            verified: self.verified,
            needs_review: self.needs_review,
            raw_payload: self.raw_payload.clone(),
        }
    }
}
