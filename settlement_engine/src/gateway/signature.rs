//! Message authentication for gateway signals.
//!
//! The gateway signs each transaction with HMAC-SHA512 over the concatenated values of a fixed, lexicographically
//! ordered list of fields, and sends the lowercase hex digest alongside the signal.
use hmac::{Hmac, Mac};
use lms_common::Secret;
use log::{trace, warn};
use sha2::Sha512;
use thiserror::Error;

use crate::gateway::signals::{RedirectQuery, TransactionObject};

type HmacSha512 = Hmac<Sha512>;

/// The signed fields, in signing order.
pub const SIGNED_FIELDS: [&str; 20] = [
    "amount_cents",
    "created_at",
    "currency",
    "error_occured",
    "has_parent_transaction",
    "id",
    "integration_id",
    "is_3d_secure",
    "is_auth",
    "is_capture",
    "is_refunded",
    "is_standalone_payment",
    "is_voided",
    "order.id",
    "owner",
    "pending",
    "source_data.pan",
    "source_data.sub_type",
    "source_data.type",
    "success",
];

#[derive(Debug, Clone, Error)]
pub enum SignatureError {
    #[error("The signal carries no MAC, but a shared secret is configured")]
    MissingMac,
    #[error("The MAC is not valid hex")]
    MalformedMac,
    #[error("The MAC does not match the signal contents")]
    Mismatch,
}

fn flag(v: Option<bool>) -> String {
    v.map(|b| b.to_string()).unwrap_or_default()
}

/// The canonical string for a webhook or inquiry transaction.
pub fn canonical_transaction_string(obj: &TransactionObject) -> String {
    let order = obj.order.clone().unwrap_or_default();
    let source = obj.source_data.clone().unwrap_or_default();
    SIGNED_FIELDS
        .iter()
        .map(|field| match *field {
            "amount_cents" => obj.amount_cents.map(|m| m.value().to_string()).unwrap_or_default(),
            "created_at" => obj.created_at.clone().unwrap_or_default(),
            "currency" => obj.currency.clone().unwrap_or_default(),
            "error_occured" => flag(obj.error_occured),
            "has_parent_transaction" => flag(obj.has_parent_transaction),
            "id" => obj.id.clone().unwrap_or_default(),
            "integration_id" => obj.integration_id.clone().unwrap_or_default(),
            "is_3d_secure" => flag(obj.is_3d_secure),
            "is_auth" => flag(obj.is_auth),
            "is_capture" => flag(obj.is_capture),
            "is_refunded" => flag(obj.is_refunded),
            "is_standalone_payment" => flag(obj.is_standalone_payment),
            "is_voided" => flag(obj.is_voided),
            "order.id" => order.id.clone().unwrap_or_default(),
            "owner" => obj.owner.clone().unwrap_or_default(),
            "pending" => flag(obj.pending),
            "source_data.pan" => source.pan.clone().unwrap_or_default(),
            "source_data.sub_type" => source.sub_type.clone().unwrap_or_default(),
            "source_data.type" => source.kind.clone().unwrap_or_default(),
            "success" => flag(obj.success),
            _ => String::new(),
        })
        .collect()
}

/// The canonical string for a redirect query. The redirect names the gateway order id `order` rather than `order.id`.
pub fn canonical_redirect_string(query: &RedirectQuery) -> String {
    SIGNED_FIELDS
        .iter()
        .map(|field| {
            let key = if *field == "order.id" { "order" } else { field };
            query.0.get(key).cloned().unwrap_or_default()
        })
        .collect()
}

pub fn compute_mac(secret: &str, message: &str) -> String {
    HmacSha512::new_from_slice(secret.as_bytes())
        .map(|mut mac| {
            mac.update(message.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        })
        .unwrap_or_default()
}

/// Verifies `supplied` against the MAC of `message`, in constant time.
///
/// Returns `Ok(false)` when no secret is configured: the signal is accepted but must be recorded as unverified.
pub fn verify_mac(secret: &Secret<String>, message: &str, supplied: Option<&str>) -> Result<bool, SignatureError> {
    let Some(key) = secret.configured() else {
        trace!("🔐️ No gateway secret is configured. Signal accepted unverified.");
        return Ok(false);
    };
    let supplied = supplied.ok_or(SignatureError::MissingMac)?;
    let expected = hex::decode(supplied.trim()).map_err(|_| SignatureError::MalformedMac)?;
    let mut mac = HmacSha512::new_from_slice(key.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
    mac.update(message.as_bytes());
    mac.verify_slice(&expected).map_err(|_| {
        warn!("🔐️ Gateway signal MAC mismatch");
        SignatureError::Mismatch
    })?;
    trace!("🔐️ Gateway signal MAC verified ✅️");
    Ok(true)
}
