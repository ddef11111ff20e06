//! VNPay payment gateway adapter.
//!
//! Builds the signed redirect URL for the hosted payment page and verifies
//! the signature on inbound callbacks. The gateway recomputes the HMAC over
//! the lexicographically sorted, form-urlencoded parameter string, so the
//! sort order and encoding here are load-bearing: any deviation breaks
//! signature verification on both sides.

use chrono::{DateTime, FixedOffset, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sha2::Sha512;
use std::collections::BTreeMap;
use url::Url;
use uuid::Uuid;

use crate::{config::VnpayConfig, errors::ServiceError};

type HmacSha512 = Hmac<Sha512>;

const VNP_VERSION: &str = "2.1.0";
const VNP_COMMAND: &str = "pay";
const VNP_CURRENCY: &str = "VND";
const VNP_ORDER_TYPE: &str = "other";
pub const SECURE_HASH_PARAM: &str = "vnp_SecureHash";
const SECURE_HASH_TYPE_PARAM: &str = "vnp_SecureHashType";
const RESPONSE_CODE_PARAM: &str = "vnp_ResponseCode";
const TXN_REF_PARAM: &str = "vnp_TxnRef";

/// Outcome of interpreting a verified callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Payment confirmed (vnp_ResponseCode == "00").
    Confirmed,
    /// Gateway reported a failure or the shopper aborted.
    Declined { response_code: String },
}

#[derive(Clone)]
pub struct VnpayGateway {
    config: VnpayConfig,
}

impl VnpayGateway {
    pub fn new(config: VnpayConfig) -> Self {
        Self { config }
    }

    /// Builds the redirect URL for the hosted payment page.
    ///
    /// The canonical parameter set is sorted by key, form-urlencoded, signed
    /// with HMAC-SHA512 over the encoded string, and the signature is
    /// appended last as `vnp_SecureHash` (outside the sorted set).
    pub fn build_redirect_url(
        &self,
        order_id: Uuid,
        amount: Decimal,
        client_ip: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Url, ServiceError> {
        // The gateway expects the amount in minor units: VND scaled by 100.
        let scaled = (amount * Decimal::from(100)).trunc();
        let scaled = scaled.to_i64().filter(|v| *v > 0).ok_or_else(|| {
            ServiceError::ValidationError(format!("amount {amount} is not payable"))
        })?;

        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), VNP_VERSION.to_string());
        params.insert("vnp_Command".to_string(), VNP_COMMAND.to_string());
        params.insert("vnp_TmnCode".to_string(), self.config.tmn_code.clone());
        params.insert("vnp_Locale".to_string(), self.config.locale.clone());
        params.insert("vnp_CurrCode".to_string(), VNP_CURRENCY.to_string());
        params.insert(TXN_REF_PARAM.to_string(), order_id.to_string());
        params.insert(
            "vnp_OrderInfo".to_string(),
            format!("Thanh toan don hang {order_id}"),
        );
        params.insert("vnp_OrderType".to_string(), VNP_ORDER_TYPE.to_string());
        params.insert("vnp_Amount".to_string(), scaled.to_string());
        params.insert("vnp_ReturnUrl".to_string(), self.config.return_url.clone());
        params.insert("vnp_IpAddr".to_string(), client_ip.to_string());
        params.insert(
            "vnp_CreateDate".to_string(),
            format_create_date(created_at),
        );

        let query = encode_sorted(&params);
        let signature = self.sign(&query);

        let mut url = Url::parse(&self.config.pay_url)
            .map_err(|e| ServiceError::InternalError(format!("invalid gateway url: {e}")))?;
        url.set_query(Some(&format!(
            "{query}&{SECURE_HASH_PARAM}={signature}"
        )));
        Ok(url)
    }

    /// Verifies the HMAC signature on a callback parameter set.
    ///
    /// The received `vnp_SecureHash`/`vnp_SecureHashType` entries are
    /// excluded from the signed string, exactly as on the signing side.
    pub fn verify_signature<'a, I>(&self, params: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut received_hash = None;
        let mut signable = BTreeMap::new();
        for (key, value) in params {
            match key {
                SECURE_HASH_PARAM => received_hash = Some(value.to_string()),
                SECURE_HASH_TYPE_PARAM => {}
                _ => {
                    signable.insert(key.to_string(), value.to_string());
                }
            }
        }

        let Some(received) = received_hash else {
            return false;
        };

        let expected = self.sign(&encode_sorted(&signable));
        constant_time_eq(&expected, &received.to_lowercase())
    }

    /// Order reference carried inside the signed parameter set. The callback
    /// handler resolves the order from this, never from an unsigned field.
    pub fn transaction_ref(params: &BTreeMap<String, String>) -> Option<Uuid> {
        params.get(TXN_REF_PARAM).and_then(|v| v.parse().ok())
    }

    /// Interprets a verified callback payload.
    pub fn interpret_callback(params: &BTreeMap<String, String>) -> CallbackOutcome {
        match params.get(RESPONSE_CODE_PARAM).map(String::as_str) {
            Some("00") | None => CallbackOutcome::Confirmed,
            Some(code) => CallbackOutcome::Declined {
                response_code: code.to_string(),
            },
        }
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha512::new_from_slice(self.config.hash_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Form-urlencodes a parameter map. BTreeMap iteration gives the
/// lexicographic key order both signer and verifier rely on.
fn encode_sorted(params: &BTreeMap<String, String>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

/// Creation timestamp in the gateway's `yyyyMMddHHmmss` format, in the
/// gateway's timezone (Indochina, UTC+7).
fn format_create_date(at: DateTime<Utc>) -> String {
    let ict = FixedOffset::east_opt(7 * 3600).expect("valid fixed offset");
    at.with_timezone(&ict).format("%Y%m%d%H%M%S").to_string()
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}
