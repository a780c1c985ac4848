use hmac::{Hmac, Mac};
use log::{error, info};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

use crate::config::Config;
use crate::utils::ApiError;

const API_BASE: &str = "https://api.razorpay.com/v1";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
pub struct RazorpayRefund {
    pub id: String,
    /// Minor units (paise).
    pub amount: i64,
    pub created_at: i64,
}

pub struct RazorpayService;

impl RazorpayService {
    fn credentials() -> Result<(String, String), ApiError> {
        match (Config::razorpay_key_id(), Config::razorpay_key_secret()) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(ApiError::internal("Razorpay", "key id or secret is not configured")),
        }
    }

    /// Creates a gateway order for `amount` rupees.
    pub async fn create_order(amount: f64) -> Result<serde_json::Value, ApiError> {
        let (key_id, key_secret) = Self::credentials()?;
        let receipt = format!("rcpt_{}", chrono::Utc::now().timestamp_millis());

        let res = Client::new()
            .post(format!("{}/orders", API_BASE))
            .basic_auth(key_id, Some(key_secret))
            .json(&json!({
                "amount": (amount * 100.0).round() as i64,
                "currency": "INR",
                "receipt": receipt,
            }))
            .send()
            .await
            .map_err(|e| ApiError::internal("Razorpay order request failed", e))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            error!("Razorpay order rejected ({}): {}", status, body);
            return Err(ApiError::internal_error("Something Went Wrong"));
        }

        let order: serde_json::Value = res
            .json()
            .await
            .map_err(|e| ApiError::internal("Razorpay order response", e))?;
        info!("Razorpay order created: {}", order["id"]);
        Ok(order)
    }

    /// Full refund of a captured payment.
    pub async fn refund(payment_id: &str, receipt: &str) -> Result<RazorpayRefund, ApiError> {
        let (key_id, key_secret) = Self::credentials()?;

        let res = Client::new()
            .post(format!("{}/payments/{}/refund", API_BASE, payment_id))
            .basic_auth(key_id, Some(key_secret))
            .json(&json!({ "receipt": receipt }))
            .send()
            .await
            .map_err(|e| ApiError::internal("Razorpay refund request failed", e))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            error!("Razorpay refund for {} rejected ({}): {}", payment_id, status, body);
            return Err(ApiError::internal_error("Refund failed"));
        }

        let refund: RazorpayRefund = res
            .json()
            .await
            .map_err(|e| ApiError::internal("Razorpay refund response", e))?;
        info!("Refund {} issued for payment {}", refund.id, payment_id);
        Ok(refund)
    }

    /// Constant-time check of `signature` (hex) against HMAC-SHA256(secret, "order_id|payment_id").
    pub fn signature_matches(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    pub fn verify_signature(order_id: &str, payment_id: &str, signature: &str) -> Result<(), ApiError> {
        let (_, secret) = Self::credentials()?;
        if Self::signature_matches(&secret, order_id, payment_id, signature) {
            Ok(())
        } else {
            Err(ApiError::bad_request("Invalid payment signature"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_is_accepted() {
        let signature = sign("rzp_secret", "order_N1|pay_P1");
        assert!(RazorpayService::signature_matches("rzp_secret", "order_N1", "pay_P1", &signature));
    }

    #[test]
    fn any_single_character_change_is_rejected() {
        let signature = sign("rzp_secret", "order_N1|pay_P1");
        for i in 0..signature.len() {
            let mut bytes = signature.clone().into_bytes();
            bytes[i] = if bytes[i] == b'0' { b'1' } else { b'0' };
            let mutated = String::from_utf8(bytes).unwrap();
            assert!(
                !RazorpayService::signature_matches("rzp_secret", "order_N1", "pay_P1", &mutated),
                "mutation at {} accepted",
                i
            );
        }
    }

    #[test]
    fn wrong_secret_or_ids_are_rejected() {
        let signature = sign("rzp_secret", "order_N1|pay_P1");
        assert!(!RazorpayService::signature_matches("other", "order_N1", "pay_P1", &signature));
        assert!(!RazorpayService::signature_matches("rzp_secret", "order_N2", "pay_P1", &signature));
        assert!(!RazorpayService::signature_matches("rzp_secret", "order_N1", "pay_P1", "not-hex"));
        assert!(!RazorpayService::signature_matches("rzp_secret", "order_N1", "pay_P1", ""));
    }
}
