use std::sync::OnceLock;

use mongodb::bson::oid::ObjectId;
use rand::Rng;
use regex::Regex;

use crate::utils::ApiError;

fn mobile_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\+91)?[6-9]\d{9}$").expect("valid mobile regex"))
}

fn pincode_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{6}$").expect("valid pincode regex"))
}

pub fn validate_mobile(mobile: &str) -> bool {
    mobile_re().is_match(mobile.trim())
}

pub fn validate_pincode(pincode: &str) -> bool {
    pincode_re().is_match(pincode.trim())
}

/// Parses a hex ObjectId path/body value, naming `what` in the 400 message.
pub fn parse_id(raw: &str, what: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw.trim()).map_err(|_| ApiError::bad_request(format!("Invalid {} ID", what)))
}

/// Six digit, zero padded code drawn uniformly from [0, 1_000_000).
pub fn generate_otp() -> String {
    let mut rng = rand::thread_rng();
    let otp: u32 = rng.gen_range(0..1_000_000);
    format!("{:06}", otp)
}

/// Rounds to two decimals, the precision every stored amount is kept at.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..200 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn round2_keeps_two_decimals() {
        assert_eq!(round2(10.0 / 3.0), 3.33);
        assert_eq!(round2(2.675_1), 2.68);
        assert_eq!(round2(-1.234), -1.23);
        assert_eq!(round2(1500.0), 1500.0);
    }

    #[test]
    fn mobile_numbers() {
        assert!(validate_mobile("9876543210"));
        assert!(validate_mobile("+919876543210"));
        assert!(!validate_mobile("1234567890"));
        assert!(!validate_mobile("98765"));
    }

    #[test]
    fn object_ids() {
        assert!(parse_id("65f1c2a9e4b0a1b2c3d4e5f6", "Car").is_ok());
        let err = parse_id("not-an-id", "Car").unwrap_err();
        assert_eq!(err.message, "Invalid Car ID");
    }

    #[test]
    fn pincodes() {
        assert!(validate_pincode("110001"));
        assert!(!validate_pincode("11001"));
        assert!(!validate_pincode("abcdef"));
    }
}
