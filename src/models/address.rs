use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::{Validate, ValidationError};

use crate::utils::validate_pincode;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AddressLabel {
    Home,
    Work,
    Other,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Address {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub label: AddressLabel,
    pub street: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub landmark: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

fn check_pincode(value: &str) -> Result<(), ValidationError> {
    if validate_pincode(value) {
        Ok(())
    } else {
        Err(ValidationError::new("pincode must be 6 digits"))
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct AddressDto {
    pub label: AddressLabel,
    #[validate(length(min = 1, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,
    #[validate(custom = "check_pincode")]
    pub pincode: String,
    pub landmark: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, JsonSchema)]
pub struct UpdateAddressDto {
    pub label: Option<AddressLabel>,
    #[validate(length(min = 1, message = "street cannot be empty"))]
    pub street: Option<String>,
    #[validate(length(min = 1, message = "city cannot be empty"))]
    pub city: Option<String>,
    #[validate(length(min = 1, message = "state cannot be empty"))]
    pub state: Option<String>,
    #[validate(custom = "check_pincode")]
    pub pincode: Option<String>,
    pub landmark: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(pincode: &str) -> AddressDto {
        AddressDto {
            label: AddressLabel::Home,
            street: "12 MG Road".into(),
            city: "Bengaluru".into(),
            state: "Karnataka".into(),
            pincode: pincode.into(),
            landmark: None,
        }
    }

    #[test]
    fn pincode_is_checked() {
        assert!(dto("560001").validate().is_ok());
        assert!(dto("5600").validate().is_err());
    }

    #[test]
    fn pincode_checker_rejects_letters() {
        assert!(check_pincode("560001").is_ok());
        assert!(check_pincode("56000a").is_err());
    }

    #[test]
    fn partial_update_validates_present_fields_only() {
        assert!(UpdateAddressDto::default().validate().is_ok());
        let bad = UpdateAddressDto { pincode: Some("x".into()), ..Default::default() };
        assert!(bad.validate().is_err());
    }
}
