use serde::Deserialize;
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateOrderDto {
    /// Rupees; converted to paise for the gateway.
    #[validate(range(min = 1.0, message = "amount must be at least 1"))]
    pub amount: f64,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct VerifyPaymentDto {
    pub booking_id: String,
    #[validate(length(min = 1, message = "order_id is required"))]
    pub order_id: String,
    #[validate(length(min = 1, message = "payment_id is required"))]
    pub payment_id: String,
    #[validate(length(min = 1, message = "signature is required"))]
    pub signature: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RefundDto {
    pub booking_id: String,
}
