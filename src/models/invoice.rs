use chrono::Utc;
use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Paid,
    Refunded,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Refunded => "REFUNDED",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Invoice {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub invoice_id: String,
    /// One invoice per booking; unique index on this field.
    pub booking_id: ObjectId,
    pub invoice_url: String,
    pub status: InvoiceStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateInvoiceDto {
    pub booking_id: String,
}

/// `INV-YYYYMMDD-<last five digits of the epoch millis>`.
pub fn generate_invoice_id(now: chrono::DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().to_string();
    let tail = &millis[millis.len().saturating_sub(5)..];
    format!("INV-{}-{}", now.format("%Y%m%d"), tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn invoice_id_uses_date_and_millis_tail() {
        let now = Utc.timestamp_millis_opt(1_741_597_507_042).unwrap();
        assert_eq!(generate_invoice_id(now), "INV-20250310-07042");
    }
}
