use chrono::Utc;
use rand::Rng;
use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use crate::models::Car;
use crate::utils::pagination::{FieldKind, FilterField, FilterOp, ListSchema, SearchField};
use crate::utils::{round2, ApiError};

pub const DEFAULT_CANCELLATION_REASON: &str = "Cancelled By DriveEasy";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirm,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirm => "CONFIRM",
            BookingStatus::InProgress => "IN_PROGRESS",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    /// PENDING -> CONFIRM -> IN_PROGRESS -> COMPLETED, and PENDING/CONFIRM -> CANCELLED.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirm)
                | (Confirm, InProgress)
                | (InProgress, Completed)
                | (Pending, Cancelled)
                | (Confirm, Cancelled)
        )
    }

    pub fn ensure_cancellable(self) -> Result<(), ApiError> {
        match self {
            BookingStatus::InProgress | BookingStatus::Completed => {
                Err(ApiError::bad_request("Booking Can't Be Cancelled"))
            }
            BookingStatus::Cancelled => Err(ApiError::bad_request("Booking Already Cancelled")),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Returned,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Returned => "RETURNED",
            DeliveryStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Booking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Human readable reference, `BK_YYMMDD_HHMM_SSmmm_XXXX`.
    pub booking_id: String,
    pub booked_by_id: ObjectId,
    pub booked_car_id: ObjectId,
    pub booking_name: String,
    pub contact: String,
    pub dl_no: String,
    pub dob: String,
    pub pickup_dt: DateTime,
    pub dropup_dt: DateTime,
    pub pickup_location: String,
    pub dropup_location: String,

    // Price snapshot taken from the car at creation; never recomputed.
    pub price: f64,
    pub gst: f64,
    pub gst_amount: f64,
    pub logistic_charge: f64,
    pub total_amount: f64,

    pub status: BookingStatus,
    pub delivery_status: DeliveryStatus,
    pub payment_status: PaymentStatus,
    pub payment_id: Option<String>,
    pub payment_signature: Option<String>,
    pub refund_id: Option<String>,
    pub refund_amount: Option<f64>,
    pub refund_date: Option<DateTime>,
    pub assigned_agent_id: Option<ObjectId>,
    pub customer_otp: String,
    pub customer_otp_verified: bool,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Booking {
    /// Payment to refund on cancellation, if the money was captured and not yet returned.
    pub fn refund_due(&self) -> Option<&str> {
        if self.payment_status != PaymentStatus::Success || self.refund_id.is_some() {
            return None;
        }
        self.payment_id.as_deref().filter(|id| !id.is_empty())
    }

    /// `payment_id` already settled this booking.
    pub fn is_replay_of(&self, payment_id: &str) -> bool {
        self.status == BookingStatus::Confirm
            && self.payment_id.as_deref() == Some(payment_id.trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, JsonSchema)]
pub struct PriceQuote {
    pub total_hours: f64,
    pub price: f64,
    pub gst: f64,
    pub gst_amount: f64,
    pub logistic_charge: f64,
    pub total_amount: f64,
}

impl PriceQuote {
    /// Prices a rental window against the car's current tariff.
    pub fn for_window(
        car: &Car,
        pickup: chrono::DateTime<Utc>,
        dropoff: chrono::DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        if dropoff <= pickup {
            return Err(ApiError::bad_request("Drop-off time must be after pickup time"));
        }

        let total_hours = (dropoff - pickup).num_milliseconds() as f64 / 3_600_000.0;
        let price = round2(total_hours * car.price_per_day);
        let gst_amount = round2(car.gst / 100.0 * price);
        let total_amount = round2(price + gst_amount + car.logistic);

        Ok(PriceQuote {
            total_hours,
            price,
            gst: car.gst,
            gst_amount,
            logistic_charge: car.logistic,
            total_amount,
        })
    }
}

const ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// `BK_YYMMDD_HHMM_SSmmm_XXXX`; uniqueness is enforced by the caller against the store.
pub fn generate_booking_id(now: chrono::DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("BK_{}_{}", now.format("%y%m%d_%H%M_%S%3f"), suffix)
}

pub static BOOKING_LIST_SCHEMA: ListSchema = ListSchema {
    filters: &[
        FilterField {
            param: "status",
            field: "status",
            kind: FieldKind::Enum(&["PENDING", "CONFIRM", "IN_PROGRESS", "COMPLETED", "CANCELLED"]),
            op: FilterOp::Eq,
        },
        FilterField {
            param: "delivery_status",
            field: "delivery_status",
            kind: FieldKind::Enum(&["PENDING", "DELIVERED", "RETURNED", "CANCELLED"]),
            op: FilterOp::Eq,
        },
        FilterField {
            param: "payment_status",
            field: "payment_status",
            kind: FieldKind::Enum(&["PENDING", "SUCCESS", "REFUNDED"]),
            op: FilterOp::Eq,
        },
    ],
    search: &[
        SearchField { field: "booking_id", kind: FieldKind::Text },
        SearchField { field: "booking_name", kind: FieldKind::Text },
        SearchField { field: "contact", kind: FieldKind::Text },
        SearchField { field: "pickup_location", kind: FieldKind::Text },
        SearchField { field: "dropup_location", kind: FieldKind::Text },
        SearchField { field: "total_amount", kind: FieldKind::Number },
    ],
    sort_field: Some("total_amount"),
};

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct BookingDto {
    #[validate(length(min = 1, message = "booking_name is required"))]
    pub booking_name: String,
    pub booked_car_id: String,
    #[validate(length(min = 1, message = "contact is required"))]
    pub contact: String,
    #[validate(length(min = 1, message = "dl_no is required"))]
    pub dl_no: String,
    #[validate(length(min = 1, message = "dob is required"))]
    pub dob: String,
    pub pickup_dt: chrono::DateTime<Utc>,
    pub dropup_dt: chrono::DateTime<Utc>,
    #[validate(length(min = 1, message = "pickup_location is required"))]
    pub pickup_location: String,
    #[validate(length(min = 1, message = "dropup_location is required"))]
    pub dropup_location: String,
}

/// Body of a cancellation; `{}` falls back to the default reason.
#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CancelBookingDto {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StartTripDto {
    pub otp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::car::sample_car;
    use chrono::{Duration, TimeZone};

    fn pickup() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn quote_matches_pricing_formula() {
        let car = sample_car(); // 100/day, 18% gst, 250 logistic
        let quote = PriceQuote::for_window(&car, pickup(), pickup() + Duration::minutes(150)).unwrap();

        assert_eq!(quote.total_hours, 2.5);
        assert_eq!(quote.price, 250.0);
        assert_eq!(quote.gst_amount, 45.0);
        assert_eq!(quote.logistic_charge, 250.0);
        assert_eq!(quote.total_amount, round2(quote.price + quote.gst_amount + quote.logistic_charge));
        assert_eq!(quote.total_amount, 545.0);
    }

    #[test]
    fn fractional_hours_round_each_component() {
        let mut car = sample_car();
        car.price_per_day = 33.33;
        car.gst = 12.0;
        car.logistic = 99.99;
        let quote = PriceQuote::for_window(&car, pickup(), pickup() + Duration::minutes(20)).unwrap();

        assert_eq!(quote.price, round2(quote.total_hours * car.price_per_day));
        assert_eq!(quote.price, 11.11);
        assert_eq!(quote.gst_amount, 1.33);
        assert_eq!(quote.total_amount, 112.43);
    }

    #[test]
    fn empty_or_inverted_window_is_rejected() {
        let car = sample_car();
        assert!(PriceQuote::for_window(&car, pickup(), pickup()).is_err());
        assert!(PriceQuote::for_window(&car, pickup(), pickup() - Duration::hours(1)).is_err());
    }

    #[test]
    fn started_or_finished_bookings_cannot_be_cancelled() {
        for status in [BookingStatus::InProgress, BookingStatus::Completed, BookingStatus::Cancelled] {
            let err = status.ensure_cancellable().unwrap_err();
            assert_eq!(err.status, rocket::http::Status::BadRequest);
        }
        assert!(BookingStatus::Pending.ensure_cancellable().is_ok());
        assert!(BookingStatus::Confirm.ensure_cancellable().is_ok());
    }

    #[test]
    fn terminal_states_have_no_exit() {
        use BookingStatus::*;
        let all = [Pending, Confirm, InProgress, Completed, Cancelled];
        for next in all {
            assert!(!Completed.can_transition_to(next));
            assert!(!Cancelled.can_transition_to(next));
        }
        assert!(Pending.can_transition_to(Confirm));
        assert!(Confirm.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(InProgress));
    }

    #[test]
    fn booking_id_has_time_prefix_and_random_suffix() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 9, 5, 7).unwrap() + Duration::milliseconds(42);
        let id = generate_booking_id(now);
        assert!(id.starts_with("BK_250310_0905_07042_"), "{}", id);

        let re = regex::Regex::new(r"^BK_\d{6}_\d{4}_\d{5}_[0-9A-Z]{4}$").unwrap();
        assert!(re.is_match(&id), "{}", id);
    }

    fn booking() -> Booking {
        let now = DateTime::now();
        Booking {
            id: Some(ObjectId::new()),
            booking_id: "BK_250310_0900_00000_AB12".into(),
            booked_by_id: ObjectId::new(),
            booked_car_id: ObjectId::new(),
            booking_name: "Asha".into(),
            contact: "9876543210".into(),
            dl_no: "KA0120200001234".into(),
            dob: "1995-04-01".into(),
            pickup_dt: now,
            dropup_dt: now,
            pickup_location: "Indiranagar".into(),
            dropup_location: "Koramangala".into(),
            price: 250.0,
            gst: 18.0,
            gst_amount: 45.0,
            logistic_charge: 250.0,
            total_amount: 545.0,
            status: BookingStatus::Pending,
            delivery_status: DeliveryStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_id: None,
            payment_signature: None,
            refund_id: None,
            refund_amount: None,
            refund_date: None,
            assigned_agent_id: None,
            customer_otp: String::new(),
            customer_otp_verified: false,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn paid(payment_id: &str) -> Booking {
        Booking {
            status: BookingStatus::Confirm,
            payment_status: PaymentStatus::Success,
            payment_id: Some(payment_id.into()),
            ..booking()
        }
    }

    #[test]
    fn unpaid_booking_has_nothing_to_refund() {
        assert_eq!(booking().refund_due(), None);

        let no_id = Booking { payment_status: PaymentStatus::Success, ..booking() };
        assert_eq!(no_id.refund_due(), None);
    }

    #[test]
    fn captured_payment_is_refunded_once() {
        let b = paid("pay_123");
        assert_eq!(b.refund_due(), Some("pay_123"));

        let refunded = Booking { payment_status: PaymentStatus::Refunded, ..paid("pay_123") };
        assert_eq!(refunded.refund_due(), None);

        // refund stored but status update lost
        let half_done = Booking { refund_id: Some("rfnd_1".into()), ..paid("pay_123") };
        assert_eq!(half_done.refund_due(), None);
    }

    #[test]
    fn same_payment_on_confirmed_booking_is_a_replay() {
        let b = paid("pay_123");
        assert!(b.is_replay_of("pay_123"));
        assert!(b.is_replay_of(" pay_123 "));
        assert!(!b.is_replay_of("pay_999"));

        let pending = Booking { status: BookingStatus::Pending, ..paid("pay_123") };
        assert!(!pending.is_replay_of("pay_123"));
        let cancelled = Booking { status: BookingStatus::Cancelled, ..paid("pay_123") };
        assert!(!cancelled.is_replay_of("pay_123"));
    }

    #[test]
    fn statuses_serialize_as_stored() {
        assert_eq!(serde_json::to_value(BookingStatus::InProgress).unwrap(), "IN_PROGRESS");
        assert_eq!(BookingStatus::InProgress.as_str(), "IN_PROGRESS");
        assert_eq!(serde_json::to_value(PaymentStatus::Refunded).unwrap(), "REFUNDED");
    }
}
