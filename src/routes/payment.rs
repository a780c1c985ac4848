use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, DateTime};
use serde_json::json;
use validator::Validate;

use crate::db::{DbConn, BOOKINGS, INVOICES};
use crate::guards::{AdminGuard, AuthGuard};
use crate::models::{
    Booking, BookingStatus, CreateOrderDto, DeliveryStatus, Invoice, PaymentStatus, RefundDto,
    VerifyPaymentDto,
};
use crate::routes::booking::booking_by_id;
use crate::services::{AgentService, InvoiceService, RazorpayService};
use crate::utils::{generate_otp, parse_id, ApiError, ApiResponse};

/// --------------------
/// Orders
/// --------------------
#[openapi(tag = "Payment")]
#[post("/payment/create-order", data = "<dto>")]
pub async fn create_order(
    _auth: AuthGuard,
    dto: Json<CreateOrderDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;
    let order = RazorpayService::create_order(dto.amount).await?;
    Ok(Json(ApiResponse::success("Order Created", order)))
}

/// --------------------
/// Verify
/// --------------------
#[openapi(tag = "Payment")]
#[post("/payment/verify", data = "<dto>")]
pub async fn verify_payment(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<VerifyPaymentDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;
    let booking_oid = parse_id(&dto.booking_id, "Booking")?;
    RazorpayService::verify_signature(&dto.order_id, &dto.payment_id, &dto.signature)?;

    let booking = booking_by_id(db, &booking_oid).await?;
    if !auth.can_act_for(&booking.booked_by_id) {
        return Err(ApiError::forbidden("You Can Only Pay For Your Own Bookings"));
    }

    // Replayed confirmation for a booking this payment already settled.
    if booking.is_replay_of(&dto.payment_id) {
        let invoice = InvoiceService::issue_for_booking(db, &booking_oid).await?;
        return Ok(Json(ApiResponse::success(
            "Payment Already Verified",
            json!({ "booking": booking, "invoice": invoice }),
        )));
    }
    if !booking.status.can_transition_to(BookingStatus::Confirm) {
        return Err(ApiError::bad_request(format!(
            "Booking Is {}, Payment Can't Be Applied",
            booking.status.as_str()
        )));
    }

    let agent_id = AgentService::assign(db).await?;
    let result = db
        .collection::<Booking>(BOOKINGS)
        .update_one(
            doc! { "_id": booking_oid, "status": BookingStatus::Pending.as_str() },
            doc! { "$set": {
                "payment_id": dto.payment_id.trim(),
                "payment_signature": dto.signature.trim(),
                "payment_status": PaymentStatus::Success.as_str(),
                "status": BookingStatus::Confirm.as_str(),
                "delivery_status": DeliveryStatus::Pending.as_str(),
                "customer_otp": generate_otp(),
                "customer_otp_verified": false,
                "assigned_agent_id": agent_id,
                "updated_at": DateTime::now(),
            }},
            None,
        )
        .await?;
    if result.modified_count == 0 {
        return Err(ApiError::conflict("Booking Was Updated Concurrently, Please Retry"));
    }
    info!("Payment {} captured for booking {}", dto.payment_id, booking.booking_id);

    let invoice = InvoiceService::issue_for_booking(db, &booking_oid).await?;
    let booking = booking_by_id(db, &booking_oid).await?;

    Ok(Json(ApiResponse::success(
        "Payment Verified Successfully",
        json!({ "booking": booking, "invoice": invoice }),
    )))
}

/// --------------------
/// Refund (admin)
/// --------------------
#[openapi(tag = "Payment")]
#[post("/payment/refund", data = "<dto>")]
pub async fn refund_payment(
    db: &State<DbConn>,
    _admin: AdminGuard,
    dto: Json<RefundDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let booking_oid = parse_id(&dto.booking_id, "Booking")?;
    let booking = booking_by_id(db, &booking_oid).await?;

    let Some(payment_id) = booking.payment_id.as_deref().filter(|id| !id.is_empty()) else {
        return Err(ApiError::bad_request("No payment ID found"));
    };
    if booking.payment_status == PaymentStatus::Refunded || booking.refund_id.is_some() {
        return Err(ApiError::bad_request("Already Refunded"));
    }

    let refund = RazorpayService::refund(payment_id, &booking.booking_id).await?;
    let refund_amount = refund.amount as f64 / 100.0;

    db.collection::<Booking>(BOOKINGS)
        .update_one(
            doc! { "_id": booking_oid },
            doc! { "$set": {
                "refund_id": &refund.id,
                "refund_amount": refund_amount,
                "refund_date": DateTime::from_millis(refund.created_at * 1000),
                "payment_status": PaymentStatus::Refunded.as_str(),
                "updated_at": DateTime::now(),
            }},
            None,
        )
        .await?;

    let invoice = db
        .collection::<Invoice>(INVOICES)
        .find_one(doc! { "booking_id": booking_oid }, None)
        .await?;

    Ok(Json(ApiResponse::success(
        "Refund Processed Successfully",
        json!({
            "refund_id": refund.id,
            "refund_amount": refund_amount,
            "booking_id": booking.booking_id,
            "invoice": invoice,
        }),
    )))
}
