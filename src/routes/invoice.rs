use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use serde_json::json;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{BookingStatus, CreateInvoiceDto};
use crate::routes::booking::booking_by_id;
use crate::services::InvoiceService;
use crate::utils::{parse_id, ApiError, ApiResponse};

/// --------------------
/// Issue invoice
/// --------------------
/// Returns the booking's invoice, generating the PDF on first call.
#[openapi(tag = "Invoice")]
#[post("/invoice", data = "<dto>")]
pub async fn create_invoice(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<CreateInvoiceDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let booking_oid = parse_id(&dto.booking_id, "Booking")?;
    let booking = booking_by_id(db, &booking_oid).await?;

    if !auth.can_act_for(&booking.booked_by_id) {
        return Err(ApiError::forbidden("You Can Only Request Invoices For Your Own Bookings"));
    }
    if booking.status == BookingStatus::Pending {
        return Err(ApiError::bad_request("Booking Has Not Been Paid Yet"));
    }

    let invoice = InvoiceService::issue_for_booking(db, &booking_oid).await?;
    Ok(Json(ApiResponse::success("Invoice Generated", json!(invoice))))
}
