use chrono::Utc;
use rocket::serde::json::Json;
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::{Client, ClientSession};
use serde_json::json;
use validator::Validate;

use crate::db::{is_duplicate_key, DbConn, BOOKINGS, CARS, INVOICES, USERS};
use crate::guards::{AdminGuard, AuthGuard};
use crate::models::{
    generate_booking_id, Booking, BookingDto, BookingStatus, CancelBookingDto, Car, DeliveryStatus,
    InvoiceStatus, PaymentStatus, PriceQuote, StartTripDto, BOOKING_LIST_SCHEMA,
    DEFAULT_CANCELLATION_REASON,
};
use crate::services::RazorpayService;
use crate::utils::pagination::paginate;
use crate::utils::{parse_id, validate_mobile, ApiError, ApiResponse, ListQuery};

const ID_ATTEMPTS: usize = 5;

const HIDDEN_PARTY_FIELDS: [&str; 4] = ["password", "otp", "expiry_time", "rt_hash"];

pub(crate) async fn booking_by_id(db: &DbConn, id: &ObjectId) -> Result<Booking, ApiError> {
    db.collection::<Booking>(BOOKINGS)
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Booking Not Found"))
}

/// Booking documents joined with car, customer, agent and invoice.
async fn detailed_bookings(db: &DbConn, filter: Document) -> Result<Vec<Document>, ApiError> {
    let mut hidden = Document::new();
    for party in ["user", "agent"] {
        for field in HIDDEN_PARTY_FIELDS {
            hidden.insert(format!("{}.{}", party, field), 0);
        }
    }

    let pipeline = vec![
        doc! { "$match": filter },
        doc! { "$sort": { "created_at": -1 } },
        doc! { "$lookup": { "from": CARS, "localField": "booked_car_id", "foreignField": "_id", "as": "car" } },
        doc! { "$lookup": { "from": USERS, "localField": "booked_by_id", "foreignField": "_id", "as": "user" } },
        doc! { "$lookup": { "from": USERS, "localField": "assigned_agent_id", "foreignField": "_id", "as": "agent" } },
        doc! { "$lookup": { "from": INVOICES, "localField": "_id", "foreignField": "booking_id", "as": "invoice" } },
        doc! { "$addFields": {
            "car": { "$arrayElemAt": ["$car", 0] },
            "user": { "$arrayElemAt": ["$user", 0] },
            "agent": { "$arrayElemAt": ["$agent", 0] },
            "invoice": { "$arrayElemAt": ["$invoice", 0] },
        }},
        doc! { "$project": hidden },
    ];

    Ok(db
        .collection::<Document>(BOOKINGS)
        .aggregate(pipeline, None)
        .await?
        .try_collect()
        .await?)
}

/// Agent or admin driving the hand-over of `booking`.
fn ensure_handler(auth: &AuthGuard, booking: &Booking) -> Result<(), ApiError> {
    if auth.is_admin() || booking.assigned_agent_id == Some(auth.user_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only The Assigned Agent Can Update This Booking"))
    }
}

fn ensure_transition(booking: &Booking, next: BookingStatus) -> Result<(), ApiError> {
    if booking.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "Booking Can't Move From {} To {}",
            booking.status.as_str(),
            next.as_str()
        )))
    }
}

/// --------------------
/// Create booking
/// --------------------
#[openapi(tag = "Booking")]
#[post("/booking", data = "<dto>")]
pub async fn create_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<BookingDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;
    if !validate_mobile(&dto.contact) {
        return Err(ApiError::bad_request("Invalid contact number"));
    }

    let car_id = parse_id(&dto.booked_car_id, "Car")?;
    let car = db
        .collection::<Car>(CARS)
        .find_one(doc! { "_id": car_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Car Not Found"))?;

    if !car.is_available {
        return Err(ApiError::bad_request("Car Is Not Available"));
    }

    let quote = PriceQuote::for_window(&car, dto.pickup_dt, dto.dropup_dt)?;
    let now = DateTime::now();
    let mut booking = Booking {
        id: Some(ObjectId::new()),
        booking_id: String::new(),
        booked_by_id: auth.user_id,
        booked_car_id: car_id,
        booking_name: dto.booking_name.trim().to_string(),
        contact: dto.contact.trim().to_string(),
        dl_no: dto.dl_no.trim().to_string(),
        dob: dto.dob.trim().to_string(),
        pickup_dt: DateTime::from_millis(dto.pickup_dt.timestamp_millis()),
        dropup_dt: DateTime::from_millis(dto.dropup_dt.timestamp_millis()),
        pickup_location: dto.pickup_location.trim().to_string(),
        dropup_location: dto.dropup_location.trim().to_string(),
        price: quote.price,
        gst: quote.gst,
        gst_amount: quote.gst_amount,
        logistic_charge: quote.logistic_charge,
        total_amount: quote.total_amount,
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
    };

    let bookings = db.collection::<Booking>(BOOKINGS);
    for _ in 0..ID_ATTEMPTS {
        let candidate = generate_booking_id(Utc::now());
        if bookings.count_documents(doc! { "booking_id": &candidate }, None).await? > 0 {
            continue;
        }
        booking.booking_id = candidate;

        match bookings.insert_one(&booking, None).await {
            Ok(_) => {
                info!("Booking {} created for car {}", booking.booking_id, car.registration_no);
                return Ok(Json(ApiResponse::success(
                    "Booking Created Successfully",
                    json!({ "booking": booking, "quote": quote }),
                )));
            }
            Err(e) if is_duplicate_key(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::conflict("Could Not Allocate A Booking ID, Please Retry"))
}

/// --------------------
/// Read
/// --------------------
#[openapi(tag = "Booking")]
#[get("/booking/user/<user_id>")]
pub async fn get_user_bookings(
    db: &State<DbConn>,
    auth: AuthGuard,
    user_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = parse_id(&user_id, "User")?;
    if !auth.can_act_for(&user_id) {
        return Err(ApiError::forbidden("You Can Only View Your Own Bookings"));
    }

    let bookings = detailed_bookings(
        db,
        doc! { "booked_by_id": user_id, "status": { "$ne": BookingStatus::Pending.as_str() } },
    )
    .await?;

    Ok(Json(ApiResponse::success("Bookings Retrieved", json!(bookings))))
}

#[openapi(tag = "Booking")]
#[get("/booking/<id>")]
pub async fn get_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let booking_id = parse_id(&id, "Booking")?;
    let booking = booking_by_id(db, &booking_id).await?;

    let is_owner = auth.can_act_for(&booking.booked_by_id);
    let is_agent = booking.assigned_agent_id == Some(auth.user_id);
    if !is_owner && !is_agent {
        return Err(ApiError::forbidden("You Are Not Allowed To View This Booking"));
    }

    let mut detailed = detailed_bookings(db, doc! { "_id": booking_id })
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found("Booking Not Found"))?;

    // the agent collects this code from the customer at hand-over
    if !is_owner {
        detailed.remove("customer_otp");
    }

    Ok(Json(ApiResponse::success("Booking Retrieved", json!(detailed))))
}

#[openapi(tag = "Booking")]
#[get("/booking?<query..>")]
pub async fn get_all_bookings(
    db: &State<DbConn>,
    _admin: AdminGuard,
    query: ListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = paginate(
        &db.collection::<Booking>(BOOKINGS),
        &BOOKING_LIST_SCHEMA,
        &query,
        Document::new(),
    )
    .await?;

    Ok(Json(ApiResponse::success("Bookings Retrieved", json!(page))))
}

/// --------------------
/// Cancellation
/// --------------------
async fn settle_cancellation(
    db: &DbConn,
    session: &mut ClientSession,
    booking: &Booking,
    booking_oid: ObjectId,
    reason: &str,
) -> Result<bool, mongodb::error::Error> {
    let now = DateTime::now();
    let result = db
        .collection::<Booking>(BOOKINGS)
        .update_one_with_session(
            doc! {
                "_id": booking_oid,
                "status": booking.status.as_str(),
            },
            doc! { "$set": {
                "status": BookingStatus::Cancelled.as_str(),
                "delivery_status": DeliveryStatus::Cancelled.as_str(),
                "customer_otp": "",
                "cancellation_reason": reason,
                "updated_at": now,
            }},
            None,
            session,
        )
        .await?;

    if result.modified_count == 0 {
        return Ok(false);
    }

    db.collection::<Document>(INVOICES)
        .update_one_with_session(
            doc! { "booking_id": booking_oid },
            doc! { "$set": { "status": InvoiceStatus::Refunded.as_str(), "updated_at": now } },
            None,
            session,
        )
        .await?;

    Ok(true)
}

#[openapi(tag = "Booking")]
#[patch("/booking/<id>", data = "<dto>")]
pub async fn cancel_booking(
    db: &State<DbConn>,
    client: &State<Client>,
    auth: AuthGuard,
    id: String,
    dto: Json<CancelBookingDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let booking_oid = parse_id(&id, "Booking")?;
    let mut booking = booking_by_id(db, &booking_oid).await?;

    if !auth.can_act_for(&booking.booked_by_id) {
        return Err(ApiError::forbidden("You Can Only Cancel Your Own Bookings"));
    }
    booking.status.ensure_cancellable()?;
    ensure_transition(&booking, BookingStatus::Cancelled)?;

    // Refund first; a booking that is already refunded skips this on retry.
    if let Some(payment_id) = booking.refund_due().map(str::to_string) {
        let refund = RazorpayService::refund(&payment_id, &booking.booking_id).await?;
        let refund_date = DateTime::from_millis(refund.created_at * 1000);
        db.collection::<Booking>(BOOKINGS)
            .update_one(
                doc! { "_id": booking_oid },
                doc! { "$set": {
                    "refund_id": &refund.id,
                    "refund_amount": refund.amount as f64 / 100.0,
                    "refund_date": refund_date,
                    "payment_status": PaymentStatus::Refunded.as_str(),
                    "updated_at": DateTime::now(),
                }},
                None,
            )
            .await?;
        info!("Refund {} issued for booking {}", refund.id, booking.booking_id);
        booking.payment_status = PaymentStatus::Refunded;
        booking.refund_id = Some(refund.id);
    }

    let reason = dto
        .into_inner()
        .reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
        .unwrap_or_else(|| DEFAULT_CANCELLATION_REASON.to_string());

    let mut session = client.start_session(None).await?;
    session.start_transaction(None).await?;
    let settled = match settle_cancellation(db, &mut session, &booking, booking_oid, &reason).await {
        Ok(settled) => settled,
        Err(e) => {
            let _ = session.abort_transaction().await;
            return Err(e.into());
        }
    };
    if !settled {
        let _ = session.abort_transaction().await;
        return Err(ApiError::conflict("Booking Was Updated Concurrently, Please Retry"));
    }
    session.commit_transaction().await?;
    info!("Booking {} cancelled: {}", booking.booking_id, reason);

    let booking = booking_by_id(db, &booking_oid).await?;
    Ok(Json(ApiResponse::success("Booking Cancelled Successfully", json!(booking))))
}

/// --------------------
/// Hand-over
/// --------------------
#[openapi(tag = "Booking")]
#[patch("/booking/<id>/start", data = "<dto>")]
pub async fn start_trip(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
    dto: Json<StartTripDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let booking_oid = parse_id(&id, "Booking")?;
    let booking = booking_by_id(db, &booking_oid).await?;
    ensure_handler(&auth, &booking)?;
    ensure_transition(&booking, BookingStatus::InProgress)?;

    if booking.customer_otp.is_empty() || booking.customer_otp != dto.otp.trim() {
        return Err(ApiError::bad_request("Invalid OTP"));
    }

    let result = db
        .collection::<Booking>(BOOKINGS)
        .update_one(
            doc! { "_id": booking_oid, "status": BookingStatus::Confirm.as_str() },
            doc! { "$set": {
                "status": BookingStatus::InProgress.as_str(),
                "delivery_status": DeliveryStatus::Delivered.as_str(),
                "customer_otp_verified": true,
                "updated_at": DateTime::now(),
            }},
            None,
        )
        .await?;
    if result.modified_count == 0 {
        return Err(ApiError::conflict("Booking Was Updated Concurrently, Please Retry"));
    }

    let booking = booking_by_id(db, &booking_oid).await?;
    Ok(Json(ApiResponse::success("Trip Started", json!(booking))))
}

#[openapi(tag = "Booking")]
#[patch("/booking/<id>/complete")]
pub async fn complete_trip(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let booking_oid = parse_id(&id, "Booking")?;
    let booking = booking_by_id(db, &booking_oid).await?;
    ensure_handler(&auth, &booking)?;
    ensure_transition(&booking, BookingStatus::Completed)?;

    let result = db
        .collection::<Booking>(BOOKINGS)
        .update_one(
            doc! { "_id": booking_oid, "status": BookingStatus::InProgress.as_str() },
            doc! { "$set": {
                "status": BookingStatus::Completed.as_str(),
                "delivery_status": DeliveryStatus::Returned.as_str(),
                "updated_at": DateTime::now(),
            }},
            None,
        )
        .await?;
    if result.modified_count == 0 {
        return Err(ApiError::conflict("Booking Was Updated Concurrently, Please Retry"));
    }

    let booking = booking_by_id(db, &booking_oid).await?;
    Ok(Json(ApiResponse::success("Trip Completed", json!(booking))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    fn booking(status: BookingStatus, agent: Option<ObjectId>) -> Booking {
        let now = DateTime::now();
        Booking {
            id: Some(ObjectId::new()),
            booking_id: "BK_250310_0900_00000_AB12".into(),
            booked_by_id: ObjectId::new(),
            booked_car_id: ObjectId::new(),
            booking_name: "Asha".into(),
            contact: "9876543210".into(),
            dl_no: "DL-0420110012345".into(),
            dob: "1994-02-11".into(),
            pickup_dt: now,
            dropup_dt: now,
            pickup_location: "Saket".into(),
            dropup_location: "Saket".into(),
            price: 250.0,
            gst: 18.0,
            gst_amount: 45.0,
            logistic_charge: 250.0,
            total_amount: 545.0,
            status,
            delivery_status: DeliveryStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_id: None,
            payment_signature: None,
            refund_id: None,
            refund_amount: None,
            refund_date: None,
            assigned_agent_id: agent,
            customer_otp: "042917".into(),
            customer_otp_verified: false,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn caller(role: UserRole) -> AuthGuard {
        AuthGuard { user_id: ObjectId::new(), email: "a@b.in".into(), role }
    }

    #[test]
    fn only_assigned_agent_or_admin_handles_trip() {
        let agent = caller(UserRole::User);
        let assigned = booking(BookingStatus::Confirm, Some(agent.user_id));
        assert!(ensure_handler(&agent, &assigned).is_ok());
        assert!(ensure_handler(&caller(UserRole::Admin), &assigned).is_ok());

        let err = ensure_handler(&caller(UserRole::User), &assigned).unwrap_err();
        assert_eq!(err.status, rocket::http::Status::Forbidden);
    }

    #[test]
    fn trip_steps_follow_the_state_machine() {
        assert!(ensure_transition(&booking(BookingStatus::Confirm, None), BookingStatus::InProgress).is_ok());
        assert!(ensure_transition(&booking(BookingStatus::Pending, None), BookingStatus::InProgress).is_err());
        assert!(ensure_transition(&booking(BookingStatus::InProgress, None), BookingStatus::Completed).is_ok());

        let err = ensure_transition(&booking(BookingStatus::Completed, None), BookingStatus::Cancelled).unwrap_err();
        assert_eq!(err.message, "Booking Can't Move From COMPLETED To CANCELLED");
    }
}
