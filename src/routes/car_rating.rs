use rocket::serde::json::Json;
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::FindOptions;
use serde_json::json;
use validator::Validate;

use crate::db::{is_duplicate_key, DbConn, BOOKINGS, CARS, CAR_RATINGS};
use crate::guards::{AdminGuard, AuthGuard};
use crate::models::{BookingStatus, Car, CarRating, CreateRatingDto, RATING_LIST_SCHEMA};
use crate::utils::pagination::paginate;
use crate::utils::{parse_id, ApiError, ApiResponse, ListQuery};

fn already_reviewed() -> ApiError {
    ApiError::bad_request("You have already reviewed this car")
}

/// --------------------
/// Create rating
/// --------------------
#[openapi(tag = "Car Rating")]
#[post("/car-rating", data = "<dto>")]
pub async fn create_rating(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<CreateRatingDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;
    let car_id = parse_id(&dto.car_id, "Car")?;

    let car_count = db
        .collection::<Car>(CARS)
        .count_documents(doc! { "_id": car_id }, None)
        .await?;
    if car_count == 0 {
        return Err(ApiError::not_found("Car Not Found"));
    }

    let completed = db
        .collection::<Document>(BOOKINGS)
        .count_documents(
            doc! {
                "booked_by_id": auth.user_id,
                "booked_car_id": car_id,
                "status": BookingStatus::Completed.as_str(),
            },
            None,
        )
        .await?;
    if completed == 0 {
        return Err(ApiError::bad_request("You have not booked this car yet!"));
    }

    let ratings = db.collection::<CarRating>(CAR_RATINGS);
    if ratings
        .count_documents(doc! { "user_id": auth.user_id, "car_id": car_id }, None)
        .await?
        > 0
    {
        return Err(already_reviewed());
    }

    let now = DateTime::now();
    let rating = CarRating {
        id: Some(ObjectId::new()),
        user_id: auth.user_id,
        car_id,
        rating: dto.rating,
        comment: dto.comment.trim().to_string(),
        created_at: now,
        updated_at: now,
    };

    match ratings.insert_one(&rating, None).await {
        Ok(_) => {}
        Err(e) if is_duplicate_key(&e) => return Err(already_reviewed()),
        Err(e) => return Err(e.into()),
    }

    Ok(Json(ApiResponse::success("Rating Added Successfully", json!(rating))))
}

/// --------------------
/// Read
/// --------------------
#[openapi(tag = "Car Rating")]
#[get("/car-rating?<query..>")]
pub async fn get_all_ratings(
    db: &State<DbConn>,
    _admin: AdminGuard,
    query: ListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = paginate(
        &db.collection::<CarRating>(CAR_RATINGS),
        &RATING_LIST_SCHEMA,
        &query,
        Document::new(),
    )
    .await?;

    Ok(Json(ApiResponse::success("Ratings Retrieved", json!(page))))
}

#[openapi(tag = "Car Rating")]
#[get("/car-rating/<car_id>")]
pub async fn get_car_ratings(
    db: &State<DbConn>,
    car_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let car_id = parse_id(&car_id, "Car")?;
    let options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();

    let ratings: Vec<CarRating> = db
        .collection::<CarRating>(CAR_RATINGS)
        .find(doc! { "car_id": car_id }, options)
        .await?
        .try_collect()
        .await?;

    Ok(Json(ApiResponse::success("Ratings Retrieved", json!(ratings))))
}

#[openapi(tag = "Car Rating")]
#[delete("/car-rating/<rating_id>")]
pub async fn delete_rating(
    db: &State<DbConn>,
    auth: AuthGuard,
    rating_id: String,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let rating_id = parse_id(&rating_id, "Rating")?;
    let ratings = db.collection::<CarRating>(CAR_RATINGS);

    let rating = ratings
        .find_one(doc! { "_id": rating_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Rating Not Found"))?;

    if !auth.can_act_for(&rating.user_id) {
        return Err(ApiError::forbidden("You Can Only Delete Your Own Ratings"));
    }

    ratings.delete_one(doc! { "_id": rating_id }, None).await?;
    Ok(Json(ApiResponse::<()>::message("Rating Deleted Successfully")))
}
