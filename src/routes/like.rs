use std::collections::HashMap;

use rocket::serde::json::Json;
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::FindOptions;
use serde_json::json;

use crate::db::{DbConn, CARS, LIKES};
use crate::guards::AuthGuard;
use crate::models::{Car, Like, LikeDto, LikeState};
use crate::services::wishlist::toggle_like;
use crate::utils::{parse_id, ApiError, ApiResponse};

/// --------------------
/// Toggle
/// --------------------
#[openapi(tag = "Like")]
#[post("/like", data = "<dto>")]
pub async fn like_car(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<LikeDto>,
) -> Result<Json<ApiResponse<LikeState>>, ApiError> {
    let car_id = parse_id(&dto.car_id, "Car")?;
    let exists = db
        .collection::<Car>(CARS)
        .count_documents(doc! { "_id": car_id }, None)
        .await?;
    if exists == 0 {
        return Err(ApiError::not_found("Car Not Found"));
    }

    let liked = toggle_like(db.inner(), auth.user_id, car_id).await?;
    let message = if liked { "Car Added To Wishlist" } else { "Car Removed From Wishlist" };

    Ok(Json(ApiResponse::success(message, LikeState { liked })))
}

/// --------------------
/// Wishlist
/// --------------------
#[openapi(tag = "Like")]
#[get("/like")]
pub async fn get_likes(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
    let likes: Vec<Like> = db
        .collection::<Like>(LIKES)
        .find(doc! { "user_id": auth.user_id }, options)
        .await?
        .try_collect()
        .await?;

    let car_ids: Vec<ObjectId> = likes.iter().map(|like| like.car_id).collect();
    let cars: HashMap<ObjectId, Car> = db
        .collection::<Car>(CARS)
        .find(doc! { "_id": { "$in": car_ids } }, None)
        .await?
        .try_collect::<Vec<Car>>()
        .await?
        .into_iter()
        .filter_map(|car| car.id.map(|id| (id, car)))
        .collect();

    let wishlist: Vec<serde_json::Value> = likes
        .into_iter()
        .filter_map(|like| {
            let car = cars.get(&like.car_id)?;
            Some(json!({
                "like_id": like.id.map(|id| id.to_hex()),
                "liked_at": like.created_at.try_to_rfc3339_string().ok(),
                "car": car,
            }))
        })
        .collect();

    Ok(Json(ApiResponse::success("Wishlist Retrieved", json!(wishlist))))
}

#[openapi(tag = "Like")]
#[delete("/like/<id>")]
pub async fn remove_like(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let like_id = parse_id(&id, "Like")?;
    let likes = db.collection::<Like>(LIKES);

    let like = likes
        .find_one(doc! { "_id": like_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Like Not Found"))?;

    if like.user_id != auth.user_id {
        return Err(ApiError::forbidden("You Can Only Remove Your Own Likes"));
    }

    likes.delete_one(doc! { "_id": like_id }, None).await?;
    Ok(Json(ApiResponse::<()>::message("Car Removed From Wishlist")))
}
