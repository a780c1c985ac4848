use rocket::serde::json::Json;
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::options::FindOptions;
use serde_json::json;
use validator::Validate;

use crate::db::{DbConn, ADDRESSES};
use crate::guards::AuthGuard;
use crate::models::{Address, AddressDto, UpdateAddressDto};
use crate::utils::{parse_id, ApiError, ApiResponse};

/// Loads an address the caller owns; 404 when missing, 403 for someone else's.
async fn owned_address(db: &DbConn, auth: &AuthGuard, id: &str) -> Result<Address, ApiError> {
    let address_id = parse_id(id, "Address")?;
    let address = db
        .collection::<Address>(ADDRESSES)
        .find_one(doc! { "_id": address_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Address Not Found"))?;

    if address.user_id != auth.user_id {
        return Err(ApiError::forbidden("You Can Only Access Your Own Addresses"));
    }
    Ok(address)
}

fn clean(value: &str) -> String {
    value.trim().to_string()
}

#[openapi(tag = "Address")]
#[post("/address", data = "<dto>")]
pub async fn create_address(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<AddressDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;

    let now = DateTime::now();
    let address = Address {
        id: Some(ObjectId::new()),
        user_id: auth.user_id,
        label: dto.label,
        street: clean(&dto.street),
        city: clean(&dto.city),
        state: clean(&dto.state),
        pincode: clean(&dto.pincode),
        landmark: dto.landmark.as_deref().map(clean).filter(|l| !l.is_empty()),
        created_at: now,
        updated_at: now,
    };

    db.collection::<Address>(ADDRESSES).insert_one(&address, None).await?;
    Ok(Json(ApiResponse::success("Address Added Successfully", json!(address))))
}

#[openapi(tag = "Address")]
#[get("/address")]
pub async fn get_addresses(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
    let addresses: Vec<Address> = db
        .collection::<Address>(ADDRESSES)
        .find(doc! { "user_id": auth.user_id }, options)
        .await?
        .try_collect()
        .await?;

    Ok(Json(ApiResponse::success("Addresses Retrieved", json!(addresses))))
}

#[openapi(tag = "Address")]
#[get("/address/<id>")]
pub async fn get_address(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let address = owned_address(db, &auth, &id).await?;
    Ok(Json(ApiResponse::success("Address Retrieved", json!(address))))
}

#[openapi(tag = "Address")]
#[patch("/address/<id>", data = "<dto>")]
pub async fn update_address(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
    dto: Json<UpdateAddressDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;
    let mut address = owned_address(db, &auth, &id).await?;
    let dto = dto.into_inner();

    if let Some(label) = dto.label {
        address.label = label;
    }
    if let Some(street) = dto.street {
        address.street = clean(&street);
    }
    if let Some(city) = dto.city {
        address.city = clean(&city);
    }
    if let Some(state) = dto.state {
        address.state = clean(&state);
    }
    if let Some(pincode) = dto.pincode {
        address.pincode = clean(&pincode);
    }
    if let Some(landmark) = dto.landmark {
        // an empty landmark clears it
        address.landmark = Some(clean(&landmark)).filter(|l| !l.is_empty());
    }
    address.updated_at = DateTime::now();

    db.collection::<Address>(ADDRESSES)
        .replace_one(doc! { "_id": address.id }, &address, None)
        .await?;

    Ok(Json(ApiResponse::success("Address Updated Successfully", json!(address))))
}

#[openapi(tag = "Address")]
#[delete("/address/<id>")]
pub async fn delete_address(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let address = owned_address(db, &auth, &id).await?;

    db.collection::<Address>(ADDRESSES)
        .delete_one(doc! { "_id": address.id }, None)
        .await?;

    Ok(Json(ApiResponse::<()>::message("Address Deleted Successfully")))
}
