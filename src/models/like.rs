use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

/// A stored pair means the user has the car in their wishlist.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Like {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub car_id: ObjectId,
    pub created_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LikeDto {
    pub car_id: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct LikeState {
    pub liked: bool,
}
