use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use crate::utils::pagination::{FieldKind, ListSchema, SearchField};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CarRating {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub car_id: ObjectId,
    pub rating: i32, // 1-5
    pub comment: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateRatingDto {
    pub car_id: String,
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: i32,
    #[serde(default)]
    #[validate(length(max = 1000, message = "comment is too long"))]
    pub comment: String,
}

pub static RATING_LIST_SCHEMA: ListSchema = ListSchema {
    filters: &[],
    search: &[
        SearchField { field: "comment", kind: FieldKind::Text },
        SearchField { field: "rating", kind: FieldKind::Number },
    ],
    sort_field: Some("rating"),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_must_be_one_to_five() {
        let dto = |rating| CreateRatingDto { car_id: String::new(), rating, comment: String::new() };
        assert!(dto(0).validate().is_err());
        assert!(dto(6).validate().is_err());
        assert!(dto(1).validate().is_ok());
        assert!(dto(5).validate().is_ok());
    }
}
