use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

use crate::utils::pagination::{FieldKind, FilterField, FilterOp, ListSchema, SearchField};

pub const CAR_TYPES: &[&str] = &["SUV", "SEDAN", "HATCHBACK", "MUV", "LUXURY"];
pub const FUEL_TYPES: &[&str] = &["PETROL", "DIESEL", "ELECTRIC", "CNG", "HYBRID"];
pub const TRANSMISSION_TYPES: &[&str] = &["MANUAL", "AUTOMATIC"];

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema, FromFormField)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CarType {
    #[field(value = "SUV")]
    Suv,
    #[field(value = "SEDAN")]
    Sedan,
    #[field(value = "HATCHBACK")]
    Hatchback,
    #[field(value = "MUV")]
    Muv,
    #[field(value = "LUXURY")]
    Luxury,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema, FromFormField)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FuelType {
    #[field(value = "PETROL")]
    Petrol,
    #[field(value = "DIESEL")]
    Diesel,
    #[field(value = "ELECTRIC")]
    Electric,
    #[field(value = "CNG")]
    Cng,
    #[field(value = "HYBRID")]
    Hybrid,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema, FromFormField)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransmissionType {
    #[field(value = "MANUAL")]
    Manual,
    #[field(value = "AUTOMATIC")]
    Automatic,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct Car {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub id: Option<ObjectId>,
    pub model: String,
    #[serde(rename = "type")]
    pub car_type: CarType,
    pub fuel: FuelType,
    pub transmission: TransmissionType,
    pub price_per_day: f64,
    pub seats: i32,
    pub mileage: String,
    pub color: String,
    pub registration_no: String,
    /// Percentage applied on top of the rental price.
    pub gst: f64,
    /// Flat delivery charge added to every booking.
    pub logistic: f64,
    pub images: Vec<String>,
    pub is_available: bool,
    #[schemars(skip)]
    pub created_at: DateTime,
    #[schemars(skip)]
    pub updated_at: DateTime,
}

pub static CAR_LIST_SCHEMA: ListSchema = ListSchema {
    filters: &[
        FilterField { param: "type", field: "type", kind: FieldKind::Enum(CAR_TYPES), op: FilterOp::Eq },
        FilterField { param: "fuel", field: "fuel", kind: FieldKind::Enum(FUEL_TYPES), op: FilterOp::Eq },
        FilterField {
            param: "transmission",
            field: "transmission",
            kind: FieldKind::Enum(TRANSMISSION_TYPES),
            op: FilterOp::Eq,
        },
        FilterField { param: "seats", field: "seats", kind: FieldKind::Number, op: FilterOp::Eq },
        FilterField { param: "is_available", field: "is_available", kind: FieldKind::Bool, op: FilterOp::Eq },
        FilterField { param: "price_range", field: "price_per_day", kind: FieldKind::Number, op: FilterOp::Lte },
    ],
    search: &[
        SearchField { field: "model", kind: FieldKind::Text },
        SearchField { field: "color", kind: FieldKind::Text },
        SearchField { field: "registration_no", kind: FieldKind::Text },
        SearchField { field: "mileage", kind: FieldKind::Text },
        SearchField { field: "seats", kind: FieldKind::Number },
        SearchField { field: "price_per_day", kind: FieldKind::Number },
    ],
    sort_field: Some("price_per_day"),
};

/// Catalog entry as listed to customers.
#[derive(Debug, Serialize, JsonSchema)]
pub struct CarListItem {
    #[serde(flatten)]
    pub car: Car,
    pub liked: bool,
    pub average_rating: f64,
    pub total_ratings: usize,
    pub total_reviews: usize,
}

impl CarListItem {
    /// `ratings` are (score, comment) pairs for this car only.
    pub fn new(car: Car, liked: bool, ratings: &[(i32, String)]) -> Self {
        let total_ratings = ratings.len();
        let total_reviews = ratings.iter().filter(|(_, c)| !c.trim().is_empty()).count();
        let average_rating = if total_ratings > 0 {
            let sum: i32 = ratings.iter().map(|(r, _)| *r).sum();
            (sum as f64 / total_ratings as f64 * 10.0).round() / 10.0
        } else {
            0.0
        };

        CarListItem {
            car,
            liked,
            average_rating,
            total_ratings,
            total_reviews,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CarStats {
    pub active_cars: u64,
    pub inactive_cars: u64,
    pub avg_price: f64,
}

#[cfg(test)]
pub(crate) fn sample_car() -> Car {
    Car {
        id: Some(ObjectId::new()),
        model: "Hyundai Creta".into(),
        car_type: CarType::Suv,
        fuel: FuelType::Diesel,
        transmission: TransmissionType::Automatic,
        price_per_day: 100.0,
        seats: 5,
        mileage: "17 kmpl".into(),
        color: "White".into(),
        registration_no: "DL01AB1234".into(),
        gst: 18.0,
        logistic: 250.0,
        images: vec![],
        is_available: true,
        created_at: DateTime::now(),
        updated_at: DateTime::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrated_car_has_zero_average() {
        let item = CarListItem::new(sample_car(), false, &[]);
        assert_eq!(item.average_rating, 0.0);
        assert_eq!(item.total_ratings, 0);
        assert_eq!(item.total_reviews, 0);
    }

    #[test]
    fn average_is_rounded_to_one_decimal() {
        let ratings = vec![(5, "Great".to_string()), (4, "  ".to_string()), (4, String::new())];
        let item = CarListItem::new(sample_car(), true, &ratings);
        assert_eq!(item.average_rating, 4.3);
        assert_eq!(item.total_ratings, 3);
        assert_eq!(item.total_reviews, 1);
        assert!(item.liked);
    }

    #[test]
    fn car_enums_serialize_upper_case() {
        let body = serde_json::to_value(sample_car()).unwrap();
        assert_eq!(body["type"], "SUV");
        assert_eq!(body["fuel"], "DIESEL");
        assert_eq!(body["transmission"], "AUTOMATIC");
    }
}
