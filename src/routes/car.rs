use std::collections::{HashMap, HashSet};

use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};

use crate::db::{DbConn, BOOKINGS, CARS, CAR_RATINGS, LIKES};
use crate::guards::{AdminGuard, OptionalAuth};
use crate::models::{
    Car, CarListItem, CarRating, CarStats, CarType, FuelType, Like, TransmissionType, CAR_LIST_SCHEMA,
};
use crate::services::CloudinaryService;
use crate::utils::pagination::paginate;
use crate::utils::{parse_id, ApiError, ApiResponse, ListQuery, Page};

const MAX_IMAGES: usize = 10;

#[derive(FromForm)]
pub struct CarForm<'r> {
    pub model: String,
    #[field(name = "type")]
    pub car_type: CarType,
    pub fuel: FuelType,
    pub transmission: TransmissionType,
    pub price_per_day: f64,
    pub seats: i32,
    pub mileage: String,
    pub color: String,
    pub registration_no: String,
    pub gst: f64,
    pub logistic: f64,
    pub is_available: Option<bool>,
    pub images: Vec<TempFile<'r>>,
}

#[derive(FromForm)]
pub struct UpdateCarForm<'r> {
    pub model: Option<String>,
    #[field(name = "type")]
    pub car_type: Option<CarType>,
    pub fuel: Option<FuelType>,
    pub transmission: Option<TransmissionType>,
    pub price_per_day: Option<f64>,
    pub seats: Option<i32>,
    pub mileage: Option<String>,
    pub color: Option<String>,
    pub registration_no: Option<String>,
    pub gst: Option<f64>,
    pub logistic: Option<f64>,
    pub is_available: Option<bool>,
    pub images: Vec<TempFile<'r>>,
}

fn check_tariff(price_per_day: f64, seats: i32, gst: f64, logistic: f64) -> Result<(), ApiError> {
    if !(price_per_day > 0.0) {
        return Err(ApiError::bad_request("price_per_day must be positive"));
    }
    if seats <= 0 {
        return Err(ApiError::bad_request("seats must be positive"));
    }
    if !(0.0..=100.0).contains(&gst) {
        return Err(ApiError::bad_request("gst must be between 0 and 100"));
    }
    if !(logistic >= 0.0) {
        return Err(ApiError::bad_request("logistic cannot be negative"));
    }
    Ok(())
}

async fn upload_images(files: &[TempFile<'_>]) -> Result<Vec<String>, ApiError> {
    if files.len() > MAX_IMAGES {
        return Err(ApiError::bad_request(format!("At most {} images are allowed", MAX_IMAGES)));
    }
    if files.is_empty() {
        return Ok(Vec::new());
    }

    let cloudinary = CloudinaryService::from_config()?;
    let folder = CloudinaryService::folder("cars");
    let mut urls = Vec::with_capacity(files.len());
    for file in files {
        urls.push(cloudinary.upload_temp_file(file, &folder).await?);
    }
    Ok(urls)
}

async fn car_by_id(db: &DbConn, id: &ObjectId) -> Result<Car, ApiError> {
    db.collection::<Car>(CARS)
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Car Not Found"))
}

/// --------------------
/// Create car (admin)
/// --------------------
#[post("/car", data = "<form>")]
pub async fn add_car(
    db: &State<DbConn>,
    _admin: AdminGuard,
    form: Form<CarForm<'_>>,
) -> Result<Json<ApiResponse<Car>>, ApiError> {
    if form.model.trim().is_empty() || form.registration_no.trim().is_empty() {
        return Err(ApiError::bad_request("model and registration_no are required"));
    }
    check_tariff(form.price_per_day, form.seats, form.gst, form.logistic)?;

    let images = upload_images(&form.images).await?;
    let now = DateTime::now();
    let car = Car {
        id: Some(ObjectId::new()),
        model: form.model.trim().to_string(),
        car_type: form.car_type,
        fuel: form.fuel,
        transmission: form.transmission,
        price_per_day: form.price_per_day,
        seats: form.seats,
        mileage: form.mileage.trim().to_string(),
        color: form.color.trim().to_string(),
        registration_no: form.registration_no.trim().to_uppercase(),
        gst: form.gst,
        logistic: form.logistic,
        images,
        is_available: form.is_available.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };

    db.collection::<Car>(CARS).insert_one(&car, None).await?;
    info!("Car {} added", car.registration_no);

    Ok(Json(ApiResponse::success("Car Added Successfully", car)))
}

/// --------------------
/// Catalog
/// --------------------
#[openapi(tag = "Car")]
#[get("/car?<query..>")]
pub async fn get_all_cars(
    db: &State<DbConn>,
    auth: OptionalAuth,
    query: ListQuery,
) -> Result<Json<ApiResponse<Page<CarListItem>>>, ApiError> {
    let page = paginate(&db.collection::<Car>(CARS), &CAR_LIST_SCHEMA, &query, Document::new()).await?;
    let car_ids: Vec<ObjectId> = page.data.iter().filter_map(|c| c.id).collect();

    let ratings: Vec<CarRating> = db
        .collection::<CarRating>(CAR_RATINGS)
        .find(doc! { "car_id": { "$in": car_ids.clone() } }, None)
        .await?
        .try_collect()
        .await?;

    let mut by_car: HashMap<ObjectId, Vec<(i32, String)>> = HashMap::new();
    for rating in ratings {
        by_car.entry(rating.car_id).or_default().push((rating.rating, rating.comment));
    }

    let liked: HashSet<ObjectId> = match &auth.0 {
        Some(user) => db
            .collection::<Like>(LIKES)
            .find(doc! { "user_id": user.user_id, "car_id": { "$in": car_ids } }, None)
            .await?
            .try_collect::<Vec<Like>>()
            .await?
            .into_iter()
            .map(|like| like.car_id)
            .collect(),
        None => HashSet::new(),
    };

    let page = page.map(|car| {
        let ratings = car.id.and_then(|id| by_car.get(&id)).map(Vec::as_slice).unwrap_or(&[]);
        let is_liked = car.id.is_some_and(|id| liked.contains(&id));
        CarListItem::new(car, is_liked, ratings)
    });

    Ok(Json(ApiResponse::success("Cars Retrieved", page)))
}

#[openapi(tag = "Car")]
#[get("/car/stats")]
pub async fn car_stats(
    db: &State<DbConn>,
    _admin: AdminGuard,
) -> Result<Json<ApiResponse<CarStats>>, ApiError> {
    let cars = db.collection::<Car>(CARS);
    let active_cars = cars.count_documents(doc! { "is_available": true }, None).await?;
    let inactive_cars = cars.count_documents(doc! { "is_available": false }, None).await?;

    let rows: Vec<Document> = db
        .collection::<Document>(CARS)
        .aggregate(
            vec![doc! { "$group": { "_id": null, "avg_price": { "$avg": "$price_per_day" } } }],
            None,
        )
        .await?
        .try_collect()
        .await?;

    let avg_price = rows
        .first()
        .and_then(|row| row.get_f64("avg_price").ok())
        .map(crate::utils::round2)
        .unwrap_or(0.0);

    Ok(Json(ApiResponse::success(
        "Car Stats Retrieved",
        CarStats { active_cars, inactive_cars, avg_price },
    )))
}

#[openapi(tag = "Car")]
#[get("/car/<id>", rank = 2)]
pub async fn get_car(
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<Car>>, ApiError> {
    let car = car_by_id(db, &parse_id(&id, "Car")?).await?;
    Ok(Json(ApiResponse::success("Car Retrieved", car)))
}

/// --------------------
/// Update / delete (admin)
/// --------------------
#[patch("/car/<id>", data = "<form>")]
pub async fn update_car(
    db: &State<DbConn>,
    _admin: AdminGuard,
    id: String,
    form: Form<UpdateCarForm<'_>>,
) -> Result<Json<ApiResponse<Car>>, ApiError> {
    let car_id = parse_id(&id, "Car")?;
    let mut car = car_by_id(db, &car_id).await?;

    if let Some(model) = form.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        car.model = model.to_string();
    }
    if let Some(car_type) = form.car_type {
        car.car_type = car_type;
    }
    if let Some(fuel) = form.fuel {
        car.fuel = fuel;
    }
    if let Some(transmission) = form.transmission {
        car.transmission = transmission;
    }
    if let Some(mileage) = &form.mileage {
        car.mileage = mileage.trim().to_string();
    }
    if let Some(color) = &form.color {
        car.color = color.trim().to_string();
    }
    if let Some(registration_no) = form.registration_no.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        car.registration_no = registration_no.to_uppercase();
    }
    car.price_per_day = form.price_per_day.unwrap_or(car.price_per_day);
    car.seats = form.seats.unwrap_or(car.seats);
    car.gst = form.gst.unwrap_or(car.gst);
    car.logistic = form.logistic.unwrap_or(car.logistic);
    car.is_available = form.is_available.unwrap_or(car.is_available);
    check_tariff(car.price_per_day, car.seats, car.gst, car.logistic)?;

    // new images replace the old set only when some were sent
    if !form.images.is_empty() {
        car.images = upload_images(&form.images).await?;
    }
    car.updated_at = DateTime::now();

    db.collection::<Car>(CARS)
        .replace_one(doc! { "_id": car_id }, &car, None)
        .await?;

    Ok(Json(ApiResponse::success("Car Updated Successfully", car)))
}

#[openapi(tag = "Car")]
#[delete("/car/<id>")]
pub async fn delete_car(
    db: &State<DbConn>,
    _admin: AdminGuard,
    id: String,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let car_id = parse_id(&id, "Car")?;
    car_by_id(db, &car_id).await?;

    let bookings = db
        .collection::<Document>(BOOKINGS)
        .count_documents(doc! { "booked_car_id": car_id }, None)
        .await?;
    if bookings > 0 {
        return Err(ApiError::bad_request("Car Has Bookings, Mark It Unavailable Instead"));
    }

    db.collection::<Car>(CARS).delete_one(doc! { "_id": car_id }, None).await?;
    db.collection::<Like>(LIKES).delete_many(doc! { "car_id": car_id }, None).await?;
    db.collection::<CarRating>(CAR_RATINGS).delete_many(doc! { "car_id": car_id }, None).await?;
    info!("Car {} deleted", car_id);

    Ok(Json(ApiResponse::<()>::message("Car Deleted Successfully")))
}
