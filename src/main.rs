#[macro_use]
extern crate rocket;

mod config;
mod db;
mod guards;
mod models;
mod routes;
mod services;
mod utils;

use std::io::Cursor;

use data_encoding::BASE64;
use dotenvy::dotenv;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Status};
use rocket::serde::json::Json;
use rocket::{Build, Request, Response, Rocket};
use rocket_okapi::openapi_get_routes;
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};

use crate::config::Config;
use crate::utils::ApiResponse;

/* ----------------------------- CORS ----------------------------- */

pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if let Some(origin) = request.headers().get_one("Origin") {
            response.set_header(Header::new("Access-Control-Allow-Origin", origin));
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, PATCH, DELETE, OPTIONS",
        ));

        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));

        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/* ----------------------------- DOCS AUTH ----------------------------- */

const DOCS_PATHS: [&str; 2] = ["/api/docs", "/api/v1/openapi.json"];

/// `Authorization: Basic ..` matches the configured docs credentials.
/// Docs stay closed while either credential is unset.
fn docs_authorized(header: Option<&str>, user: Option<&str>, password: Option<&str>) -> bool {
    let (Some(user), Some(password)) = (user, password) else {
        return false;
    };
    let Some(encoded) = header.and_then(|h| h.strip_prefix("Basic ")) else {
        return false;
    };
    let Ok(decoded) = BASE64.decode(encoded.trim().as_bytes()) else {
        return false;
    };
    decoded == format!("{}:{}", user, password).as_bytes()
}

pub struct DocsAuth;

#[rocket::async_trait]
impl Fairing for DocsAuth {
    fn info(&self) -> Info {
        Info {
            name: "Swagger basic auth",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let path = request.uri().path();
        if !DOCS_PATHS.iter().any(|docs| path.as_str().starts_with(docs)) {
            return;
        }

        let user = Config::swagger_user();
        let password = Config::swagger_password();
        if docs_authorized(
            request.headers().get_one("Authorization"),
            user.as_deref(),
            password.as_deref(),
        ) {
            return;
        }

        let body = "Authentication required";
        response.set_status(Status::Unauthorized);
        response.set_header(Header::new("WWW-Authenticate", "Basic realm=\"DriveEasy API Docs\""));
        response.set_header(rocket::http::ContentType::Plain);
        response.set_sized_body(body.len(), Cursor::new(body));
    }
}

/* ----------------------------- OPTIONS ----------------------------- */

#[options("/<_..>")]
fn options_handler() {}

/* ----------------------------- ERRORS ----------------------------- */

#[catch(401)]
fn unauthorized() -> Json<ApiResponse<()>> {
    Json(ApiResponse::<()>::error("Unauthorized"))
}

#[catch(403)]
fn forbidden() -> Json<ApiResponse<()>> {
    Json(ApiResponse::<()>::error("Forbidden resource"))
}

#[catch(404)]
fn not_found() -> Json<ApiResponse<()>> {
    Json(ApiResponse::<()>::error("Resource not found (check /api/v1 prefix)"))
}

#[catch(422)]
fn unprocessable() -> Json<ApiResponse<()>> {
    Json(ApiResponse::<()>::error("Malformed request body"))
}

#[catch(500)]
fn internal_error() -> Json<ApiResponse<()>> {
    Json(ApiResponse::<()>::error("Internal server error"))
}

/* ----------------------------- SWAGGER ----------------------------- */

fn swagger_config() -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: "/api/v1/openapi.json".to_string(),
        ..Default::default()
    }
}

/* ----------------------------- LAUNCH ----------------------------- */

#[launch]
fn rocket() -> Rocket<Build> {
    dotenv().ok();
    env_logger::init();

    info!("DriveEasy API starting");
    info!("Swagger UI at /api/docs");

    rocket::build()
        .attach(db::init())
        .attach(CORS)
        .attach(DocsAuth)
        .mount("/", routes![options_handler])
        .mount(
            "/api/v1",
            openapi_get_routes![
                // Auth
                routes::auth::signup,
                routes::auth::verify_code,
                routes::auth::resend_code,
                routes::auth::signin,
                routes::auth::refresh_token,
                routes::auth::logout,
                routes::auth::change_password,
                routes::auth::forgot_password,
                routes::auth::reset_password,
                routes::auth::get_user,
                routes::auth::get_all_users,
                // Car
                routes::car::get_all_cars,
                routes::car::car_stats,
                routes::car::get_car,
                routes::car::delete_car,
                // Booking
                routes::booking::create_booking,
                routes::booking::get_user_bookings,
                routes::booking::get_booking,
                routes::booking::get_all_bookings,
                routes::booking::cancel_booking,
                routes::booking::start_trip,
                routes::booking::complete_trip,
                // Payment
                routes::payment::create_order,
                routes::payment::verify_payment,
                routes::payment::refund_payment,
                // Invoice
                routes::invoice::create_invoice,
                // Like
                routes::like::like_car,
                routes::like::get_likes,
                routes::like::remove_like,
                // Car rating
                routes::car_rating::create_rating,
                routes::car_rating::get_all_ratings,
                routes::car_rating::get_car_ratings,
                routes::car_rating::delete_rating,
                // Address
                routes::address::create_address,
                routes::address::get_addresses,
                routes::address::get_address,
                routes::address::update_address,
                routes::address::delete_address,
            ],
        )
        // multipart uploads, not described in the OpenAPI document
        .mount(
            "/api/v1",
            routes![
                routes::auth::update_profile,
                routes::car::add_car,
                routes::car::update_car,
            ],
        )
        .mount("/api/docs", make_swagger_ui(&swagger_config()))
        .register("/", catchers![unauthorized, forbidden, not_found, unprocessable, internal_error])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::local::blocking::Client;

    fn basic(credentials: &str) -> String {
        format!("Basic {}", BASE64.encode(credentials.as_bytes()))
    }

    #[test]
    fn docs_require_matching_credentials() {
        let header = basic("docs:hunter2");
        assert!(docs_authorized(Some(&header), Some("docs"), Some("hunter2")));
        assert!(!docs_authorized(Some(&header), Some("docs"), Some("other")));
        assert!(!docs_authorized(Some("Bearer abc"), Some("docs"), Some("hunter2")));
        assert!(!docs_authorized(None, Some("docs"), Some("hunter2")));
    }

    #[test]
    fn docs_are_closed_without_configured_credentials() {
        let header = basic("docs:hunter2");
        assert!(!docs_authorized(Some(&header), None, Some("hunter2")));
        assert!(!docs_authorized(Some(&header), Some("docs"), None));
    }

    #[get("/ping")]
    fn ping() -> &'static str {
        "pong"
    }

    #[test]
    fn docs_auth_only_guards_docs_paths() {
        let rocket = rocket::build()
            .attach(DocsAuth)
            .mount("/api/docs", routes![ping])
            .mount("/api/v1", routes![ping]);
        let client = Client::tracked(rocket).unwrap();

        let open = client.get("/api/v1/ping").dispatch();
        assert_eq!(open.status(), Status::Ok);

        if Config::swagger_user().is_none() || Config::swagger_password().is_none() {
            let closed = client.get("/api/docs/ping").dispatch();
            assert_eq!(closed.status(), Status::Unauthorized);
            assert!(closed.headers().get_one("WWW-Authenticate").is_some());
        }
    }
}
