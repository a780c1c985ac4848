use log::error;
use rocket_okapi::okapi::Map;
use serde::{Deserialize, Serialize};
use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::Request;
use std::io::Cursor;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::response::OpenApiResponderInner;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{MediaType, Response as OpenApiResponse, Responses};

const GENERIC_FAILURE: &str = "Something Went Wrong";

/// -----------------------------
/// Response envelope
/// -----------------------------
///
/// `error` is 0 on success and 1 on failure; `status` mirrors it as text.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ApiResponse<T> {
    pub error: u8,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            error: 0,
            status: "success".to_string(),
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        ApiResponse {
            error: 0,
            status: "success".to_string(),
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            error: 1,
            status: "failed".to_string(),
            message: Some(message.into()),
            data: None,
        }
    }
}

/// -----------------------------
/// API Error
/// -----------------------------
#[derive(Debug, Serialize, JsonSchema)]
pub struct ApiError {
    #[schemars(skip)]
    #[serde(skip_serializing)]
    pub status: Status,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::BadRequest,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::Unauthorized,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::Forbidden,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::NotFound,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::Conflict,
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::InternalServerError,
            message: message.into(),
        }
    }

    /// Internal failure whose cause is logged but not shown to the client.
    pub fn internal(context: &str, cause: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, cause);
        Self::internal_error(GENERIC_FAILURE)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.status.code)
    }
}

impl From<mongodb::error::Error> for ApiError {
    fn from(e: mongodb::error::Error) -> Self {
        ApiError::internal("Database error", e)
    }
}

impl From<mongodb::bson::ser::Error> for ApiError {
    fn from(e: mongodb::bson::ser::Error) -> Self {
        ApiError::internal("BSON serialization error", e)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

/// -----------------------------
/// Rocket Responder
/// -----------------------------
impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let body = serde_json::to_string(&ApiResponse::<()>::error(self.message))
            .unwrap_or_else(|_| r#"{"error":1,"status":"failed","message":"Internal error"}"#.to_string());

        Response::build()
            .status(self.status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

/// -----------------------------
/// OpenAPI integration
/// -----------------------------
impl OpenApiResponderInner for ApiError {
    fn responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let schema = generator.json_schema::<ApiResponse<()>>();

        let mut content = Map::new();
        content.insert(
            "application/json".to_owned(),
            MediaType {
                schema: Some(schema),
                ..Default::default()
            },
        );

        let mut responses = Responses::default();

        for (code, description) in [
            ("400", "Bad request"),
            ("401", "Unauthorized"),
            ("403", "Forbidden"),
            ("404", "Not found"),
            ("409", "Conflict"),
            ("500", "Internal server error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                rocket_okapi::okapi::openapi3::RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    content: content.clone(),
                    ..Default::default()
                }),
            );
        }

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_has_error_zero() {
        let body = serde_json::to_value(ApiResponse::success("Car Retrieved", 5)).unwrap();
        assert_eq!(body["error"], 0);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Car Retrieved");
        assert_eq!(body["data"], 5);
    }

    #[test]
    fn message_envelope_omits_data() {
        let body = serde_json::to_value(ApiResponse::<()>::message("Signout Successful")).unwrap();
        assert!(body.get("data").is_none());
    }

    #[test]
    fn error_envelope_is_failed() {
        let body = serde_json::to_value(ApiResponse::<()>::error("Booking Not Found")).unwrap();
        assert_eq!(body["error"], 1);
        assert_eq!(body["status"], "failed");
        assert_eq!(body["message"], "Booking Not Found");
    }

    #[test]
    fn internal_hides_cause() {
        let err = ApiError::internal("Gateway", "secret leaked in message");
        assert_eq!(err.status, Status::InternalServerError);
        assert_eq!(err.message, GENERIC_FAILURE);
    }
}
