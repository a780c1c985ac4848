use rocket::request::{self, FromRequest, Request, Outcome};
use rocket::http::Status;
use mongodb::bson::oid::ObjectId;

// === OpenAPI (compatible with rocket_okapi 0.8.0 / 0.8.1) ===
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use rocket_okapi::r#gen::OpenApiGenerator;

use crate::models::UserRole;
use crate::services::{JwtService, TokenKind};

/// JWT-based authentication guard
pub struct AuthGuard {
    pub user_id: ObjectId,
    pub email: String,
    pub role: UserRole,
}

impl AuthGuard {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// The caller is `owner` or an admin.
    pub fn can_act_for(&self, owner: &ObjectId) -> bool {
        self.is_admin() || &self.user_id == owner
    }
}

fn bearer<'r>(req: &'r Request<'_>) -> Option<&'r str> {
    req.headers()
        .get_one("Authorization")
        .map(|value| value.trim_start_matches("Bearer ").trim())
        .filter(|token| !token.is_empty())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let Some(token) = bearer(req) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        match JwtService::verify(TokenKind::Access, token) {
            Ok(claims) => match claims.user_id() {
                Some(user_id) => Outcome::Success(AuthGuard {
                    user_id,
                    email: claims.email,
                    role: claims.role,
                }),
                None => Outcome::Error((Status::Unauthorized, ())),
            },
            Err(_) => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

/// Authenticated caller holding the ADMIN role.
pub struct AdminGuard {
    pub auth: AuthGuard,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.guard::<AuthGuard>().await {
            Outcome::Success(auth) if auth.is_admin() => Outcome::Success(AdminGuard { auth }),
            Outcome::Success(_) => Outcome::Error((Status::Forbidden, ())),
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(f) => Outcome::Forward(f),
        }
    }
}

/// Caller if a valid token was sent; never rejects.
pub struct OptionalAuth(pub Option<AuthGuard>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for OptionalAuth {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.guard::<AuthGuard>().await {
            Outcome::Success(auth) => Outcome::Success(OptionalAuth(Some(auth))),
            _ => Outcome::Success(OptionalAuth(None)),
        }
    }
}

/// === OpenAPI Integration ===
/// The guards don't contribute any header/parameter to the docs.
impl<'a> OpenApiFromRequest<'a> for AuthGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

impl<'a> OpenApiFromRequest<'a> for AdminGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

impl<'a> OpenApiFromRequest<'a> for OptionalAuth {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
