use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use crate::utils::ApiError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    User,
    Admin,
    Agent,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "USER",
            UserRole::Admin => "ADMIN",
            UserRole::Agent => "AGENT",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub license_no: Option<String>,
    pub experience: Option<String>,
    pub profile_img: Option<String>,
    pub identity_proof: Option<String>,
    pub is_verify: bool,
    pub otp: String,
    pub expiry_time: Option<DateTime>,
    /// Hex SHA-256 of the live refresh token; empty when signed out.
    pub rt_hash: String,
    /// Agents with this flag set take part in delivery assignment.
    pub is_active: bool,
    pub agent_profile_complete: bool,
    pub tc_agree: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Checks an email verification code against the stored one.
    pub fn check_verification_code(&self, code: &str, now: DateTime) -> Result<(), ApiError> {
        if self.is_verify {
            return Err(ApiError::bad_request("User Already Verified"));
        }
        if self.otp.is_empty() || self.otp != code.trim() {
            return Err(ApiError::bad_request("Invalid OTP"));
        }
        match self.expiry_time {
            Some(expiry) if expiry >= now => Ok(()),
            _ => Err(ApiError::bad_request("OTP Has Expired")),
        }
    }

    /// State after a successful verification.
    pub fn mark_verified(&mut self) {
        self.is_verify = true;
        self.otp.clear();
        self.expiry_time = None;
    }

    /// Whether the fields an agent needs before taking deliveries are all set.
    pub fn has_complete_agent_profile(&self) -> bool {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
        }

        present(&self.license_no)
            && present(&self.experience)
            && present(&self.identity_proof)
            && present(&self.profile_img)
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct SignupDto {
    #[validate(length(min = 1, message = "first_name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "last_name is required"))]
    pub last_name: String,
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct VerifyCodeDto {
    #[validate(length(equal = 6, message = "code must be 6 digits"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct SigninDto {
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RefreshTokenDto {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct ChangePasswordDto {
    #[validate(length(min = 1, message = "old_password is required"))]
    pub old_password: String,
    #[validate(length(min = 6, message = "new_password must be at least 6 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct ForgotPasswordDto {
    #[validate(email(message = "Invalid email"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct ResetPasswordDto {
    #[validate(length(min = 6, message = "new_password must be at least 6 characters"))]
    pub new_password: String,
}

/// User without credentials or verification secrets.
#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct UserResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub license_no: Option<String>,
    pub experience: Option<String>,
    pub profile_img: Option<String>,
    pub identity_proof: Option<String>,
    pub is_verify: bool,
    pub is_active: bool,
    pub agent_profile_complete: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: user.role,
            phone: user.phone,
            license_no: user.license_no,
            experience: user.experience,
            profile_img: user.profile_img,
            identity_proof: user.identity_proof,
            is_verify: user.is_verify,
            is_active: user.is_active,
            agent_profile_complete: user.agent_profile_complete,
        }
    }
}

/// Short form returned after signin / refresh.
#[derive(Debug, Serialize, JsonSchema)]
pub struct SessionUser {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: UserRole,
    pub agent_profile_complete: bool,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        SessionUser {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            role: user.role,
            agent_profile_complete: user.agent_profile_complete,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_user() -> User {
    let now = DateTime::now();
    User {
        id: Some(ObjectId::new()),
        first_name: "Asha".into(),
        last_name: "Rao".into(),
        email: "asha@example.com".into(),
        password: "hash".into(),
        role: UserRole::User,
        phone: None,
        license_no: None,
        experience: None,
        profile_img: None,
        identity_proof: None,
        is_verify: false,
        otp: "042917".into(),
        expiry_time: Some(DateTime::from_millis(now.timestamp_millis() + 10 * 60 * 1000)),
        rt_hash: String::new(),
        is_active: false,
        agent_profile_complete: false,
        tc_agree: true,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_succeeds_exactly_once() {
        let mut user = sample_user();
        let now = DateTime::now();

        assert!(user.check_verification_code("042917", now).is_ok());
        user.mark_verified();

        let err = user.check_verification_code("042917", now).unwrap_err();
        assert_eq!(err.message, "User Already Verified");
    }

    #[test]
    fn wrong_code_is_rejected() {
        let user = sample_user();
        let err = user.check_verification_code("123456", DateTime::now()).unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);
        assert_eq!(err.message, "Invalid OTP");
    }

    #[test]
    fn expired_code_is_rejected() {
        let user = sample_user();
        let later = DateTime::from_millis(DateTime::now().timestamp_millis() + 11 * 60 * 1000);
        let err = user.check_verification_code("042917", later).unwrap_err();
        assert_eq!(err.message, "OTP Has Expired");
    }

    #[test]
    fn agent_profile_needs_all_four_fields() {
        let mut user = sample_user();
        user.license_no = Some("DL-0420110012345".into());
        user.experience = Some("4 years".into());
        user.profile_img = Some("https://cdn/p.jpg".into());
        assert!(!user.has_complete_agent_profile());

        user.identity_proof = Some("https://cdn/id.jpg".into());
        assert!(user.has_complete_agent_profile());

        user.experience = Some("  ".into());
        assert!(!user.has_complete_agent_profile());
    }

    #[test]
    fn response_drops_secrets() {
        let user = sample_user();
        let body = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert!(body.get("password").is_none());
        assert!(body.get("otp").is_none());
        assert!(body.get("rt_hash").is_none());
        assert_eq!(body["role"], "USER");
    }
}
