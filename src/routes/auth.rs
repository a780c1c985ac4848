use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::FindOptions;
use serde_json::json;
use validator::Validate;

use crate::config::Config;
use crate::db::{DbConn, USERS};
use crate::guards::{AdminGuard, AuthGuard};
use crate::models::{
    ChangePasswordDto, ForgotPasswordDto, RefreshTokenDto, ResetPasswordDto, SessionUser,
    SigninDto, SignupDto, User, UserResponse, UserRole, VerifyCodeDto,
};
use crate::services::{CloudinaryService, EmailService, JwtService, TokenKind};
use crate::utils::{generate_otp, parse_id, validate_mobile, ApiError, ApiResponse};

const OTP_TTL_MS: i64 = 10 * 60 * 1000;
const BCRYPT_COST: u32 = 10;

fn hash_password(password: &str) -> Result<String, ApiError> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| ApiError::internal("Password hashing", e))
}

fn password_matches(password: &str, hash: &str) -> Result<bool, ApiError> {
    bcrypt::verify(password, hash).map_err(|e| ApiError::internal("Password verification", e))
}

fn otp_expiry() -> DateTime {
    DateTime::from_millis(DateTime::now().timestamp_millis() + OTP_TTL_MS)
}

fn token_error(e: jsonwebtoken::errors::Error) -> ApiError {
    ApiError::internal("JWT encoding", e)
}

async fn find_user(db: &DbConn, filter: Document) -> Result<Option<User>, ApiError> {
    Ok(db.collection::<User>(USERS).find_one(filter, None).await?)
}

async fn user_by_id(db: &DbConn, user_id: &ObjectId) -> Result<User, ApiError> {
    find_user(db, doc! { "_id": user_id })
        .await?
        .ok_or_else(|| ApiError::not_found("User Not Found"))
}

/// Issues an access/refresh pair and stores the refresh fingerprint.
async fn open_session(db: &DbConn, user: &User) -> Result<(String, String), ApiError> {
    let user_id = user
        .id
        .ok_or_else(|| ApiError::internal("Session", "user without id"))?;

    let access_token = JwtService::generate_access_token(&user_id, &user.email, user.role).map_err(token_error)?;
    let refresh_token = JwtService::generate_refresh_token(&user_id, &user.email, user.role).map_err(token_error)?;

    db.collection::<User>(USERS)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": {
                "rt_hash": JwtService::fingerprint(&refresh_token),
                "updated_at": DateTime::now(),
            }},
            None,
        )
        .await?;

    Ok((access_token, refresh_token))
}

/// --------------------
/// Signup
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/signup", data = "<dto>")]
pub async fn signup(
    db: &State<DbConn>,
    dto: Json<SignupDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;

    let role = dto.role.unwrap_or(UserRole::User);
    if role == UserRole::Admin {
        return Err(ApiError::forbidden("Admin accounts cannot be self-registered"));
    }

    let email = dto.email.trim().to_lowercase();
    let existing = find_user(db, doc! { "email": &email }).await?;
    if existing.as_ref().map(|u| u.is_verify).unwrap_or(false) {
        return Err(ApiError::conflict("Email Already Exists"));
    }

    let password = hash_password(&dto.password)?;
    let otp = generate_otp();
    let expiry = otp_expiry();
    let now = DateTime::now();

    let user = match existing {
        // unverified signup again: take over the pending record
        Some(mut user) => {
            user.first_name = dto.first_name.trim().to_string();
            user.last_name = dto.last_name.trim().to_string();
            user.password = password;
            user.role = role;
            user.otp = otp.clone();
            user.expiry_time = Some(expiry);
            user.updated_at = now;

            db.collection::<User>(USERS)
                .update_one(
                    doc! { "_id": user.id },
                    doc! { "$set": {
                        "first_name": &user.first_name,
                        "last_name": &user.last_name,
                        "password": &user.password,
                        "role": role.as_str(),
                        "otp": &otp,
                        "expiry_time": expiry,
                        "updated_at": now,
                    }},
                    None,
                )
                .await?;
            user
        }
        None => {
            let user = User {
                id: Some(ObjectId::new()),
                first_name: dto.first_name.trim().to_string(),
                last_name: dto.last_name.trim().to_string(),
                email: email.clone(),
                password,
                role,
                phone: None,
                license_no: None,
                experience: None,
                profile_img: None,
                identity_proof: None,
                is_verify: false,
                otp: otp.clone(),
                expiry_time: Some(expiry),
                rt_hash: String::new(),
                is_active: false,
                agent_profile_complete: false,
                tc_agree: true,
                created_at: now,
                updated_at: now,
            };

            match db.collection::<User>(USERS).insert_one(&user, None).await {
                Ok(_) => user,
                Err(e) if crate::db::is_duplicate_key(&e) => {
                    return Err(ApiError::conflict("Email Already Exists"));
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    let user_id = user.id.ok_or_else(|| ApiError::internal("Signup", "user without id"))?;
    let token = JwtService::issue(TokenKind::Verify, &user_id, &user.email, user.role).map_err(token_error)?;

    EmailService::send_verification_email(&user.email, &otp, &user.full_name()).await;
    info!("Signup pending verification for {}", user.email);

    Ok(Json(ApiResponse::success(
        "Verification Code Sent To Your Email",
        json!({ "user": UserResponse::from(user), "token": token }),
    )))
}

/// --------------------
/// Verify signup code
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/verify-code/<token>", data = "<dto>")]
pub async fn verify_code(
    db: &State<DbConn>,
    token: String,
    dto: Json<VerifyCodeDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;

    let claims = JwtService::verify(TokenKind::Verify, &token)
        .map_err(|_| ApiError::bad_request("Invalid or Expired Token"))?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::bad_request("Invalid or Expired Token"))?;

    let mut user = user_by_id(db, &user_id).await?;
    user.check_verification_code(&dto.code, DateTime::now())?;
    user.mark_verified();

    let result = db
        .collection::<User>(USERS)
        .update_one(
            doc! { "_id": user_id, "is_verify": false },
            doc! {
                "$set": { "is_verify": true, "otp": "", "updated_at": DateTime::now() },
                "$unset": { "expiry_time": "" },
            },
            None,
        )
        .await?;

    if result.modified_count == 0 {
        return Err(ApiError::bad_request("User Already Verified"));
    }

    EmailService::send_welcome_email(&user.email, &user.full_name()).await;

    Ok(Json(ApiResponse::success(
        "Email Verified Successfully",
        json!(UserResponse::from(user)),
    )))
}

/// --------------------
/// Resend signup code
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/resend-code/<token>")]
pub async fn resend_code(
    db: &State<DbConn>,
    token: String,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let claims = JwtService::verify(TokenKind::Verify, &token)
        .map_err(|_| ApiError::bad_request("Invalid or Expired Token"))?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::bad_request("Invalid or Expired Token"))?;

    let user = user_by_id(db, &user_id).await?;
    if user.is_verify {
        return Err(ApiError::bad_request("User Already Verified"));
    }

    let otp = generate_otp();
    db.collection::<User>(USERS)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": { "otp": &otp, "expiry_time": otp_expiry(), "updated_at": DateTime::now() } },
            None,
        )
        .await?;

    EmailService::send_verification_email(&user.email, &otp, &user.full_name()).await;

    Ok(Json(ApiResponse::<()>::message("Verification Code Sent To Your Email")))
}

/// --------------------
/// Signin
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/signin", data = "<dto>")]
pub async fn signin(
    db: &State<DbConn>,
    dto: Json<SigninDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;

    let email = dto.email.trim().to_lowercase();
    let user = find_user(db, doc! { "email": &email })
        .await?
        .ok_or_else(|| ApiError::not_found("User Not Found"))?;

    if !user.is_verify {
        return Err(ApiError::bad_request("Please Verify Your Email First"));
    }
    if !password_matches(&dto.password, &user.password)? {
        return Err(ApiError::bad_request("Invalid Credentials"));
    }

    let (access_token, refresh_token) = open_session(db, &user).await?;
    info!("User {} signed in", user.email);

    Ok(Json(ApiResponse::success(
        "Signin Successful",
        json!({
            "user": SessionUser::from(&user),
            "access_token": access_token,
            "refresh_token": refresh_token,
        }),
    )))
}

/// --------------------
/// Refresh token
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/refresh-token", data = "<dto>")]
pub async fn refresh_token(
    db: &State<DbConn>,
    dto: Json<RefreshTokenDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let claims = JwtService::verify(TokenKind::Refresh, &dto.refresh_token)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    let user = find_user(db, doc! { "_id": user_id })
        .await?
        .ok_or_else(|| ApiError::unauthorized("Access Denied"))?;

    if user.rt_hash.is_empty() || !JwtService::fingerprint_matches(&user.rt_hash, &dto.refresh_token) {
        return Err(ApiError::unauthorized("Access Denied"));
    }

    let (access_token, refresh_token) = open_session(db, &user).await?;

    Ok(Json(ApiResponse::success(
        "Token Refreshed",
        json!({
            "user": SessionUser::from(&user),
            "access_token": access_token,
            "refresh_token": refresh_token,
        }),
    )))
}

/// --------------------
/// Logout
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/logout")]
pub async fn logout(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    db.collection::<User>(USERS)
        .update_one(
            doc! { "_id": auth.user_id },
            doc! { "$set": { "rt_hash": "", "updated_at": DateTime::now() } },
            None,
        )
        .await?;

    Ok(Json(ApiResponse::<()>::message("Logout Successful")))
}

/// --------------------
/// Change password
/// --------------------
#[openapi(tag = "Auth")]
#[patch("/auth/change-password", data = "<dto>")]
pub async fn change_password(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<ChangePasswordDto>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    dto.validate()?;

    let user = user_by_id(db, &auth.user_id).await?;
    if !password_matches(&dto.old_password, &user.password)? {
        return Err(ApiError::bad_request("Invalid Credentials"));
    }

    db.collection::<User>(USERS)
        .update_one(
            doc! { "_id": auth.user_id },
            doc! { "$set": { "password": hash_password(&dto.new_password)?, "updated_at": DateTime::now() } },
            None,
        )
        .await?;

    Ok(Json(ApiResponse::<()>::message("Password Changed Successfully")))
}

/// --------------------
/// Forgot password
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/forgot-password", data = "<dto>")]
pub async fn forgot_password(
    db: &State<DbConn>,
    dto: Json<ForgotPasswordDto>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    dto.validate()?;

    let email = dto.email.trim().to_lowercase();
    let user = find_user(db, doc! { "email": &email })
        .await?
        .ok_or_else(|| ApiError::not_found("User Not Found"))?;

    if !user.is_verify {
        return Err(ApiError::bad_request("Please Verify Your Email First"));
    }

    let user_id = user.id.ok_or_else(|| ApiError::internal("Forgot password", "user without id"))?;
    let token = JwtService::issue(TokenKind::Reset, &user_id, &user.email, user.role).map_err(token_error)?;
    let link = format!("{}/reset-password/{}", Config::front_end_url(), token);

    EmailService::send_reset_password_email(&user.email, &user.full_name(), &link).await;

    Ok(Json(ApiResponse::<()>::message("Password Reset Link Sent To Your Email")))
}

/// --------------------
/// Reset password
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/reset-password/<token>", data = "<dto>")]
pub async fn reset_password(
    db: &State<DbConn>,
    token: String,
    dto: Json<ResetPasswordDto>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    dto.validate()?;

    let claims = JwtService::verify(TokenKind::Reset, &token)
        .map_err(|_| ApiError::bad_request("Invalid or Expired Token"))?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::bad_request("Invalid or Expired Token"))?;

    let result = db
        .collection::<User>(USERS)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": {
                "password": hash_password(&dto.new_password)?,
                "rt_hash": "",
                "updated_at": DateTime::now(),
            }},
            None,
        )
        .await?;

    if result.matched_count == 0 {
        return Err(ApiError::not_found("User Not Found"));
    }

    Ok(Json(ApiResponse::<()>::message("Password Reset Successfully")))
}

/// --------------------
/// Users
/// --------------------
#[openapi(tag = "Auth")]
#[get("/auth/<id>")]
pub async fn get_user(
    db: &State<DbConn>,
    _auth: AuthGuard,
    id: String,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user_id = parse_id(&id, "User")?;
    let user = user_by_id(db, &user_id).await?;
    Ok(Json(ApiResponse::success("User Retrieved", UserResponse::from(user))))
}

#[openapi(tag = "Auth")]
#[get("/auth")]
pub async fn get_all_users(
    db: &State<DbConn>,
    _admin: AdminGuard,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>, ApiError> {
    let options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
    let users: Vec<User> = db
        .collection::<User>(USERS)
        .find(doc! {}, options)
        .await?
        .try_collect()
        .await?;

    Ok(Json(ApiResponse::success(
        "Users Retrieved",
        users.into_iter().map(UserResponse::from).collect(),
    )))
}

/// --------------------
/// Profile update (multipart)
/// --------------------
#[derive(FromForm)]
pub struct ProfileForm<'r> {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub license_no: Option<String>,
    pub experience: Option<String>,
    pub is_active: Option<bool>,
    pub profile_img: Option<TempFile<'r>>,
    pub identity_proof: Option<TempFile<'r>>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[patch("/auth", data = "<form>")]
pub async fn update_profile(
    db: &State<DbConn>,
    auth: AuthGuard,
    form: Form<ProfileForm<'_>>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let mut user = user_by_id(db, &auth.user_id).await?;

    if let Some(first_name) = non_blank(&form.first_name) {
        user.first_name = first_name;
    }
    if let Some(last_name) = non_blank(&form.last_name) {
        user.last_name = last_name;
    }
    if let Some(email) = non_blank(&form.email).map(|e| e.to_lowercase()) {
        if !validator::validate_email(&email) {
            return Err(ApiError::bad_request("Invalid email"));
        }
        if email != user.email {
            let taken = db
                .collection::<User>(USERS)
                .count_documents(doc! { "email": &email, "_id": { "$ne": auth.user_id } }, None)
                .await?;
            if taken > 0 {
                return Err(ApiError::conflict("Email Already Exists"));
            }
            user.email = email;
        }
    }
    if let Some(phone) = non_blank(&form.phone) {
        if !validate_mobile(&phone) {
            return Err(ApiError::bad_request("Invalid mobile number"));
        }
        user.phone = Some(phone);
    }
    if let Some(license_no) = non_blank(&form.license_no) {
        user.license_no = Some(license_no);
    }
    if let Some(experience) = non_blank(&form.experience) {
        user.experience = Some(experience);
    }
    if let Some(is_active) = form.is_active {
        user.is_active = is_active;
    }

    if form.profile_img.is_some() || form.identity_proof.is_some() {
        let cloudinary = CloudinaryService::from_config()?;
        let folder = CloudinaryService::folder("users");
        if let Some(file) = &form.profile_img {
            user.profile_img = Some(cloudinary.upload_temp_file(file, &folder).await?);
        }
        if let Some(file) = &form.identity_proof {
            user.identity_proof = Some(cloudinary.upload_temp_file(file, &folder).await?);
        }
    }

    user.agent_profile_complete = user.has_complete_agent_profile();
    user.updated_at = DateTime::now();

    db.collection::<User>(USERS)
        .update_one(
            doc! { "_id": auth.user_id },
            doc! { "$set": {
                "first_name": &user.first_name,
                "last_name": &user.last_name,
                "email": &user.email,
                "phone": &user.phone,
                "license_no": &user.license_no,
                "experience": &user.experience,
                "profile_img": &user.profile_img,
                "identity_proof": &user.identity_proof,
                "is_active": user.is_active,
                "agent_profile_complete": user.agent_profile_complete,
                "updated_at": user.updated_at,
            }},
            None,
        )
        .await?;

    Ok(Json(ApiResponse::success("Profile Updated", UserResponse::from(user))))
}
