use rocket::figment::{Figment, providers::{Env, Format, Toml}};
use rocket::Config as RocketConfig;
use std::env;

pub struct Config;

impl Config {
    fn figment() -> Figment {
        let profile = env::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());

        Figment::from(RocketConfig::default())
            .merge(Toml::file("Rocket.toml").nested())
            .select(&profile)
            .merge(Env::prefixed("ROCKET_").global())
    }

    fn optional(key: &str) -> Option<String> {
        Self::figment()
            .extract_inner::<String>(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }

    pub fn jwt_secret() -> String {
        Self::figment()
            .extract_inner("jwt_secret")
            .unwrap_or_else(|_| "default-secret".to_string())
    }

    pub fn jwt_refresh_secret() -> String {
        Self::figment()
            .extract_inner("jwt_refresh_secret")
            .unwrap_or_else(|_| "default-refresh-secret".to_string())
    }

    pub fn jwt_forgot_secret() -> String {
        Self::figment()
            .extract_inner("jwt_forgot_secret")
            .unwrap_or_else(|_| "default-forgot-secret".to_string())
    }

    /// Access token lifetime in seconds.
    pub fn jwt_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_expiry")
            .unwrap_or(86_400)
    }

    pub fn jwt_refresh_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_refresh_expiry")
            .unwrap_or(604_800)
    }

    /// Lifetime of the token handed out at signup for OTP verification.
    pub fn jwt_verify_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_verify_expiry")
            .unwrap_or(900)
    }

    pub fn mongodb_uri() -> String {
        Self::figment()
            .extract_inner("mongodb_uri")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
    }

    pub fn mongodb_database() -> String {
        Self::figment()
            .extract_inner("mongodb_database")
            .unwrap_or_else(|_| "driveeasy".to_string())
    }

    pub fn mail_host() -> String {
        Self::figment()
            .extract_inner("mail_host")
            .unwrap_or_else(|_| "smtp.gmail.com".to_string())
    }

    pub fn mail_port() -> u16 {
        Self::figment()
            .extract_inner("mail_port")
            .unwrap_or(587)
    }

    pub fn mail_user() -> String {
        Self::figment()
            .extract_inner("mail_user")
            .unwrap_or_default()
    }

    pub fn mail_password() -> String {
        Self::figment()
            .extract_inner("mail_password")
            .unwrap_or_default()
    }

    pub fn mail_from() -> String {
        Self::figment()
            .extract_inner("mail_from")
            .unwrap_or_else(|_| "DriveEasy <noreply@driveeasy.in>".to_string())
    }

    pub fn razorpay_key_id() -> Option<String> {
        Self::optional("razorpay_key_id")
    }

    pub fn razorpay_key_secret() -> Option<String> {
        Self::optional("razorpay_key_secret")
    }

    pub fn cloudinary_cloud_name() -> Option<String> {
        Self::optional("cloudinary_cloud_name")
    }

    pub fn cloudinary_api_key() -> Option<String> {
        Self::optional("cloudinary_api_key")
    }

    pub fn cloudinary_api_secret() -> Option<String> {
        Self::optional("cloudinary_api_secret")
    }

    pub fn cloudinary_folder() -> String {
        Self::figment()
            .extract_inner("cloudinary_folder")
            .unwrap_or_else(|_| "driveeasy".to_string())
    }

    pub fn swagger_user() -> Option<String> {
        Self::optional("swagger_user")
    }

    pub fn swagger_password() -> Option<String> {
        Self::optional("swagger_password")
    }

    pub fn front_end_url() -> String {
        Self::figment()
            .extract_inner("front_end_url")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
    }

    pub fn chrome_path() -> String {
        Self::figment()
            .extract_inner("chrome_path")
            .unwrap_or_else(|_| "chromium".to_string())
    }
}
