use lettre::{
    Message, SmtpTransport, Transport,
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
};
use log::{info, error, warn};

use crate::config::Config;

pub struct EmailService;

impl EmailService {
    pub async fn send_verification_email(email: &str, otp: &str, name: &str) -> bool {
        let body = format!(
            r#"
            <div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
                <div style="background: #2563eb; padding: 30px; text-align: center; border-radius: 12px 12px 0 0;">
                    <h1 style="color: white; margin: 0;">DriveEasy</h1>
                    <p style="color: #e0e7ff; margin: 5px 0 0 0;">Your Ride, Your Rules</p>
                </div>
                <div style="padding: 30px; background: #f8fafc;">
                    <h2 style="color: #1e293b;">Welcome to DriveEasy, {}!</h2>
                    <p>Please verify your email address to get started.</p>
                    <div style="font-size: 32px; font-weight: bold; color: #2563eb; letter-spacing: 4px;
                                background: white; padding: 15px; border: 2px dashed #2563eb; text-align: center;">
                        {}
                    </div>
                    <p style="color: #6b7280; font-size: 14px;">Expires in 10 minutes.</p>
                    <p style="color: #dc2626; font-size: 14px;">If you didn't create a DriveEasy account, please ignore this email.</p>
                </div>
            </div>
            "#,
            name, otp
        );

        match Self::deliver(email, "DriveEasy Email Verification", body).await {
            Ok(_) => {
                info!("Verification email sent to {}", email);
                true
            }
            Err(e) => {
                error!("Failed to send verification email to {}: {}", email, e);
                false
            }
        }
    }

    pub async fn send_welcome_email(email: &str, name: &str) -> bool {
        let display_name = if name.is_empty() { "there" } else { name };
        let body = format!(
            r#"
            <div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
                <div style="background: #059669; padding: 30px; text-align: center; border-radius: 12px 12px 0 0;">
                    <h1 style="color: white; margin: 0;">DriveEasy</h1>
                </div>
                <div style="padding: 30px; background: #f8fafc;">
                    <h2 style="color: #1e293b;">Welcome aboard, {}!</h2>
                    <p>Your email has been verified. Pick a car and plan your next trip.</p>
                    <ul>
                        <li>Doorstep delivery and pickup</li>
                        <li>Advance booking</li>
                        <li>Easy returns</li>
                    </ul>
                    <p>Happy Journey!<br><strong>The DriveEasy Team</strong></p>
                </div>
            </div>
            "#,
            display_name
        );

        match Self::deliver(email, "Welcome to DriveEasy", body).await {
            Ok(_) => {
                info!("Welcome email sent to {}", email);
                true
            }
            Err(e) => {
                error!("Failed to send welcome email to {}: {}", email, e);
                false
            }
        }
    }

    pub async fn send_reset_password_email(email: &str, name: &str, reset_link: &str) -> bool {
        let body = format!(
            r#"
            <div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
                <div style="background: #2563eb; padding: 30px; text-align: center; border-radius: 12px 12px 0 0;">
                    <h1 style="color: white; margin: 0;">DriveEasy</h1>
                </div>
                <div style="padding: 30px; background: #f8fafc;">
                    <h2 style="color: #1e293b;">Hi {},</h2>
                    <p>We received a request to reset your password. The link is valid for 15 minutes.</p>
                    <p style="text-align: center; margin: 30px 0;">
                        <a href="{}" style="background: #2563eb; color: white; padding: 15px 30px;
                                            text-decoration: none; border-radius: 8px; font-weight: bold;">Reset Password</a>
                    </p>
                    <p style="color: #6b7280; font-size: 14px;">If you didn't ask for this, you can ignore this email.</p>
                </div>
            </div>
            "#,
            name, reset_link
        );

        match Self::deliver(email, "Reset your DriveEasy password", body).await {
            Ok(_) => {
                info!("Password reset email sent to {}", email);
                true
            }
            Err(e) => {
                error!("Failed to send password reset email to {}: {}", email, e);
                false
            }
        }
    }

    async fn deliver(email: &str, subject: &str, body: String) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mail_user = Config::mail_user();
        let mail_password = Config::mail_password();

        if mail_user.is_empty() || mail_password.is_empty() {
            warn!("Email credentials not configured. Skipping email send.");
            return Err("Email not configured".into());
        }

        let from_mailbox: Mailbox = Config::mail_from().parse()?;
        let to_mailbox: Mailbox = email.parse()?;

        let message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body)?;

        let creds = Credentials::new(mail_user, mail_password);
        let mailer = SmtpTransport::starttls_relay(&Config::mail_host())?
            .port(Config::mail_port())
            .credentials(creds)
            .build();

        // SMTP transport is blocking
        tokio::task::spawn_blocking(move || mailer.send(&message)).await??;
        Ok(())
    }
}
