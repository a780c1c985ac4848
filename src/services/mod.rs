pub mod agent;
pub mod cloudinary;
pub mod email;
pub mod invoice;
pub mod jwt;
pub mod pdf;
pub mod razorpay;
pub mod wishlist;

pub use agent::AgentService;
pub use cloudinary::CloudinaryService;
pub use email::EmailService;
pub use invoice::InvoiceService;
pub use jwt::{JwtService, TokenKind};
pub use razorpay::RazorpayService;
