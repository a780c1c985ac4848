pub mod pagination;
pub mod response;
pub mod validation;

pub use pagination::{ListQuery, Page};
pub use response::{ApiError, ApiResponse};
pub use validation::{generate_otp, parse_id, round2, validate_mobile, validate_pincode};
