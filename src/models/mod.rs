pub mod user;
pub mod car;
pub mod booking;
pub mod invoice;
pub mod like;
pub mod rating;
pub mod address;
pub mod payment;

pub use user::*;
pub use car::*;
pub use booking::*;
pub use invoice::*;
pub use like::*;
pub use rating::*;
pub use address::*;
pub use payment::*;
