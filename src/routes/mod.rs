pub mod address;
pub mod auth;
pub mod booking;
pub mod car;
pub mod car_rating;
pub mod invoice;
pub mod like;
pub mod payment;
