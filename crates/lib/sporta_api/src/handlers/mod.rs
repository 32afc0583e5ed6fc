//! Request handlers.

pub mod auth;
pub mod otp;
pub mod users;
