//! Request middleware: bearer authentication and per-route permission gates.

pub mod auth;
pub mod permission;
