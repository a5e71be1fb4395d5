pub mod admin;
pub mod devices;
pub mod reserve;
