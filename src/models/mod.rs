pub mod access;
pub mod organization;
pub mod permission;
