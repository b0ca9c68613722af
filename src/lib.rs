pub mod app;
pub mod authz;
pub mod context;
pub mod db;
pub mod docs;
pub mod errors;
pub mod events;
pub mod guard;
pub mod jwt;
pub mod models;
pub mod org;
pub mod routes;
pub mod session;

// Re-export commonly used items for tests
pub use app::create_app;
