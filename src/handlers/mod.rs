pub mod capture_api;
pub mod health;
pub mod metrics_handler;
pub mod users;
