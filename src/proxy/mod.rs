pub mod app;
pub mod cache;
pub mod handlers;
pub mod limiter;
pub mod types;
