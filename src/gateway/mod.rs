pub mod app;
pub mod error;
pub mod export;
pub mod handlers;
pub mod types;
