pub mod memory_handler;
pub mod postgres_handler;
pub mod proxy_handler;
