pub mod app;
pub mod shared;
pub mod gateway;
pub mod proxy;
pub mod worker;
pub mod analysis;
