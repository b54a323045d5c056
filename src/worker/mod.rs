pub mod error;
pub mod handlers;
pub mod jobs;
pub mod runner;
pub mod types;
pub mod util;
