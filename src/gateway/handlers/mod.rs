pub mod analysis_handler;
pub mod postgres_handler;
pub mod twitch_handler;
