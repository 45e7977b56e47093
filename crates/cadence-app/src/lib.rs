pub mod app;
pub mod error;
pub mod middleware;
pub mod worker_handler;
