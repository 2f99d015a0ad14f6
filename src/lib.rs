pub mod api;
pub mod database;
pub mod digest;
pub mod logging;
pub mod mailer;
pub mod metrics;
pub mod models;
pub mod processor;
pub mod runner;
