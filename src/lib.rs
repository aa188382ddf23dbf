pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod jobs;
pub mod lifecycle;
pub mod mailer;
pub mod models;
pub mod notifications;
pub mod routes;
pub mod schema;
pub mod settings;
pub mod state;
pub mod storage;
pub mod utils;
pub mod validation;
pub mod workers;

pub use workers::{default_handlers, JobExecution, JobHandler, Worker};
