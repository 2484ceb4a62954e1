pub mod auth;
pub mod config;
pub mod error;
pub mod features;
pub mod jobs;
pub mod model;
pub mod pipeline;
pub mod providers;
pub mod routes;
