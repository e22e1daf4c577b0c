pub mod api;
pub mod app;
pub mod config;
pub mod cookies;
pub mod error;
pub mod events;
pub mod feed;
pub mod geo;
pub mod location;
pub mod logging;
pub mod models;
pub mod reporter;
pub mod session;
pub mod tracker;
