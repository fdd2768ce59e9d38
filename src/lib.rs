pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod estimator;
pub mod meter;
pub mod state;
pub mod vehicle;
