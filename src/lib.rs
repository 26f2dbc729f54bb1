pub mod aggregate;
pub mod calibration;
pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod event_model;
pub mod learning;
pub mod rating_db;
pub mod ratings;
pub mod sampling;
pub mod trial;
pub mod value;
