// src/lib.rs
pub mod api;
pub mod banner;
pub mod config;
pub mod errors;
pub mod extract;
pub mod generator;
pub mod models;
pub mod prompt;
pub mod providers;
pub mod retry;
pub mod sandbox;
