// src/api/handlers/mod.rs
mod health;
mod bundle;
mod generated;

pub use health::health_check;
pub use bundle::{generate_and_save, generate_and_run};
pub use generated::{generate_text, run_tests};
