//! Bootstrap module for the permission layer
//!
//! This module handles:
//! - Configuration loading
//! - Session restore and service wiring

pub mod config;
pub mod services;

pub use config::load_config;
pub use services::{init_services, Services};
