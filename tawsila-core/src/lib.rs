pub mod models;
pub mod service;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod bootstrap;
pub mod routing;
pub mod session;

pub use config::Config;
pub use error::{Error, Result};
