//! Remote profile fetcher
//!
//! Pure HTTP client for the backend profile endpoint plus the trait the
//! permission synchronizer depends on.

pub mod error;
pub mod profile;

pub use error::ClientError;
pub use profile::{HttpProfileClient, ProfileFetcher};
