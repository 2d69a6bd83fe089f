pub mod singleflight;

pub use singleflight::{SingleFlight, SingleFlightError};
