//! Domain types for dipwatch

pub mod sample;
pub mod work_key;

pub use sample::{MetricSample, ProviderTag, SecondarySignals};
pub use work_key::{Identifier, WorkKey};
