//! Domain models.

pub mod config;
pub mod observation;

pub use config::{
    AccumulatorConfig, Config, ConsumerConfig, HttpConfig, LogFormat, LoggingConfig, OffsetReset,
    RotationPolicy, StoreConfig,
};
pub use observation::{decode_sum, encode_sum, Observation, AGGREGATE_PRECISION};
