//! Cross-platform process/resource monitor data pipeline: OS probes feeding
//! derived models feeding a background sampler. See `domain` and `platform`.

pub mod domain;
pub mod platform;
