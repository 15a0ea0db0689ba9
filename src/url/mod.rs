//! Target resolution for batch inputs
//!
//! Turns raw domain entries into primary-page URLs and stable batch keys, and
//! derives the host scope used by the rate limiter.

mod target;

pub use target::{host_key, join_probe_path, parse_target, Target};
