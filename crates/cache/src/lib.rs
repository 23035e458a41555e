//! gridlab result cache.
//!
//! Avoids re-parsing large source artifacts (network models, time-series
//! exports) that several analyses read in a short window. See
//! [`ResultCache`] for the lookup path and [`CacheKey`] for how staleness
//! is handled.

pub mod cache;
pub mod codec;
pub mod disk;
pub mod error;
pub mod key;
pub mod memory;
pub mod parser;

pub use cache::{CacheConfig, CacheStats, ResultCache};
pub use error::CacheError;
pub use key::CacheKey;
pub use parser::{ArtifactParser, JsonArtifactParser};
