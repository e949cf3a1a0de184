//! eg-cache: memoized model construction.
//!
//! - [`ModelCache`]: per-key state machine (`Absent → Building → Ready`,
//!   `Building → Failed → Absent`) with at most one build in flight per key,
//!   lazy expiry, optional eager sweeping, explicit invalidation and a
//!   liveness bound on running builds
//! - [`Fingerprint`]: SHA-256 cache keys over scenario records, data version
//!   and build settings
//! - [`Clock`]: injectable time source ([`SystemClock`], [`ManualClock`])
//!
//! The cache is an explicit handle: create one at startup, share it by
//! reference or `Arc`, and drop it at shutdown.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fingerprint;

pub use cache::{CacheEntry, CacheStats, Lookup, ModelCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use fingerprint::{Fingerprint, FingerprintBuilder, MODEL_FORMAT_VERSION, scenario_fingerprint};
