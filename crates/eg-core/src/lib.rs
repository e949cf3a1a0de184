//! eg-core: stable foundation for egrid.
//!
//! Contains:
//! - units (uom SI types, constructors, per-unit bases)
//! - numeric (Real/Complex + tolerances + float helpers)
//! - ids (typed compact IDs for grid elements)
//! - error (shared error types)
//! - timing (stage timers reported through tracing)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;
pub mod units;

pub use error::{EgError, EgResult};
pub use ids::*;
pub use numeric::*;
pub use units::*;
