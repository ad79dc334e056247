//! Shared type definitions for the Shoal population simulator.
//!
//! This crate holds the small value types every other crate in the
//! workspace agrees on: identifiers, the `(N, W)` cell, length-group
//! divisions and the conversions between them, and the time descriptor.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe wrappers for stock and area identifiers
//! - [`cell`] -- The `(N, W)` population cell and its merge rule
//! - [`constants`] -- Numeric guards and the consumption ceiling
//! - [`length`] -- Length-group divisions
//! - [`conversion`] -- Index correspondence between two divisions
//! - [`time`] -- Time descriptor handed to every phase
//! - [`error`] -- Errors raised while building divisions and conversions

pub mod cell;
pub mod constants;
pub mod conversion;
pub mod error;
pub mod ids;
pub mod length;
pub mod time;

pub use cell::PopulationCell;
pub use constants::{MAX_RATIO_CONSUMED, NEGLIGIBLE, guarded_div, is_negligible};
pub use conversion::ConversionIndex;
pub use error::TypesError;
pub use ids::{AreaId, StockId};
pub use length::{LENGTH_TOLERANCE, LengthGroupDivision};
pub use time::TimeStep;
