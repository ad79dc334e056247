//! Population storage for the Shoal simulator.
//!
//! Fish populations are stored as ragged age-by-length matrices: each age
//! only allocates the length groups it can occupy. This crate provides that
//! storage and the structural operations on it (growth redistribution,
//! aging, mixing, scaling), plus the tag-cohort side table that must stay
//! consistent with it.
//!
//! # Modules
//!
//! - [`banded`] -- Generic ragged rows with per-row column offsets
//! - [`age_band`] -- Age-by-length matrix of `(N, W)` cells
//! - [`tag_ratio`] -- Tag cohorts mirroring a population matrix
//! - [`kernel`] -- Growth transition kernels
//! - [`maturity`] -- Maturation hook applied during growth
//! - [`error`] -- Matrix error types

pub mod age_band;
pub mod banded;
pub mod error;
pub mod kernel;
pub mod maturity;
pub mod tag_ratio;

pub use age_band::{AgeBandMatrix, WeightChange};
pub use banded::{BandRow, BandValue, BandedMatrix};
pub use error::MatrixError;
pub use kernel::GrowthTransition;
pub use maturity::MaturityRule;
pub use tag_ratio::{TagCohort, TagRatioMatrix, TagShare};
