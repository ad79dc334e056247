//! Movement of a stock between its areas.
//!
//! Each step of the year may carry a proportion matrix `P[from][to]`
//! over the stock's areas, in the order the stock lists them. Applying it
//! replaces the population of area `to` with `sum(P[from][to] * N[from])`,
//! for base and tagged fish alike.

use shoal_matrix::{AgeBandMatrix, MatrixError, TagRatioMatrix};
use shoal_types::{ConversionIndex, TimeStep};
use tracing::warn;

use crate::config::MigrationConfig;

/// Errors raised while building migration matrices.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A matrix does not match the number of areas.
    #[error("migration matrix for step {step} is not {areas}x{areas}")]
    Shape {
        /// Step of the year of the matrix.
        step: u32,
        /// Number of stock areas.
        areas: usize,
    },
}

/// Migration of one stock.
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    matrices: Vec<(u32, Vec<Vec<f64>>)>,
}

impl Migration {
    /// Build from configuration for a stock on `areas` areas.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Shape`] if a matrix is not square in the
    /// number of areas.
    pub fn from_config(config: &MigrationConfig, areas: usize) -> Result<Self, MigrationError> {
        for m in &config.matrices {
            if m.proportions.len() != areas || m.proportions.iter().any(|row| row.len() != areas) {
                return Err(MigrationError::Shape {
                    step: m.step,
                    areas,
                });
            }
            for (from, row) in m.proportions.iter().enumerate() {
                let total: f64 = row.iter().sum();
                if (total - 1.0).abs() > 1e-6 {
                    warn!(step = m.step, from, total, "migration proportions do not sum to one");
                }
            }
        }
        Ok(Self {
            matrices: config
                .matrices
                .iter()
                .map(|m| (m.step, m.proportions.clone()))
                .collect(),
        })
    }

    /// Proportion matrix for the current step, if any.
    pub fn matrix_for(&self, time: &TimeStep) -> Option<&[Vec<f64>]> {
        self.matrices
            .iter()
            .find(|(step, _)| *step == time.step)
            .map(|(_, m)| m.as_slice())
    }

    /// Apply `matrix` to the populations and tags of every area.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError`] if fish cannot be merged between areas.
    pub fn apply(
        matrix: &[Vec<f64>],
        populations: &mut [AgeBandMatrix],
        tags: &mut [TagRatioMatrix],
        identity: &ConversionIndex,
    ) -> Result<(), MatrixError> {
        let old_populations = populations.to_vec();
        let old_tags = tags.to_vec();
        for ((to, population), tag) in populations.iter_mut().enumerate().zip(tags.iter_mut()) {
            population.set_to_zero();
            tag.set_to_zero();
            for (from, (source, source_tags)) in old_populations.iter().zip(&old_tags).enumerate() {
                let p = matrix
                    .get(from)
                    .and_then(|row| row.get(to))
                    .copied()
                    .unwrap_or(0.0);
                if p <= 0.0 {
                    continue;
                }
                let (lo, hi) = (source.min_age(), source.max_age());
                population.add(source, identity, p, lo, hi)?;
                tag.add(source_tags, identity, p, lo, hi)?;
            }
            tag.update_ratio(population);
        }
        Ok(())
    }
}
