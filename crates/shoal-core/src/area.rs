//! Model areas and their environmental signals.

use shoal_types::{AreaId, TimeStep};

use crate::config::AreaConfig;

/// One model area: its size and temperature by step of the year.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    id: AreaId,
    size: f64,
    temperature: Vec<f64>,
}

impl Area {
    /// Build an area from its configuration.
    pub fn from_config(config: &AreaConfig) -> Self {
        Self {
            id: AreaId::new(config.id),
            size: config.size,
            temperature: config.temperature.clone(),
        }
    }

    /// Area identifier.
    pub const fn id(&self) -> AreaId {
        self.id
    }

    /// Area size.
    pub const fn size(&self) -> f64 {
        self.size
    }

    /// Temperature in the current step. The configured list is cycled and
    /// an empty list reads as zero.
    pub fn temperature(&self, time: &TimeStep) -> f64 {
        let len = self.temperature.len();
        if len == 0 {
            return 0.0;
        }
        let step = usize::try_from(time.step.saturating_sub(1)).unwrap_or(0);
        step.checked_rem(len)
            .and_then(|i| self.temperature.get(i))
            .copied()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(step: u32) -> TimeStep {
        TimeStep {
            year: 2000,
            step,
            substep: 1,
            num_substeps: 1,
            steps_per_year: 4,
            step_length: 3.0,
            year_length: 12.0,
            time: 1,
        }
    }

    #[test]
    fn temperature_cycles_over_steps() {
        let area = Area::from_config(&AreaConfig {
            id: 3,
            size: 10.0,
            temperature: vec![4.0, 8.0],
        });
        assert!((area.temperature(&time(1)) - 4.0).abs() < 1e-12);
        assert!((area.temperature(&time(3)) - 4.0).abs() < 1e-12);
        assert!((area.temperature(&time(4)) - 8.0).abs() < 1e-12);
        assert_eq!(area.id(), AreaId::new(3));
    }

    #[test]
    fn missing_temperature_reads_zero() {
        let area = Area::from_config(&AreaConfig {
            id: 1,
            size: 1.0,
            temperature: Vec::new(),
        });
        assert!(area.temperature(&time(2)).abs() < 1e-12);
    }
}
