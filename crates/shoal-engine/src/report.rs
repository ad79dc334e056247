//! Final report printed when the run ends.

use serde::Serialize;
use shoal_core::{Ecosystem, SimulationResult};
use shoal_types::AreaId;

/// Run result together with the final state of every stock.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// How the run ended.
    pub result: SimulationResult,
    /// Final state by stock.
    pub stocks: Vec<StockReport>,
}

/// Final state of one stock.
#[derive(Debug, Serialize)]
pub struct StockReport {
    /// Stock name.
    pub name: String,
    /// Final state on each area the stock lives on.
    pub areas: Vec<AreaReport>,
}

/// Final numbers and biomass of a stock on one area.
#[derive(Debug, Serialize)]
pub struct AreaReport {
    /// Area identifier.
    pub area: AreaId,
    /// Total number of fish.
    pub number: f64,
    /// Total biomass.
    pub biomass: f64,
    /// Number of fish by age, youngest first.
    pub by_age: Vec<(u32, f64)>,
}

impl RunReport {
    /// Collect the final report from `ecosystem`.
    pub fn new(result: SimulationResult, ecosystem: &Ecosystem) -> Self {
        let stocks = ecosystem
            .stocks()
            .iter()
            .map(|stock| StockReport {
                name: stock.name().to_owned(),
                areas: stock
                    .areas()
                    .filter_map(|area| {
                        let population = stock.population(area).ok()?;
                        Some(AreaReport {
                            area,
                            number: population.total_number(),
                            biomass: population.total_biomass(),
                            by_age: population
                                .ages()
                                .map(|(age, row)| (age, row.values().iter().map(|c| c.n).sum::<f64>()))
                                .collect(),
                        })
                    })
                    .collect(),
            })
            .collect();
        Self { result, stocks }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use shoal_core::config::SimulationConfig;
    use shoal_core::{SimulationEndReason, SimulationResult};

    use super::*;

    #[test]
    fn report_lists_numbers_by_age() {
        let config = SimulationConfig::parse(
            r"
stocks:
  - name: cod
    areas: [1]
    length: { min: 10.0, max: 30.0, dl: 10.0 }
    min_age: 2
    max_age: 3
    initial:
      - { area: 1, age: 3, number: 40.0, mean_length: 25.0 }
",
        )
        .unwrap();
        let ecosystem = Ecosystem::from_config(&config).unwrap();
        let result = SimulationResult {
            end_reason: SimulationEndReason::LastYearReached,
            final_summary: None,
            total_steps: 0,
        };
        let report = RunReport::new(result, &ecosystem);
        let area = &report.stocks[0].areas[0];
        assert_eq!(area.area, AreaId::new(1));
        assert_eq!(area.by_age.len(), 2);
        assert!(area.by_age[0].1.abs() < 1e-12);
        assert!((area.by_age[1].1 - 40.0).abs() < 1e-9);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stocks"][0]["name"], "cod");
        assert_eq!(json["result"]["end_reason"], "last_year_reached");
    }
}
