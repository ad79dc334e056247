//! Model clock, stock phases, and the step cycle of the Shoal simulator.
//!
//! This crate owns everything that changes a population over time: the
//! growth laws, the predation engine, the transfer processes between
//! stocks, and the ordered step cycle that applies them.
//!
//! # Modules
//!
//! - [`clock`] -- Year/step/sub-step clock.
//! - [`config`] -- Configuration loading from `shoal-config.yaml` into
//!   strongly-typed structs.
//! - [`area`] -- Areas with size and temperature.
//! - [`growth`] -- Growth laws and growth kernels.
//! - [`predation`] -- Suitability, appetite, and the propose, check and
//!   settle feeding passes.
//! - [`transfer`] -- Parcels of fish moving between stocks.
//! - [`maturity`], [`transition`], [`spawning`], [`renewal`],
//!   [`straying`], [`migration`] -- The population processes.
//! - [`stock`] -- A stock and its phase entry points.
//! - [`ecosystem`] -- The step cycle over every area and stock.
//! - [`setup`] -- Building an ecosystem from configuration.
//! - [`runner`] -- The simulation loop.

pub mod area;
pub mod clock;
pub mod config;
pub mod ecosystem;
pub mod growth;
pub mod maturity;
pub mod migration;
pub mod predation;
pub mod renewal;
pub mod runner;
pub mod setup;
pub mod spawning;
pub mod stock;
pub mod straying;
pub mod transfer;
pub mod transition;

pub use ecosystem::{Ecosystem, StepError, StepSummary, StockSummary};
pub use runner::{SimulationEndReason, SimulationError, SimulationResult, run_simulation};
pub use setup::SetupError;
pub use stock::{Stock, StockError};
