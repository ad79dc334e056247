//! Error types for the simulation binary.
//!
//! [`EngineError`] wraps every failure mode of startup and the run so
//! `main` can propagate with `?`.

/// Top-level error for the simulation binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: shoal_core::config::ConfigError,
    },

    /// The configuration did not describe a valid ecosystem.
    #[error("setup error: {source}")]
    Setup {
        /// The underlying setup error.
        #[from]
        source: shoal_core::SetupError,
    },

    /// Simulation clock initialization failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: shoal_core::clock::ClockError,
    },

    /// The simulation loop failed.
    #[error("simulation error: {source}")]
    Simulation {
        /// The underlying simulation error.
        #[from]
        source: shoal_core::SimulationError,
    },

    /// The final report could not be serialized.
    #[error("report error: {source}")]
    Report {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// An environment setting could not be parsed.
    #[error("invalid value {value:?} for {name}: {reason}")]
    Setting {
        /// Name of the environment variable.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
        /// The rejected value.
        value: String,
    },
}
