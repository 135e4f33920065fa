
pub mod config;
pub mod db;
pub mod rolling;

pub use config::ExporterConfig;
pub use rolling::{
    AggregationError, EpochBounds, ExportCoordinator, NetworkSpec, RollingAggregator,
    ValidatorEpochFact, WindowKind,
};
