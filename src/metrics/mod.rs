pub mod accumulator;
pub mod percentiles;
pub mod registry;
pub mod stream;

pub use accumulator::{AccumulatedStats, Delta, StatAccumulator};
pub use percentiles::PauseDistribution;
pub use registry::{CollectorView, LiveSnapshot, NameKind, SkippedName, StatsRegistry};
