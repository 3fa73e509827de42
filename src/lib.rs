// ATT filter - host-side tooling
// Settings loading and capture replay through the filter pipeline

pub mod replay;
pub mod settings;

pub use replay::{run_replay, OutputFormat, ReplaySummary};
pub use settings::FlagOverrides;
