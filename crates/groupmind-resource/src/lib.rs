pub mod monitor;
pub mod optimizer;

pub use monitor::{ResourceMonitor, ResourceStats};
pub use optimizer::{OptimizationLevel, ResourceOptimizer};
