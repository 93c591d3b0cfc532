pub mod constants;
pub mod filename;
pub mod permissions;
pub mod progress;

pub use constants::*;
pub use filename::parse_measurement_key;
pub use permissions::{ensure_readable, ensure_writable};
pub use progress::ProgressReporter;
