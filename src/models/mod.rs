pub mod measurement;
pub mod rows;
pub mod timestamp;
pub mod value;

pub use measurement::{MeasurementFile, MeasurementKey};
pub use rows::{DataRow, MeasurementRow, MetaRow};
pub use timestamp::Timestamp;
pub use value::Value;
