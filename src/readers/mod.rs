pub mod bundle;
pub mod pickle_index;
pub mod record_reader;

pub use bundle::BundleLayout;
pub use record_reader::{BundleFormat, IndexContext, RecordReader};
