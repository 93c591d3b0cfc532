pub mod classifier;
pub mod installer;
pub mod meta_lookup;

pub use classifier::{ClassifiedRows, RowClassifier};
pub use installer::{InstallOptions, InstallReport, Installer};
pub use meta_lookup::MetaLookup;
