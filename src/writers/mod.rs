pub mod database_loader;

pub use database_loader::{DataTransaction, DatabaseLoader, PublishedFiles};
