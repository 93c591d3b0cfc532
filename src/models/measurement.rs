use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::Value;
use crate::utils::filename::parse_measurement_key;

/// Identifies one measurement file: which parameter was measured at which
/// station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeasurementKey {
    pub param_id: u32,
    pub station_id: u32,
}

impl MeasurementKey {
    pub fn new(param_id: u32, station_id: u32) -> Self {
        Self {
            param_id,
            station_id,
        }
    }

    /// Parse the key out of a file name such as `8_1021.pkl`
    pub fn from_path(path: &Path) -> Result<Self> {
        parse_measurement_key(path)
    }
}

impl fmt::Display for MeasurementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "param {} / station {}", self.param_id, self.station_id)
    }
}

/// All observations of one parameter at one station, aligned by position
/// with the shared index.
#[derive(Debug, Clone)]
pub struct MeasurementFile {
    pub key: MeasurementKey,
    pub path: PathBuf,
    pub values: Vec<Value>,
}

impl MeasurementFile {
    pub fn new(key: MeasurementKey, path: PathBuf, values: Vec<Value>) -> Self {
        Self { key, path, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn numeric_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_numeric()).count()
    }

    pub fn flag_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_flag()).count()
    }
}
