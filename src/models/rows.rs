use crate::models::{MeasurementKey, Timestamp};

/// One numeric observation bound for the `data` table.
///
/// `meta_id` is always [`DataRow::NO_META`]; flag codes travel as
/// [`MetaRow`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    pub param_id: u32,
    pub station_id: u32,
    pub date: Timestamp,
    pub value: f64,
    pub meta_id: u32,
}

impl DataRow {
    pub const NO_META: u32 = 0;

    pub fn new(key: MeasurementKey, date: Timestamp, value: f64) -> Self {
        Self {
            param_id: key.param_id,
            station_id: key.station_id,
            date,
            value,
            meta_id: Self::NO_META,
        }
    }
}

/// Marks that a (parameter, station) record exists. Written to `measurement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementRow {
    pub param_id: u32,
    pub station_id: u32,
    pub has_data: bool,
}

impl MeasurementRow {
    pub fn new(key: MeasurementKey) -> Self {
        Self {
            param_id: key.param_id,
            station_id: key.station_id,
            has_data: true,
        }
    }
}

/// One flagged observation with its flag resolved to a `meta` table id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaRow {
    pub param_id: u32,
    pub station_id: u32,
    pub date: Timestamp,
    pub meta_id: u32,
}

impl MetaRow {
    pub fn new(key: MeasurementKey, date: Timestamp, meta_id: u32) -> Self {
        Self {
            param_id: key.param_id,
            station_id: key.station_id,
            date,
            meta_id,
        }
    }
}
