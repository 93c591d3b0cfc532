use crate::error::{InstallError, Result};
use crate::models::{DataRow, MeasurementFile, MeasurementRow, MetaRow, Timestamp};
use crate::processors::MetaLookup;

/// Rows derived from one measurement file
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRows {
    pub data: Vec<DataRow>,
    pub meta: Vec<MetaRow>,
    pub measurement: MeasurementRow,
}

/// Splits a measurement file into numeric data rows and flag rows.
pub struct RowClassifier {
    lookup: MetaLookup,
}

impl RowClassifier {
    pub fn new(lookup: MetaLookup) -> Self {
        Self { lookup }
    }

    pub fn classify(&self, file: &MeasurementFile, dates: &[Timestamp]) -> Result<ClassifiedRows> {
        Self::check_alignment(file, dates)?;

        Ok(ClassifiedRows {
            data: Self::data_rows(file, dates).collect(),
            meta: self.meta_rows(file, dates).collect(),
            measurement: MeasurementRow::new(file.key),
        })
    }

    /// One row per numeric position; flags are skipped
    pub fn data_rows<'f>(
        file: &'f MeasurementFile,
        dates: &'f [Timestamp],
    ) -> impl Iterator<Item = DataRow> + 'f {
        let key = file.key;
        file.values
            .iter()
            .zip(dates)
            .filter_map(move |(value, date)| value.as_numeric().map(|v| DataRow::new(key, *date, v)))
    }

    /// One row per flag position, flag resolved through the meta lookup
    pub fn meta_rows<'f>(
        &'f self,
        file: &'f MeasurementFile,
        dates: &'f [Timestamp],
    ) -> impl Iterator<Item = MetaRow> + 'f {
        let key = file.key;
        file.values.iter().zip(dates).filter_map(move |(value, date)| {
            value
                .as_flag()
                .map(|name| MetaRow::new(key, *date, self.lookup.resolve(name)))
        })
    }

    fn check_alignment(file: &MeasurementFile, dates: &[Timestamp]) -> Result<()> {
        if file.len() != dates.len() {
            return Err(InstallError::LengthMismatch {
                file: file.path.clone(),
                values: file.len(),
                dates: dates.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MeasurementKey, Value};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn dates(n: usize) -> Vec<Timestamp> {
        (0..n)
            .map(|h| Timestamp::parse(&format!("2021-02-17 {:02}:00:00", h)).unwrap())
            .collect()
    }

    fn sample_file() -> MeasurementFile {
        MeasurementFile::new(
            MeasurementKey::new(1, 2),
            PathBuf::from("1_2.pkl"),
            vec![
                Value::from(1.5),
                Value::from("calibration"),
                Value::from(2.5),
                Value::from("unregistered"),
            ],
        )
    }

    #[test]
    fn test_streams_are_disjoint() -> Result<()> {
        let lookup = MetaLookup::from_pairs([(4, "calibration")]);
        let classifier = RowClassifier::new(lookup);
        let dates = dates(4);

        let rows = classifier.classify(&sample_file(), &dates)?;

        assert_eq!(
            rows.data,
            vec![
                DataRow::new(MeasurementKey::new(1, 2), dates[0], 1.5),
                DataRow::new(MeasurementKey::new(1, 2), dates[2], 2.5),
            ]
        );
        assert_eq!(
            rows.meta,
            vec![
                MetaRow::new(MeasurementKey::new(1, 2), dates[1], 4),
                MetaRow::new(MeasurementKey::new(1, 2), dates[3], 0),
            ]
        );
        assert_eq!(rows.data.len() + rows.meta.len(), 4);
        Ok(())
    }

    #[test]
    fn test_one_measurement_row_per_file() -> Result<()> {
        let lookup = MetaLookup::new();
        let classifier = RowClassifier::new(lookup);
        let only_flags = MeasurementFile::new(
            MeasurementKey::new(5, 6),
            PathBuf::from("5_6.pkl"),
            vec![Value::from("nd"), Value::from("nd")],
        );

        let rows = classifier.classify(&only_flags, &dates(2))?;
        assert!(rows.data.is_empty());
        assert_eq!(
            rows.measurement,
            MeasurementRow {
                param_id: 5,
                station_id: 6,
                has_data: true
            }
        );
        Ok(())
    }

    #[test]
    fn test_data_rows_carry_no_meta() {
        let file = sample_file();
        let dates = dates(4);
        assert!(RowClassifier::data_rows(&file, &dates).all(|r| r.meta_id == DataRow::NO_META));
    }

    #[test]
    fn test_misaligned_input_is_rejected() {
        let lookup = MetaLookup::new();
        let classifier = RowClassifier::new(lookup);

        assert!(matches!(
            classifier.classify(&sample_file(), &dates(3)),
            Err(InstallError::LengthMismatch { values: 4, dates: 3, .. })
        ));
    }
}
