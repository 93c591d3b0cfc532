use crate::error::{InstallError, Result};
use crate::models::{MeasurementFile, MeasurementKey, Timestamp, Value};
use crate::readers::pickle_index;
use crate::utils::constants::INDEX_STEM;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Encoding of the serialized artifacts in a data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleFormat {
    Pickle,
    Json,
}

impl BundleFormat {
    const ALL: [BundleFormat; 2] = [BundleFormat::Pickle, BundleFormat::Json];

    pub fn extension(&self) -> &'static str {
        match self {
            BundleFormat::Pickle => "pkl",
            BundleFormat::Json => "json",
        }
    }

    /// Pick the format from whichever index artifact the directory holds
    pub fn detect(data_dir: &Path) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.index_path(data_dir).is_file())
            .ok_or_else(|| {
                InstallError::NotFound(format!(
                    "No {}.pkl or {}.json index found in '{}'",
                    INDEX_STEM,
                    INDEX_STEM,
                    data_dir.display()
                ))
            })
    }

    pub fn index_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(format!("{}.{}", INDEX_STEM, self.extension()))
    }

    pub fn decode<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let reader = BufReader::new(File::open(path)?);
        let decoded = match self {
            BundleFormat::Pickle => serde_pickle::from_reader(reader, serde_pickle::DeOptions::new())?,
            BundleFormat::Json => serde_json::from_reader(reader)?,
        };
        Ok(decoded)
    }
}

/// The shared timestamp sequence, loaded once and passed to every decode.
#[derive(Debug, Clone)]
pub struct IndexContext {
    format: BundleFormat,
    dates: Vec<Timestamp>,
}

impl IndexContext {
    pub fn load(data_dir: &Path) -> Result<Self> {
        let format = BundleFormat::detect(data_dir)?;
        let path = format.index_path(data_dir);
        let dates = match format {
            BundleFormat::Pickle => decode_pickled_index(&path)?,
            BundleFormat::Json => format.decode(&path)?,
        };

        info!("Loaded {} timestamps from {}", dates.len(), path.display());
        Ok(Self { format, dates })
    }

    pub fn format(&self) -> BundleFormat {
        self.format
    }

    pub fn dates(&self) -> &[Timestamp] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Text and epoch entries go through serde; Python `datetime` objects need
/// the opcode-level decoder.
fn decode_pickled_index(path: &Path) -> Result<Vec<Timestamp>> {
    let bytes = std::fs::read(path)?;
    match serde_pickle::from_slice(&bytes, serde_pickle::DeOptions::new()) {
        Ok(dates) => Ok(dates),
        Err(e) => {
            debug!("{}: {}, decoding as Python datetimes", path.display(), e);
            pickle_index::decode_dates(&bytes)
        }
    }
}

pub struct RecordReader<'a> {
    data_dir: PathBuf,
    index: &'a IndexContext,
}

impl<'a> RecordReader<'a> {
    pub fn new(data_dir: &Path, index: &'a IndexContext) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            index,
        }
    }

    /// Measurement files in the data directory, sorted by name, index excluded
    pub fn list_measurement_files(&self) -> Result<Vec<PathBuf>> {
        let format = self.index.format();
        let index_path = format.index_path(&self.data_dir);
        let mut files = Vec::new();

        for entry in std::fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if !path.is_file() || path == index_path {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) == Some(format.extension()) {
                files.push(path);
            }
        }
        files.sort();

        debug!(
            "Found {} measurement files in {}",
            files.len(),
            self.data_dir.display()
        );
        Ok(files)
    }

    /// Decode one measurement file and check it lines up with the index
    pub fn read_file(&self, path: &Path) -> Result<MeasurementFile> {
        let key = MeasurementKey::from_path(path)?;
        let values: Vec<Value> = self.index.format().decode(path)?;

        if values.len() != self.index.len() {
            return Err(InstallError::LengthMismatch {
                file: path.to_path_buf(),
                values: values.len(),
                dates: self.index.len(),
            });
        }

        debug!("Decoded {} ({} values)", key, values.len());
        Ok(MeasurementFile::new(key, path.to_path_buf(), values))
    }

    pub fn read_all(&self) -> Result<Vec<MeasurementFile>> {
        self.list_measurement_files()?
            .iter()
            .map(|path| self.read_file(path))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_pickle<T: serde::Serialize>(path: &Path, value: &T) {
        let bytes = serde_pickle::to_vec(value, serde_pickle::SerOptions::new()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn pickle_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_pickle(
            &dir.path().join("index.pkl"),
            &vec!["2021-01-01 00:00:00", "2021-01-01 01:00:00", "2021-01-01 02:00:00"],
        );
        write_pickle(
            &dir.path().join("1_2.pkl"),
            &vec![Value::from(1.5), Value::from(2.5), Value::from("ok")],
        );
        write_pickle(
            &dir.path().join("1_10.pkl"),
            &vec![Value::from(0.5), Value::from("nd"), Value::from(3.0)],
        );
        dir
    }

    #[test]
    fn test_detect_format() {
        let dir = pickle_dir();
        assert_eq!(BundleFormat::detect(dir.path()).unwrap(), BundleFormat::Pickle);

        let empty = TempDir::new().unwrap();
        assert!(matches!(
            BundleFormat::detect(empty.path()),
            Err(InstallError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_is_sorted_and_skips_index() -> Result<()> {
        let dir = pickle_dir();
        fs::write(dir.path().join("notes.txt"), b"ignored")?;
        let index = IndexContext::load(dir.path())?;
        let reader = RecordReader::new(dir.path(), &index);

        let files = reader.list_measurement_files()?;
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["1_10.pkl", "1_2.pkl"]);
        Ok(())
    }

    #[test]
    fn test_read_file_aligns_with_index() -> Result<()> {
        let dir = pickle_dir();
        let index = IndexContext::load(dir.path())?;
        let reader = RecordReader::new(dir.path(), &index);

        let file = reader.read_file(&dir.path().join("1_2.pkl"))?;
        assert_eq!(file.key, MeasurementKey::new(1, 2));
        assert_eq!(file.len(), index.len());
        assert_eq!(file.values[2], Value::Flag("ok".to_string()));
        Ok(())
    }

    #[test]
    fn test_length_mismatch_is_rejected() -> Result<()> {
        let dir = pickle_dir();
        write_pickle(&dir.path().join("3_4.pkl"), &vec![Value::from(1.0)]);
        let index = IndexContext::load(dir.path())?;
        let reader = RecordReader::new(dir.path(), &index);

        let err = reader.read_file(&dir.path().join("3_4.pkl")).unwrap_err();
        assert!(matches!(
            err,
            InstallError::LengthMismatch {
                values: 1,
                dates: 3,
                ..
            }
        ));
        assert!(reader.read_all().is_err());
        Ok(())
    }

    #[test]
    fn test_json_bundle() -> Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("index.json"), r#"["2020-05-01", "2020-05-02"]"#)?;
        fs::write(dir.path().join("7_99.json"), r#"[null, "calm"]"#)?;

        let index = IndexContext::load(dir.path())?;
        assert_eq!(index.format(), BundleFormat::Json);

        let files = RecordReader::new(dir.path(), &index).read_all()?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].key, MeasurementKey::new(7, 99));
        assert_eq!(files[0].flag_count(), 1);
        Ok(())
    }

    #[test]
    fn test_python_datetime_index() -> Result<()> {
        // pickle.dumps([datetime.datetime(2021, 2, 17, h) for h in range(3)], protocol=4)
        let index = b"\x80\x04\x95T\x00\x00\x00\x00\x00\x00\x00]\x94(\x8c\x08datetime\x94\x8c\x08datetime\x94\x93\x94C\n\x07\xe5\x02\x11\x00\x00\x00\x00\x00\x00\x94\x85\x94R\x94h\x03C\n\x07\xe5\x02\x11\x01\x00\x00\x00\x00\x00\x94\x85\x94R\x94h\x03C\n\x07\xe5\x02\x11\x02\x00\x00\x00\x00\x00\x94\x85\x94R\x94e.";
        // pickle.dumps([1.5, None, 'nd'], protocol=4)
        let values = b"\x80\x04\x95\x14\x00\x00\x00\x00\x00\x00\x00]\x94(G?\xf8\x00\x00\x00\x00\x00\x00N\x8c\x02nd\x94e.";
        let dir = TempDir::new()?;
        fs::write(dir.path().join("index.pkl"), index)?;
        fs::write(dir.path().join("3_8.pkl"), values)?;

        let index = IndexContext::load(dir.path())?;
        assert_eq!(index.dates()[2].to_string(), "2021-02-17 02:00:00");

        let file = RecordReader::new(dir.path(), &index).read_file(&dir.path().join("3_8.pkl"))?;
        assert_eq!(file.values[0], Value::Numeric(1.5));
        assert_eq!(file.values[2], Value::Flag("nd".to_string()));
        Ok(())
    }

    #[test]
    fn test_malformed_name_fails() -> Result<()> {
        let dir = pickle_dir();
        write_pickle(
            &dir.path().join("broken.pkl"),
            &vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)],
        );
        let index = IndexContext::load(dir.path())?;
        let reader = RecordReader::new(dir.path(), &index);

        assert!(matches!(
            reader.read_all(),
            Err(InstallError::InvalidFilename(_))
        ));
        Ok(())
    }
}
