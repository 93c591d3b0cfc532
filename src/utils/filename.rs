use crate::error::{InstallError, Result};
use crate::models::MeasurementKey;
use std::path::Path;

/// Extract `(param_id, station_id)` from a measurement file name.
///
/// Everything from the first `.` on is ignored, and the remaining stem must be
/// exactly two unsigned integers joined by `_`, e.g. `8_1021.pkl`.
pub fn parse_measurement_key(path: &Path) -> Result<MeasurementKey> {
    let filename = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| InstallError::InvalidFilename(path.display().to_string()))?;

    let stem = filename.split('.').next().unwrap_or(filename);
    let parts: Vec<&str> = stem.split('_').collect();

    if parts.len() != 2 {
        return Err(InstallError::InvalidFilename(format!(
            "'{}'. Expected format: '<param>_<station>.<ext>'",
            filename
        )));
    }

    let param_id = parts[0].parse::<u32>().map_err(|_| {
        InstallError::InvalidFilename(format!("'{}': invalid parameter id '{}'", filename, parts[0]))
    })?;

    let station_id = parts[1].parse::<u32>().map_err(|_| {
        InstallError::InvalidFilename(format!("'{}': invalid station id '{}'", filename, parts[1]))
    })?;

    Ok(MeasurementKey::new(param_id, station_id))
}

/// Name of the temporary working copy, `<db file name>_<random>`
pub fn temp_copy_prefix(db_file: &Path) -> String {
    let name = db_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "database".to_string());
    format!("{}_", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_measurement_key() {
        let key = parse_measurement_key(&PathBuf::from("/data/pkl/8_1021.pkl")).unwrap();
        assert_eq!(key, MeasurementKey::new(8, 1021));

        let key = parse_measurement_key(&PathBuf::from("1_2.json")).unwrap();
        assert_eq!(key, MeasurementKey::new(1, 2));
    }

    #[test]
    fn test_invalid_names() {
        assert!(parse_measurement_key(&PathBuf::from("index.pkl")).is_err());
        assert!(parse_measurement_key(&PathBuf::from("1_2_3.pkl")).is_err());
        assert!(parse_measurement_key(&PathBuf::from("a_2.pkl")).is_err());
        assert!(parse_measurement_key(&PathBuf::from("1_-2.pkl")).is_err());
        assert!(parse_measurement_key(&PathBuf::from("12.pkl")).is_err());
    }

    #[test]
    fn test_invalid_name_is_reported() {
        let err = parse_measurement_key(&PathBuf::from("x_1.pkl")).unwrap_err();
        assert!(matches!(err, InstallError::InvalidFilename(_)));
        assert!(err.to_string().contains("x_1.pkl"));
    }

    #[test]
    fn test_temp_copy_prefix() {
        assert_eq!(temp_copy_prefix(&PathBuf::from("/opt/air/air.db")), "air.db_");
    }
}
