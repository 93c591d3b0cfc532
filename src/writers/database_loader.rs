//! Loads decoded rows into a private copy of the template database and
//! publishes the finished file.
//!
//! The template is never opened for writing. All mutation happens on a
//! [`NamedTempFile`] copy which is removed when the loader is dropped, so a
//! failed install leaves neither a temporary database behind nor anything at
//! the destination.

use crate::error::{InstallError, Result};
use crate::models::{DataRow, MeasurementRow, MetaRow};
use crate::processors::MetaLookup;
use crate::utils::constants::{
    DATA_INDICES, INSERT_DATA_SQL, INSERT_FLAG_SQL, INSERT_MEASUREMENT_SQL,
};
use crate::utils::filename::temp_copy_prefix;
use crate::utils::progress::ProgressReporter;
use rusqlite::{params, Connection, Transaction};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Where the finished install landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFiles {
    pub database: PathBuf,
    pub license: PathBuf,
}

pub struct DatabaseLoader {
    template: PathBuf,
    working: NamedTempFile,
    conn: Connection,
}

impl DatabaseLoader {
    /// Copy the template into the system temp directory and open the copy
    pub fn acquire(template: &Path) -> Result<Self> {
        let source = File::open(template).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => InstallError::NotFound(format!(
                "Database '{}' does not exist",
                template.display()
            )),
            _ => InstallError::Io(e),
        })?;

        let mut working = tempfile::Builder::new()
            .prefix(&temp_copy_prefix(template))
            .tempfile()?;
        {
            let mut writer = BufWriter::new(working.as_file_mut());
            std::io::copy(&mut BufReader::new(source), &mut writer)?;
            writer.flush()?;
        }

        let conn = Connection::open(working.path())?;
        info!(
            "Working copy of {} created at {}",
            template.display(),
            working.path().display()
        );

        Ok(Self {
            template: template.to_path_buf(),
            working,
            conn,
        })
    }

    pub fn working_path(&self) -> &Path {
        self.working.path()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn meta_lookup(&self) -> Result<MetaLookup> {
        MetaLookup::load(&self.conn)
    }

    /// Start the single transaction that fills the `data` table
    pub fn begin_data(&mut self) -> Result<DataTransaction<'_>> {
        Ok(DataTransaction {
            tx: self.conn.transaction()?,
            data_rows: 0,
            flag_rows: 0,
        })
    }

    /// Insert all measurement rows in one transaction and commit
    pub fn load_measurements(
        &mut self,
        rows: &[MeasurementRow],
        progress: Option<&ProgressReporter>,
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(INSERT_MEASUREMENT_SQL)?;
            for row in rows {
                stmt.execute(params![row.param_id, row.station_id, row.has_data])?;
                if let Some(p) = progress {
                    p.increment(1);
                }
            }
        }
        tx.commit()?;

        info!("Inserted {} rows into measurement", rows.len());
        Ok(rows.len())
    }

    pub fn create_indices(&self) -> Result<()> {
        for (name, columns) in DATA_INDICES {
            debug!("Creating index {} on data ({})", name, columns);
            self.conn
                .execute(&format!("CREATE INDEX {} ON data ({})", name, columns), [])?;
        }
        info!("Created {} indices on data", DATA_INDICES.len());
        Ok(())
    }

    /// Close the database, then copy it and the license into `destination`.
    /// The destination directory is created if needed. The working copy is
    /// deleted whether or not publishing succeeds, and a database copied
    /// before a failed license copy is removed again.
    pub fn publish(self, destination: &Path, license: &Path) -> Result<PublishedFiles> {
        let Self {
            template,
            working,
            conn,
        } = self;
        conn.close().map_err(|(_, e)| InstallError::Database(e))?;

        std::fs::create_dir_all(destination)?;

        let database = destination.join(file_name(&template)?);
        let license_target = destination.join(file_name(license)?);
        std::fs::copy(working.path(), &database)?;
        working.close()?;

        if let Err(e) = std::fs::copy(license, &license_target) {
            warn!("License copy failed, removing {}", database.display());
            std::fs::remove_file(&database)?;
            return Err(e.into());
        }

        info!("Published {} and {}", database.display(), license_target.display());
        Ok(PublishedFiles {
            database,
            license: license_target,
        })
    }
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name()
        .ok_or_else(|| InstallError::Config(format!("'{}' has no file name", path.display())))
}

/// Bulk insert into `data`. Dropping it without [`DataTransaction::commit`]
/// rolls everything back.
pub struct DataTransaction<'conn> {
    tx: Transaction<'conn>,
    data_rows: usize,
    flag_rows: usize,
}

impl DataTransaction<'_> {
    pub fn insert_rows(&mut self, rows: &[DataRow]) -> Result<usize> {
        let mut stmt = self.tx.prepare_cached(INSERT_DATA_SQL)?;
        for row in rows {
            stmt.execute(params![
                row.param_id,
                row.station_id,
                row.date,
                row.value,
                row.meta_id
            ])?;
        }
        self.data_rows += rows.len();
        Ok(rows.len())
    }

    /// Flag rows go into `data` with a NULL value and their meta id
    pub fn insert_flags(&mut self, rows: &[MetaRow]) -> Result<usize> {
        let mut stmt = self.tx.prepare_cached(INSERT_FLAG_SQL)?;
        for row in rows {
            stmt.execute(params![row.param_id, row.station_id, row.date, row.meta_id])?;
        }
        self.flag_rows += rows.len();
        Ok(rows.len())
    }

    pub fn data_rows(&self) -> usize {
        self.data_rows
    }

    pub fn flag_rows(&self) -> usize {
        self.flag_rows
    }

    pub fn commit(self) -> Result<()> {
        let (data_rows, flag_rows) = (self.data_rows, self.flag_rows);
        self.tx.commit()?;
        info!(
            "Committed {} data rows and {} flag rows into data",
            data_rows, flag_rows
        );
        Ok(())
    }
}
