use crate::error::Result;
use crate::processors::{MetaLookup, RowClassifier};
use crate::readers::{BundleLayout, IndexContext, RecordReader};
use crate::utils::permissions::ensure_writable;
use crate::utils::progress::ProgressReporter;
use crate::writers::{DatabaseLoader, PublishedFiles};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub destination: PathBuf,
    pub bundle_dir: PathBuf,
    pub with_flags: bool,
    pub silent: bool,
}

impl InstallOptions {
    pub fn new(destination: &Path, bundle_dir: &Path) -> Self {
        Self {
            destination: destination.to_path_buf(),
            bundle_dir: bundle_dir.to_path_buf(),
            with_flags: false,
            silent: false,
        }
    }

    /// Also store flagged observations in `data` (NULL value, resolved meta id)
    pub fn with_flags(mut self, with_flags: bool) -> Self {
        self.with_flags = with_flags;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub files: usize,
    pub data_rows: usize,
    pub measurement_rows: usize,
    pub flag_rows: usize,
    /// Flagged observations per resolved `meta` id
    pub flags_by_meta: BTreeMap<u32, usize>,
    pub flags_persisted: bool,
    pub published: PublishedFiles,
    pub elapsed: Duration,
}

impl InstallReport {
    pub fn summary(&self) -> String {
        let secs = self.elapsed.as_secs();
        let mut summary = format!(
            "Installed {} measurement files: {} data rows, {} measurement rows\n",
            self.files, self.data_rows, self.measurement_rows
        );
        if self.flags_persisted {
            summary.push_str(&format!("Stored {} flagged observations\n", self.flag_rows));
        } else if self.flag_rows > 0 {
            summary.push_str(&format!(
                "Skipped {} flagged observations (use --with-flags to store them)\n",
                self.flag_rows
            ));
        }
        summary.push_str(&format!("Database: {}\n", self.published.database.display()));
        summary.push_str(&format!(
            "Database created in {} min. {} sec.",
            secs / 60,
            secs % 60
        ));
        summary
    }
}

/// Runs a whole install: resolve the bundle, fill a working copy of the
/// database, index it and publish it to the destination.
pub struct Installer {
    options: InstallOptions,
}

impl Installer {
    pub fn new(options: InstallOptions) -> Self {
        Self { options }
    }

    pub fn run(&self) -> Result<InstallReport> {
        let started = Instant::now();
        let silent = self.options.silent;

        ensure_writable(&self.options.destination)?;

        let bundle = BundleLayout::resolve(&self.options.bundle_dir)?;
        let index = IndexContext::load(&bundle.data_dir)?;
        let reader = RecordReader::new(&bundle.data_dir, &index);
        let files = reader.list_measurement_files()?;
        if files.is_empty() {
            warn!("No measurement files found in {}", bundle.data_dir.display());
        }

        let mut loader = DatabaseLoader::acquire(&bundle.database)?;

        let lookup = loader.meta_lookup()?;
        debug!("Meta lookup holds {} flag names", lookup.len());
        let classifier = RowClassifier::new(lookup);

        info!("Loading {} measurement files", files.len());
        let progress = ProgressReporter::new(files.len() as u64, "Building data", silent);
        let mut measurements = Vec::with_capacity(files.len());
        let mut flags_by_meta: BTreeMap<u32, usize> = BTreeMap::new();
        let data_rows = {
            let mut tx = loader.begin_data()?;
            for path in &files {
                let file = reader.read_file(path)?;
                let rows = classifier.classify(&file, index.dates())?;

                tx.insert_rows(&rows.data)?;
                if self.options.with_flags {
                    tx.insert_flags(&rows.meta)?;
                }
                for row in &rows.meta {
                    *flags_by_meta.entry(row.meta_id).or_insert(0) += 1;
                }
                measurements.push(rows.measurement);
                progress.increment(1);
            }
            let data_rows = tx.data_rows();
            tx.commit()?;
            data_rows
        };
        progress.finish_with_message("Building data");

        let flag_rows: usize = flags_by_meta.values().sum();
        if let Some(unregistered) = flags_by_meta.get(&MetaLookup::UNSPECIFIED) {
            warn!("{} flagged observations have no entry in the meta table", unregistered);
        }

        let progress = ProgressReporter::new(
            measurements.len() as u64,
            "Creating measurement table",
            silent,
        );
        let measurement_rows = loader.load_measurements(&measurements, Some(&progress))?;
        progress.finish_with_message("Creating measurement table");

        let spinner = ProgressReporter::new_spinner("Creating indices...", silent);
        loader.create_indices()?;
        spinner.finish_with_message("Indices created");

        let published = loader.publish(&self.options.destination, &bundle.license)?;

        Ok(InstallReport {
            files: files.len(),
            data_rows,
            measurement_rows,
            flag_rows,
            flags_by_meta,
            flags_persisted: self.options.with_flags,
            published,
            elapsed: started.elapsed(),
        })
    }
}
