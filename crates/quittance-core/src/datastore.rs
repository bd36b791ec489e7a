use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StorageError;
use crate::rental::{Rental, RentalRef};

/// Storage collaborator the coverage session talks to.
pub trait RentalStore {
    fn load_rental(&self, selector: &RentalRef) -> Result<Rental, StorageError>;

    /// Persists `end_date` as the new end of coverage and marks the rental
    /// paid. Returns the stored record.
    fn save_rental_coverage(
        &self,
        uuid: Uuid,
        end_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Rental, StorageError>;
}

/// Rentals kept as JSON lines in a data directory.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub rentals_path: PathBuf,
    pub undo_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let rentals_path = data_dir.join("rentals.data");
        let undo_path = data_dir.join("undo.data");

        for path in [&rentals_path, &undo_path] {
            if !path.exists() {
                fs::write(path, "")?;
            }
        }

        info!(
            data_dir = %data_dir.display(),
            rentals = %rentals_path.display(),
            undo = %undo_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            rentals_path,
            undo_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_rentals(&self) -> Result<Vec<Rental>, StorageError> {
        load_jsonl(&self.rentals_path)
    }

    #[tracing::instrument(skip(self, rentals))]
    pub fn save_rentals(&self, rentals: &[Rental]) -> Result<(), StorageError> {
        save_jsonl_atomic(&self.rentals_path, rentals)
    }

    pub fn next_id(&self, rentals: &[Rental]) -> u64 {
        rentals.iter().map(|r| r.id).max().unwrap_or(0) + 1
    }

    #[tracing::instrument(skip(self, rental), fields(id = rental.id, uuid = %rental.uuid))]
    pub fn add_rental(&self, rental: Rental) -> Result<Vec<Rental>, StorageError> {
        let mut rentals = self.load_rentals()?;
        self.push_undo_snapshot(&rentals)?;
        rentals.push(rental);
        rentals.sort_by_key(|r| r.id);
        self.save_rentals(&rentals)?;
        Ok(rentals)
    }

    pub fn find(&self, selector: &RentalRef) -> Result<Rental, StorageError> {
        self.load_rentals()?
            .into_iter()
            .find(|r| selector.matches(r))
            .ok_or_else(|| StorageError::NotFound {
                selector: selector.to_string(),
            })
    }

    #[tracing::instrument(skip(self, rentals))]
    pub fn push_undo_snapshot(&self, rentals: &[Rental]) -> Result<(), StorageError> {
        let mut entries: Vec<Vec<Rental>> = load_jsonl(&self.undo_path)?;
        entries.push(rentals.to_vec());
        save_jsonl_atomic(&self.undo_path, &entries)
    }

    /// Restores the rentals as they were before the last change. Returns
    /// `false` when there is nothing to undo.
    #[tracing::instrument(skip(self))]
    pub fn pop_undo_snapshot(&self) -> Result<bool, StorageError> {
        let mut entries: Vec<Vec<Rental>> = load_jsonl(&self.undo_path)?;
        let Some(previous) = entries.pop() else {
            return Ok(false);
        };
        self.save_rentals(&previous)?;
        save_jsonl_atomic(&self.undo_path, &entries)?;
        info!(remaining = entries.len(), "restored undo snapshot");
        Ok(true)
    }
}

impl RentalStore for DataStore {
    #[tracing::instrument(skip_all, fields(selector = %selector))]
    fn load_rental(&self, selector: &RentalRef) -> Result<Rental, StorageError> {
        self.find(selector)
    }

    #[tracing::instrument(skip_all, fields(uuid = %uuid, end = %end_date))]
    fn save_rental_coverage(
        &self,
        uuid: Uuid,
        end_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Rental, StorageError> {
        let mut rentals = self.load_rentals()?;
        let before = rentals.clone();

        let rental = rentals
            .iter_mut()
            .find(|r| r.uuid == uuid)
            .ok_or_else(|| StorageError::NotFound {
                selector: uuid.to_string(),
            })?;
        rental.end_date = Some(end_date);
        rental.paid = true;
        rental.modified = now;
        let saved = rental.clone();

        self.push_undo_snapshot(&before)?;
        self.save_rentals(&rentals)?;

        info!(id = saved.id, "saved rental coverage");
        Ok(saved)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StorageError> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push(serde_json::from_str(trimmed)?);
    }

    debug!(count = out.len(), "loaded jsonl records");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StorageError> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path).map_err(|err| StorageError::Persist {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;

    Ok(())
}
