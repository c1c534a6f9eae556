use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::scan_types::{CourtSlotStatus, PersistenceError};

/// File holding the last-known status of every slot
pub const COURT_STATES_FILE: &str = "court_states.json";

/// File holding the dates already notified
pub const KNOWN_DATES_FILE: &str = "known_dates.json";

/// Slot statuses of one court on one date, keyed by start time
pub type CourtDay = BTreeMap<NaiveTime, CourtSlotStatus>;

/// Durable record of what the scanner has seen and announced.
///
/// Both records live in memory and reach the disk only through
/// [`StateStore::persist`], which replaces each document atomically.
#[derive(Debug)]
pub struct StateStore {
    dir: PathBuf,
    court_states: BTreeMap<(String, NaiveDate), CourtDay>,
    known_dates: BTreeMap<NaiveDate, bool>,
}

impl StateStore {
    /// Empty store persisting into `dir`, ignoring anything already there
    pub fn empty(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            court_states: BTreeMap::new(),
            known_dates: BTreeMap::new(),
        }
    }

    /// Load both records from `dir`.
    ///
    /// A missing or unreadable document starts out empty; the store is
    /// rebuilt by the next successful cycle.
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let mut store = Self::empty(dir);

        let statuses: Vec<CourtSlotStatus> = read_document(&store.dir.join(COURT_STATES_FILE));
        for status in statuses {
            store.set_status(status);
        }
        store.known_dates = read_document(&store.dir.join(KNOWN_DATES_FILE));

        info!(
            "Loaded scan state from {}: {} slots, {} known dates",
            store.dir.display(),
            store.slot_count(),
            store.known_dates.len()
        );

        store
    }

    /// Directory holding the state documents
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Last-known status of one slot
    pub fn get_status(&self, court: &str, date: NaiveDate, time: NaiveTime) -> Option<&CourtSlotStatus> {
        self.court_states
            .get(&(court.to_string(), date))
            .and_then(|day| day.get(&time))
    }

    /// Every known slot of one court on one date
    pub fn court_day(&self, court: &str, date: NaiveDate) -> Option<&CourtDay> {
        self.court_states.get(&(court.to_string(), date))
    }

    /// Insert or replace the status of a slot
    pub fn set_status(&mut self, status: CourtSlotStatus) {
        self.court_states
            .entry((status.court.clone(), status.date))
            .or_default()
            .insert(status.time, status);
    }

    /// Forget a slot, returning its last status
    pub fn remove_status(
        &mut self,
        court: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Option<CourtSlotStatus> {
        let key = (court.to_string(), date);
        let day = self.court_states.get_mut(&key)?;
        let removed = day.remove(&time);
        if day.is_empty() {
            self.court_states.remove(&key);
        }
        removed
    }

    /// Whether a notification was already delivered for `date`
    pub fn is_date_known(&self, date: NaiveDate) -> bool {
        self.known_dates.get(&date).copied().unwrap_or(false)
    }

    /// Record that `date` has been notified
    pub fn mark_date_known(&mut self, date: NaiveDate) {
        self.known_dates.insert(date, true);
    }

    /// Number of slots with a stored status
    pub fn slot_count(&self) -> usize {
        self.court_states.values().map(BTreeMap::len).sum()
    }

    /// Number of dates already notified
    pub fn known_date_count(&self) -> usize {
        self.known_dates.values().filter(|known| **known).count()
    }

    /// Drop every slot and known date before `today`, returning how many entries went away
    pub fn prune_expired(&mut self, today: NaiveDate) -> usize {
        let slots_before = self.slot_count();
        let dates_before = self.known_dates.len();

        self.court_states.retain(|(_, date), _| *date >= today);
        self.known_dates.retain(|date, _| *date >= today);

        let pruned = (slots_before - self.slot_count()) + (dates_before - self.known_dates.len());
        if pruned > 0 {
            debug!("Pruned {} expired entries before {}", pruned, today);
        }
        pruned
    }

    /// Write both records to disk
    pub fn persist(&self) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir).map_err(|source| PersistenceError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let statuses: Vec<&CourtSlotStatus> = self
            .court_states
            .values()
            .flat_map(BTreeMap::values)
            .collect();

        write_atomically(
            &self.dir.join(COURT_STATES_FILE),
            &serde_json::to_vec_pretty(&statuses)?,
        )?;
        write_atomically(
            &self.dir.join(KNOWN_DATES_FILE),
            &serde_json::to_vec_pretty(&self.known_dates)?,
        )?;

        debug!(
            "Persisted {} slots and {} known dates",
            statuses.len(),
            self.known_dates.len()
        );
        Ok(())
    }
}

/// Read a JSON document, falling back to its default on any failure
fn read_document<T: DeserializeOwned + Default>(path: &Path) -> T {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("No state found at {}, starting empty", path.display());
            return T::default();
        }
        Err(e) => {
            warn!("Could not read {}, starting empty: {}", path.display(), e);
            return T::default();
        }
    };

    serde_json::from_str(&text).unwrap_or_else(|e| {
        warn!("State document {} is malformed, starting empty: {}", path.display(), e);
        T::default()
    })
}

/// Replace `path` with `contents` through a temporary sibling and a rename
fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let tmp_path = path.with_extension("json.tmp");
    let io_error = |source| PersistenceError::Io {
        path: tmp_path.clone(),
        source,
    };

    let mut file = fs::File::create(&tmp_path).map_err(io_error)?;
    file.write_all(contents).map_err(io_error)?;
    file.sync_all().map_err(io_error)?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}
