// libs/appointment-cell/src/services/store.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{Appointment, AppointmentBlock, AppointmentError, Lead, WorkHourRule};

/// The whole scheduling document: every appointment, block, work-hour rule and lead.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchedulingState {
    #[serde(default)]
    pub appointments: Vec<Appointment>,
    #[serde(default)]
    pub blocks: Vec<AppointmentBlock>,
    #[serde(default)]
    pub work_hours: Vec<WorkHourRule>,
    #[serde(default)]
    pub leads: Vec<Lead>,
}

impl SchedulingState {
    pub fn appointment(&self, id: &str) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn appointment_index(&self, id: &str) -> Result<usize, AppointmentError> {
        self.appointments
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| AppointmentError::not_found("appointment", id))
    }

    /// Appointments that still occupy their slot on `date`.
    pub fn active_appointments_on(&self, date: NaiveDate) -> Vec<Appointment> {
        self.appointments
            .iter()
            .filter(|a| a.date == date && !a.is_cancelled())
            .cloned()
            .collect()
    }

    pub fn blocks_on(&self, date: NaiveDate) -> Vec<AppointmentBlock> {
        self.blocks.iter().filter(|b| b.date == date).cloned().collect()
    }

    pub fn lead_mut(&mut self, id: &str) -> Result<&mut Lead, AppointmentError> {
        self.leads
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| AppointmentError::not_found("lead", id))
    }
}

pub type Mutator<'a> = dyn FnMut(&mut SchedulingState) -> Result<(), AppointmentError> + 'a;

/// Document store with snapshot reads and atomic read-validate-write mutations.
///
/// `transact` must hold off every other `transact` call for its full duration
/// and only publish the mutated document when the mutator returns `Ok`.
pub trait SchedulingStore: Send + Sync {
    fn snapshot(&self) -> Result<SchedulingState, AppointmentError>;

    fn transact(&self, mutator: &mut Mutator<'_>) -> Result<(), AppointmentError>;
}

/// Run `f` inside the store's atomic section and hand back whatever it extracts.
pub fn mutate<R>(
    store: &dyn SchedulingStore,
    f: impl FnOnce(&mut SchedulingState) -> Result<R, AppointmentError>,
) -> Result<R, AppointmentError> {
    let mut f = Some(f);
    let mut output = None;

    store.transact(&mut |state| {
        let f = f
            .take()
            .ok_or_else(|| AppointmentError::Store("mutator invoked twice".to_string()))?;
        output = Some(f(state)?);
        Ok(())
    })?;

    output.ok_or_else(|| AppointmentError::Store("mutator was never invoked".to_string()))
}

fn poisoned() -> AppointmentError {
    AppointmentError::Store("scheduling state lock poisoned".to_string())
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<SchedulingState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SchedulingState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }
}

impl SchedulingStore for InMemoryStore {
    fn snapshot(&self) -> Result<SchedulingState, AppointmentError> {
        Ok(self.state.read().map_err(|_| poisoned())?.clone())
    }

    fn transact(&self, mutator: &mut Mutator<'_>) -> Result<(), AppointmentError> {
        let mut guard = self.state.write().map_err(|_| poisoned())?;
        let mut working = guard.clone();
        mutator(&mut working)?;
        *guard = working;
        Ok(())
    }
}

// ==============================================================================
// JSON FILE STORE
// ==============================================================================

/// Keeps the document in memory and rewrites the JSON file after every
/// successful transaction (temp file + rename).
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<SchedulingState>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppointmentError> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| AppointmentError::Store(format!("failed to read {}: {}", path.display(), e)))?;
            if raw.trim().is_empty() {
                SchedulingState::default()
            } else {
                serde_json::from_str(&raw).map_err(|e| {
                    AppointmentError::Store(format!("failed to parse {}: {}", path.display(), e))
                })?
            }
        } else {
            debug!("No scheduling data at {}, starting empty", path.display());
            SchedulingState::default()
        };

        info!(
            path = %path.display(),
            appointments = state.appointments.len(),
            blocks = state.blocks.len(),
            "Scheduling store loaded"
        );

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &SchedulingState) -> Result<(), AppointmentError> {
        let encoded = serde_json::to_vec_pretty(state)
            .map_err(|e| AppointmentError::Store(format!("failed to encode state: {}", e)))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, encoded)
            .map_err(|e| AppointmentError::Store(format!("failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| AppointmentError::Store(format!("failed to replace {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

impl SchedulingStore for JsonFileStore {
    fn snapshot(&self) -> Result<SchedulingState, AppointmentError> {
        Ok(self.state.read().map_err(|_| poisoned())?.clone())
    }

    fn transact(&self, mutator: &mut Mutator<'_>) -> Result<(), AppointmentError> {
        let mut guard = self.state.write().map_err(|_| poisoned())?;
        let mut working = guard.clone();
        mutator(&mut working)?;
        self.persist(&working)?;
        *guard = working;
        Ok(())
    }
}
