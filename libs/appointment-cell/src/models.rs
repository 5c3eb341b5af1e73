// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use shared_models::error::AppError;

use crate::services::time::TimeOfDay;

pub const MIN_SLOT_CAPACITY: u8 = 1;
pub const MAX_SLOT_CAPACITY: u8 = 2;

fn default_slot_capacity() -> u8 {
    MIN_SLOT_CAPACITY
}

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: String,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    #[serde(default)]
    pub professional_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default = "default_slot_capacity")]
    pub slot_capacity: u8,

    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub lead_display_name: Option<String>,

    pub status: AppointmentStatus,
    #[serde(default)]
    pub check_in_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub called_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub check_in_previous_status: Option<AppointmentStatus>,
    /// Room actually used at call time; starts as `room_id`.
    #[serde(default)]
    pub consultorio_id: Option<String>,
    /// Professional actually attending; starts as `professional_id`.
    #[serde(default)]
    pub dentist_id: Option<String>,

    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub procedure_name: Option<String>,
    #[serde(default)]
    pub insurance: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub confirmation_logs: Vec<ConfirmationLog>,
    #[serde(default)]
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn is_cancelled(&self) -> bool {
        self.status == AppointmentStatus::Cancelled
    }

    pub fn has_checked_in(&self) -> bool {
        self.check_in_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmationLog {
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Canonical workflow states. Legacy synonyms are folded in at the serde
/// boundary and never reach the state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AppointmentStatus {
    #[serde(rename = "AGENDADO")]
    Scheduled,

    #[serde(rename = "EM_CONFIRMACAO")]
    AwaitingConfirmation,

    #[serde(rename = "CONFIRMADO")]
    Confirmed,

    #[serde(rename = "CHEGOU")]
    Arrived,

    #[serde(rename = "EM_ESPERA")]
    Waiting,

    #[serde(rename = "EM_ATENDIMENTO")]
    InService,

    #[serde(rename = "FINALIZADO", alias = "ATENDIDO")]
    Finished,

    #[serde(rename = "ATRASADO")]
    Late,

    #[serde(rename = "FALTOU", alias = "FALTA")]
    NoShow,

    #[serde(rename = "CANCELADO", alias = "DESMARCOU")]
    Cancelled,

    #[serde(rename = "REAGENDAR", alias = "REAGENDAMENTO")]
    Reschedule,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 11] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::AwaitingConfirmation,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Arrived,
        AppointmentStatus::Waiting,
        AppointmentStatus::InService,
        AppointmentStatus::Finished,
        AppointmentStatus::Late,
        AppointmentStatus::NoShow,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Reschedule,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "AGENDADO",
            AppointmentStatus::AwaitingConfirmation => "EM_CONFIRMACAO",
            AppointmentStatus::Confirmed => "CONFIRMADO",
            AppointmentStatus::Arrived => "CHEGOU",
            AppointmentStatus::Waiting => "EM_ESPERA",
            AppointmentStatus::InService => "EM_ATENDIMENTO",
            AppointmentStatus::Finished => "FINALIZADO",
            AppointmentStatus::Late => "ATRASADO",
            AppointmentStatus::NoShow => "FALTOU",
            AppointmentStatus::Cancelled => "CANCELADO",
            AppointmentStatus::Reschedule => "REAGENDAR",
        }
    }

    /// Translation table for stored/legacy labels, synonyms included.
    pub fn from_label(raw: &str) -> Option<Self> {
        let status = match raw.trim().to_ascii_uppercase().as_str() {
            "AGENDADO" => AppointmentStatus::Scheduled,
            "EM_CONFIRMACAO" => AppointmentStatus::AwaitingConfirmation,
            "CONFIRMADO" => AppointmentStatus::Confirmed,
            "CHEGOU" => AppointmentStatus::Arrived,
            "EM_ESPERA" => AppointmentStatus::Waiting,
            "EM_ATENDIMENTO" => AppointmentStatus::InService,
            "FINALIZADO" | "ATENDIDO" => AppointmentStatus::Finished,
            "ATRASADO" => AppointmentStatus::Late,
            "FALTOU" | "FALTA" => AppointmentStatus::NoShow,
            "CANCELADO" | "DESMARCOU" => AppointmentStatus::Cancelled,
            "REAGENDAR" | "REAGENDAMENTO" => AppointmentStatus::Reschedule,
            _ => return None,
        };
        Some(status)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Finished | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Non-bookable interval on a professional or room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentBlock {
    pub id: String,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    #[serde(default)]
    pub professional_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Weekly working hours of a professional. `weekday` counts from Sunday = 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkHourRule {
    pub id: String,
    pub professional_id: String,
    pub weekday: u8,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    #[serde(default)]
    pub break_start: Option<TimeOfDay>,
    #[serde(default)]
    pub break_end: Option<TimeOfDay>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lead {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub timeline: Vec<LeadTimelineEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadTimelineEvent {
    pub at: DateTime<Utc>,
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub appointment_id: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailableSlot {
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
}

// ==============================================================================
// WORKFLOW OPERATIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowOperation {
    CheckIn,
    UndoCheckIn,
    CallToRoom,
    Finish,
    ReturnToWaiting,
    Cancel,
    RequestConfirmation,
    Confirm,
    MarkLate,
    MarkNoShow,
    FlagForReschedule,
}

impl WorkflowOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowOperation::CheckIn => "check_in",
            WorkflowOperation::UndoCheckIn => "undo_check_in",
            WorkflowOperation::CallToRoom => "call_to_room",
            WorkflowOperation::Finish => "finish",
            WorkflowOperation::ReturnToWaiting => "return_to_waiting",
            WorkflowOperation::Cancel => "cancel",
            WorkflowOperation::RequestConfirmation => "request_confirmation",
            WorkflowOperation::Confirm => "confirm",
            WorkflowOperation::MarkLate => "mark_late",
            WorkflowOperation::MarkNoShow => "mark_no_show",
            WorkflowOperation::FlagForReschedule => "flag_for_reschedule",
        }
    }
}

impl fmt::Display for WorkflowOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// REQUEST / RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration_minutes: Option<u32>,
    pub professional_id: Option<String>,
    pub room_id: Option<String>,
    pub slot_capacity: Option<u8>,
    pub patient_id: Option<String>,
    pub notes: Option<String>,
    pub procedure_name: Option<String>,
    pub insurance: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateLeadAppointmentRequest {
    pub lead_id: Option<String>,
    #[serde(flatten)]
    pub appointment: CreateAppointmentRequest,
}

/// Generic field patch; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration_minutes: Option<u32>,
    pub professional_id: Option<String>,
    pub room_id: Option<String>,
    pub dentist_id: Option<String>,
    pub consultorio_id: Option<String>,
    pub slot_capacity: Option<u8>,
    pub patient_id: Option<String>,
    pub notes: Option<String>,
    pub procedure_name: Option<String>,
    pub insurance: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallToRoomRequest {
    pub consultorio_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfirmAppointmentRequest {
    pub channel: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateBlockRequest {
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub professional_id: Option<String>,
    pub room_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertWorkHourRequest {
    pub id: Option<String>,
    pub professional_id: String,
    pub weekday: u8,
    pub start_time: String,
    pub end_time: String,
    pub break_start: Option<String>,
    pub break_end: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
    pub professional_id: String,
    pub duration_minutes: u32,
    pub room_id: Option<String>,
    #[serde(default)]
    pub allow_double_booking: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentFilter {
    pub date: Option<NaiveDate>,
    pub professional_id: Option<String>,
    pub room_id: Option<String>,
    #[serde(default)]
    pub include_cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckRequest {
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub professional_id: Option<String>,
    pub room_id: Option<String>,
    pub slot_capacity: Option<u8>,
    pub exclude_appointment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_id: Option<String>,
    pub conflict_kind: Option<ConflictKind>,
    pub reason: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Appointment,
    Block,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::Appointment => write!(f, "appointment"),
            ConflictKind::Block => write!(f, "block"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("{operation} is not allowed while the appointment is {status}")]
    InvalidTransition {
        operation: WorkflowOperation,
        status: AppointmentStatus,
    },

    #[error("{operation} requires a recorded check-in")]
    MissingCheckIn { operation: WorkflowOperation },

    #[error("{operation} requires an appointment without check-in")]
    AlreadyCheckedIn { operation: WorkflowOperation },

    #[error("appointment is already {status}")]
    TerminalStatus { status: AppointmentStatus },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppointmentError {
    #[error("Validation error on `{field}`: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Scheduling conflict with {kind} {conflicting_id}")]
    Conflict {
        kind: ConflictKind,
        conflicting_id: String,
    },

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage error: {0}")]
    Store(String),
}

impl AppointmentError {
    pub fn missing(field: &'static str) -> Self {
        AppointmentError::Validation {
            field,
            message: "is required".to_string(),
        }
    }

    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        AppointmentError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        AppointmentError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        let message = error.to_string();
        match error {
            AppointmentError::Validation { .. } => AppError::ValidationError(message),
            AppointmentError::Conflict { .. } | AppointmentError::Workflow(_) => {
                AppError::Conflict(message)
            }
            AppointmentError::Authorization(_) => AppError::Forbidden(message),
            AppointmentError::NotFound { .. } => AppError::NotFound(message),
            AppointmentError::Store(_) => AppError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms_collapse_to_one_status() {
        let pairs = [
            ("\"ATENDIDO\"", AppointmentStatus::Finished),
            ("\"FINALIZADO\"", AppointmentStatus::Finished),
            ("\"DESMARCOU\"", AppointmentStatus::Cancelled),
            ("\"REAGENDAMENTO\"", AppointmentStatus::Reschedule),
            ("\"FALTA\"", AppointmentStatus::NoShow),
        ];
        for (json, expected) in pairs {
            let status: AppointmentStatus = serde_json::from_str(json).unwrap();
            assert_eq!(status, expected);
        }

        // Serialisation always writes the canonical label.
        assert_eq!(
            serde_json::to_string(&AppointmentStatus::Finished).unwrap(),
            "\"FINALIZADO\""
        );
    }

    #[test]
    fn test_label_table_matches_serde() {
        for status in AppointmentStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.label()));
            assert_eq!(AppointmentStatus::from_label(status.label()), Some(status));
        }
        assert_eq!(AppointmentStatus::from_label("desmarcou"), Some(AppointmentStatus::Cancelled));
        assert_eq!(AppointmentStatus::from_label("unknown"), None);
    }

    #[test]
    fn test_error_mapping_to_http() {
        let conflict = AppointmentError::Conflict {
            kind: ConflictKind::Block,
            conflicting_id: "blk_1".into(),
        };
        assert!(matches!(AppError::from(conflict), AppError::Conflict(_)));
        assert!(matches!(
            AppError::from(AppointmentError::missing("date")),
            AppError::ValidationError(_)
        ));
        assert!(matches!(
            AppError::from(AppointmentError::Authorization("nope".into())),
            AppError::Forbidden(_)
        ));
    }
}
