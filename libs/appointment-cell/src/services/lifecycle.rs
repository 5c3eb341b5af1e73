// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::{Appointment, AppointmentStatus, ConfirmationLog, WorkflowError, WorkflowOperation};

/// An actor-initiated workflow step together with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    CheckIn,
    UndoCheckIn,
    CallToRoom {
        consultorio_id: Option<String>,
    },
    Finish,
    ReturnToWaiting,
    Cancel {
        reason: Option<String>,
    },
    RequestConfirmation,
    Confirm {
        channel: Option<String>,
        note: Option<String>,
        actor_id: Option<String>,
    },
    MarkLate,
    MarkNoShow,
    FlagForReschedule,
}

impl Transition {
    pub fn operation(&self) -> WorkflowOperation {
        match self {
            Transition::CheckIn => WorkflowOperation::CheckIn,
            Transition::UndoCheckIn => WorkflowOperation::UndoCheckIn,
            Transition::CallToRoom { .. } => WorkflowOperation::CallToRoom,
            Transition::Finish => WorkflowOperation::Finish,
            Transition::ReturnToWaiting => WorkflowOperation::ReturnToWaiting,
            Transition::Cancel { .. } => WorkflowOperation::Cancel,
            Transition::RequestConfirmation => WorkflowOperation::RequestConfirmation,
            Transition::Confirm { .. } => WorkflowOperation::Confirm,
            Transition::MarkLate => WorkflowOperation::MarkLate,
            Transition::MarkNoShow => WorkflowOperation::MarkNoShow,
            Transition::FlagForReschedule => WorkflowOperation::FlagForReschedule,
        }
    }
}

/// Whether an operation needs the check-in stamp present, absent, or doesn't care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckInRule {
    Required,
    Forbidden,
    Any,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Statuses normalization never touches.
    pub fn is_protected(&self, status: AppointmentStatus) -> bool {
        matches!(status, AppointmentStatus::InService | AppointmentStatus::Finished)
    }

    /// Status as the workflow sees it: a checked-in record still carrying a
    /// pre-arrival status reads as waiting.
    pub fn effective_status(&self, appointment: &Appointment) -> AppointmentStatus {
        let status = appointment.status;
        if self.is_protected(status) || !appointment.has_checked_in() {
            return status;
        }
        match status {
            AppointmentStatus::Scheduled
            | AppointmentStatus::Confirmed
            | AppointmentStatus::AwaitingConfirmation
            | AppointmentStatus::Arrived => AppointmentStatus::Waiting,
            other => other,
        }
    }

    /// Copy of the record with the effective status applied. Nothing is persisted here.
    pub fn normalize(&self, appointment: &Appointment) -> Appointment {
        let mut normalized = appointment.clone();
        normalized.status = self.effective_status(appointment);
        normalized
    }

    /// Source statuses each operation accepts (terminal statuses are rejected separately).
    pub fn allowed_from(&self, operation: WorkflowOperation) -> &'static [AppointmentStatus] {
        use AppointmentStatus::*;
        match operation {
            WorkflowOperation::CheckIn => &[Scheduled, Confirmed, Late],
            WorkflowOperation::UndoCheckIn => &[Waiting],
            WorkflowOperation::CallToRoom => &[Waiting, Arrived],
            WorkflowOperation::Finish => &[InService],
            WorkflowOperation::ReturnToWaiting => &[InService],
            WorkflowOperation::Cancel => &[
                Scheduled,
                AwaitingConfirmation,
                Confirmed,
                Arrived,
                Waiting,
                InService,
                Late,
                Reschedule,
            ],
            WorkflowOperation::RequestConfirmation => &[Scheduled],
            WorkflowOperation::Confirm => &[Scheduled, AwaitingConfirmation, Late],
            WorkflowOperation::MarkLate => &[Scheduled, AwaitingConfirmation, Confirmed],
            WorkflowOperation::MarkNoShow => &[Scheduled, AwaitingConfirmation, Confirmed, Late],
            WorkflowOperation::FlagForReschedule => &[
                Scheduled,
                AwaitingConfirmation,
                Confirmed,
                Arrived,
                Waiting,
                Late,
                Reschedule,
            ],
        }
    }

    fn check_in_rule(&self, operation: WorkflowOperation) -> CheckInRule {
        match operation {
            WorkflowOperation::UndoCheckIn
            | WorkflowOperation::CallToRoom
            | WorkflowOperation::ReturnToWaiting => CheckInRule::Required,
            WorkflowOperation::Confirm | WorkflowOperation::MarkLate | WorkflowOperation::MarkNoShow => {
                CheckInRule::Forbidden
            }
            _ => CheckInRule::Any,
        }
    }

    /// Validate `operation` against the record's effective status.
    pub fn validate(&self, appointment: &Appointment, operation: WorkflowOperation) -> Result<(), WorkflowError> {
        let status = self.effective_status(appointment);

        if status.is_terminal() {
            return Err(WorkflowError::TerminalStatus { status });
        }
        if !self.allowed_from(operation).contains(&status) {
            return Err(WorkflowError::InvalidTransition { operation, status });
        }
        match self.check_in_rule(operation) {
            CheckInRule::Required if !appointment.has_checked_in() => {
                Err(WorkflowError::MissingCheckIn { operation })
            }
            CheckInRule::Forbidden if appointment.has_checked_in() => {
                Err(WorkflowError::AlreadyCheckedIn { operation })
            }
            _ => Ok(()),
        }
    }

    /// Operations that would currently succeed on this record.
    pub fn get_valid_operations(&self, appointment: &Appointment) -> Vec<WorkflowOperation> {
        [
            WorkflowOperation::CheckIn,
            WorkflowOperation::UndoCheckIn,
            WorkflowOperation::CallToRoom,
            WorkflowOperation::Finish,
            WorkflowOperation::ReturnToWaiting,
            WorkflowOperation::Cancel,
            WorkflowOperation::RequestConfirmation,
            WorkflowOperation::Confirm,
            WorkflowOperation::MarkLate,
            WorkflowOperation::MarkNoShow,
            WorkflowOperation::FlagForReschedule,
        ]
        .into_iter()
        .filter(|op| self.validate(appointment, *op).is_ok())
        .collect()
    }

    /// Compute the next record for `transition`. The input is left untouched.
    pub fn apply(
        &self,
        appointment: &Appointment,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Appointment, WorkflowError> {
        let operation = transition.operation();
        if let Err(e) = self.validate(appointment, operation) {
            warn!(appointment_id = %appointment.id, "Workflow transition rejected: {}", e);
            return Err(e);
        }

        let from = self.effective_status(appointment);
        let mut next = self.normalize(appointment);

        match transition {
            Transition::CheckIn => {
                next.status = AppointmentStatus::Arrived;
                next.check_in_at = Some(now);
                next.check_in_previous_status = Some(from);
                next.called_at = None;
                next.started_at = None;
                next.finished_at = None;
            }
            Transition::UndoCheckIn => {
                next.status = match appointment.check_in_previous_status {
                    Some(previous) => previous,
                    None if !appointment.confirmation_logs.is_empty() => AppointmentStatus::Confirmed,
                    None => AppointmentStatus::Scheduled,
                };
                clear_workflow_stamps(&mut next);
            }
            Transition::CallToRoom { consultorio_id } => {
                next.status = AppointmentStatus::InService;
                next.called_at = Some(now);
                next.started_at = Some(now);
                next.finished_at = None;
                next.consultorio_id = consultorio_id
                    .clone()
                    .filter(|id| !id.trim().is_empty())
                    .or_else(|| appointment.consultorio_id.clone())
                    .or_else(|| appointment.room_id.clone());
            }
            Transition::Finish => {
                next.status = AppointmentStatus::Finished;
                next.finished_at = Some(now);
            }
            Transition::ReturnToWaiting => {
                next.status = AppointmentStatus::Waiting;
                next.called_at = None;
                next.started_at = None;
                next.finished_at = None;
            }
            Transition::Cancel { reason } => {
                next.status = AppointmentStatus::Cancelled;
                next.cancel_reason = reason.clone();
            }
            Transition::RequestConfirmation => {
                next.status = AppointmentStatus::AwaitingConfirmation;
            }
            Transition::Confirm { channel, note, actor_id } => {
                next.status = AppointmentStatus::Confirmed;
                next.confirmation_logs.push(ConfirmationLog {
                    at: now,
                    channel: channel.clone(),
                    actor_id: actor_id.clone(),
                    note: note.clone(),
                });
            }
            Transition::MarkLate => {
                next.status = AppointmentStatus::Late;
            }
            Transition::MarkNoShow => {
                next.status = AppointmentStatus::NoShow;
            }
            Transition::FlagForReschedule => {
                next.status = AppointmentStatus::Reschedule;
                clear_workflow_stamps(&mut next);
            }
        }

        next.updated_at = now;
        debug!(
            appointment_id = %next.id,
            "Workflow {}: {} -> {}", operation, from, next.status
        );
        Ok(next)
    }
}

fn clear_workflow_stamps(appointment: &mut Appointment) {
    appointment.check_in_at = None;
    appointment.called_at = None;
    appointment.started_at = None;
    appointment.finished_at = None;
    appointment.check_in_previous_status = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::time::TimeOfDay;
    use chrono::{Duration, NaiveDate};

    fn scheduled() -> Appointment {
        let created = Utc::now() - Duration::hours(1);
        Appointment {
            id: "apt_1".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            start_time: TimeOfDay::parse("10:00").unwrap(),
            end_time: TimeOfDay::parse("10:30").unwrap(),
            professional_id: Some("pro_1".to_string()),
            room_id: Some("room_1".to_string()),
            slot_capacity: 1,
            patient_id: Some("pat_1".to_string()),
            lead_id: None,
            lead_display_name: None,
            status: AppointmentStatus::Scheduled,
            check_in_at: None,
            called_at: None,
            started_at: None,
            finished_at: None,
            check_in_previous_status: None,
            consultorio_id: Some("room_1".to_string()),
            dentist_id: Some("pro_1".to_string()),
            notes: None,
            procedure_name: None,
            insurance: None,
            channel: None,
            duration_minutes: 30,
            confirmation_logs: Vec::new(),
            cancel_reason: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_normalization_coerces_checked_in_records() {
        let service = AppointmentLifecycleService::new();
        let mut appointment = scheduled();
        appointment.check_in_at = Some(Utc::now());

        for status in [
            AppointmentStatus::Scheduled,
            AppointmentStatus::Confirmed,
            AppointmentStatus::AwaitingConfirmation,
            AppointmentStatus::Arrived,
        ] {
            appointment.status = status;
            assert_eq!(service.effective_status(&appointment), AppointmentStatus::Waiting);
        }

        appointment.status = AppointmentStatus::Late;
        assert_eq!(service.effective_status(&appointment), AppointmentStatus::Late);
    }

    #[test]
    fn test_protected_statuses_survive_normalization() {
        let service = AppointmentLifecycleService::new();
        for check_in in [None, Some(Utc::now())] {
            for status in [AppointmentStatus::InService, AppointmentStatus::Finished] {
                let mut appointment = scheduled();
                appointment.status = status;
                appointment.check_in_at = check_in;
                assert_eq!(service.normalize(&appointment).status, status);
            }
        }
    }

    #[test]
    fn test_normalize_does_not_touch_input() {
        let service = AppointmentLifecycleService::new();
        let mut appointment = scheduled();
        appointment.check_in_at = Some(Utc::now());

        let normalized = service.normalize(&appointment);
        assert_eq!(normalized.status, AppointmentStatus::Waiting);
        assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    }

    #[test]
    fn test_check_in_remembers_previous_status() {
        let service = AppointmentLifecycleService::new();
        let mut appointment = scheduled();
        appointment.status = AppointmentStatus::Confirmed;
        let now = Utc::now();

        let next = service.apply(&appointment, &Transition::CheckIn, now).unwrap();
        assert_eq!(next.status, AppointmentStatus::Arrived);
        assert_eq!(next.check_in_at, Some(now));
        assert_eq!(next.check_in_previous_status, Some(AppointmentStatus::Confirmed));
        assert_eq!(next.updated_at, now);
    }

    #[test]
    fn test_undo_without_snapshot_uses_confirmation_logs() {
        let service = AppointmentLifecycleService::new();
        let mut appointment = scheduled();
        appointment.status = AppointmentStatus::Waiting;
        appointment.check_in_at = Some(Utc::now());

        let reverted = service.apply(&appointment, &Transition::UndoCheckIn, Utc::now()).unwrap();
        assert_eq!(reverted.status, AppointmentStatus::Scheduled);

        appointment.confirmation_logs.push(ConfirmationLog {
            at: Utc::now(),
            channel: Some("whatsapp".to_string()),
            actor_id: None,
            note: None,
        });
        let reverted = service.apply(&appointment, &Transition::UndoCheckIn, Utc::now()).unwrap();
        assert_eq!(reverted.status, AppointmentStatus::Confirmed);
        assert!(reverted.check_in_at.is_none());
    }

    #[test]
    fn test_call_to_room_picks_consultorio() {
        let service = AppointmentLifecycleService::new();
        let mut waiting = scheduled();
        waiting.status = AppointmentStatus::Waiting;
        waiting.check_in_at = Some(Utc::now());
        waiting.consultorio_id = None;

        let explicit = service
            .apply(&waiting, &Transition::CallToRoom { consultorio_id: Some("room_9".into()) }, Utc::now())
            .unwrap();
        assert_eq!(explicit.consultorio_id.as_deref(), Some("room_9"));

        let fallback = service
            .apply(&waiting, &Transition::CallToRoom { consultorio_id: None }, Utc::now())
            .unwrap();
        assert_eq!(fallback.consultorio_id.as_deref(), Some("room_1"));
        assert_eq!(fallback.called_at, fallback.started_at);
    }

    #[test]
    fn test_call_requires_check_in() {
        let service = AppointmentLifecycleService::new();
        let mut appointment = scheduled();
        appointment.status = AppointmentStatus::Waiting;

        let err = service
            .apply(&appointment, &Transition::CallToRoom { consultorio_id: None }, Utc::now())
            .unwrap_err();
        assert_eq!(err, WorkflowError::MissingCheckIn { operation: WorkflowOperation::CallToRoom });
    }

    #[test]
    fn test_terminal_records_reject_everything() {
        let service = AppointmentLifecycleService::new();
        for status in [AppointmentStatus::Finished, AppointmentStatus::Cancelled, AppointmentStatus::NoShow] {
            let mut appointment = scheduled();
            appointment.status = status;
            assert!(service.get_valid_operations(&appointment).is_empty());
            assert_eq!(
                service.apply(&appointment, &Transition::Cancel { reason: None }, Utc::now()),
                Err(WorkflowError::TerminalStatus { status })
            );
        }
    }

    #[test]
    fn test_confirm_appends_log_and_rejects_checked_in() {
        let service = AppointmentLifecycleService::new();
        let confirm = Transition::Confirm {
            channel: Some("phone".into()),
            note: Some("ok".into()),
            actor_id: Some("usr_1".into()),
        };

        let confirmed = service.apply(&scheduled(), &confirm, Utc::now()).unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
        assert_eq!(confirmed.confirmation_logs.len(), 1);
        assert_eq!(confirmed.confirmation_logs[0].actor_id.as_deref(), Some("usr_1"));

        let mut late = scheduled();
        late.status = AppointmentStatus::Late;
        late.check_in_at = Some(Utc::now());
        assert_eq!(
            service.apply(&late, &confirm, Utc::now()),
            Err(WorkflowError::AlreadyCheckedIn { operation: WorkflowOperation::Confirm })
        );
    }

    #[test]
    fn test_reschedule_flag_clears_stamps() {
        let service = AppointmentLifecycleService::new();
        let mut appointment = scheduled();
        appointment.status = AppointmentStatus::Arrived;
        appointment.check_in_at = Some(Utc::now());
        appointment.check_in_previous_status = Some(AppointmentStatus::Scheduled);

        let flagged = service.apply(&appointment, &Transition::FlagForReschedule, Utc::now()).unwrap();
        assert_eq!(flagged.status, AppointmentStatus::Reschedule);
        assert!(flagged.check_in_at.is_none());
        assert!(flagged.check_in_previous_status.is_none());

        let mut in_service = scheduled();
        in_service.status = AppointmentStatus::InService;
        assert!(service.apply(&in_service, &Transition::FlagForReschedule, Utc::now()).is_err());
    }
}
