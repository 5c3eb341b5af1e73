// libs/appointment-cell/src/services/hooks.rs
//
// Best-effort collaborators run after a mutation has committed. A failing hook
// is logged and dropped; it never changes the outcome of the operation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{
    Appointment, AppointmentBlock, AppointmentError, AppointmentStatus, WorkHourRule, WorkflowOperation,
};
use crate::services::store::{mutate, SchedulingStore};
use crate::services::time::TimeOfDay;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HookError {
    #[error("Stage not found: {0}")]
    StageNotFound(String),

    #[error("Lead not found: {0}")]
    LeadNotFound(String),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingSource {
    Direct,
    Crm,
}

#[derive(Debug, Clone)]
pub enum SchedulingEvent {
    AppointmentCreated {
        appointment: Appointment,
        source: BookingSource,
    },
    AppointmentUpdated {
        appointment: Appointment,
    },
    AppointmentCancelled {
        appointment: Appointment,
    },
    WorkflowTransitioned {
        appointment: Appointment,
        operation: WorkflowOperation,
        from: AppointmentStatus,
    },
    BlockCreated {
        block: AppointmentBlock,
    },
    WorkHoursChanged {
        rule: WorkHourRule,
    },
}

impl SchedulingEvent {
    pub fn appointment(&self) -> Option<&Appointment> {
        match self {
            SchedulingEvent::AppointmentCreated { appointment, .. }
            | SchedulingEvent::AppointmentUpdated { appointment }
            | SchedulingEvent::AppointmentCancelled { appointment }
            | SchedulingEvent::WorkflowTransitioned { appointment, .. } => Some(appointment),
            SchedulingEvent::BlockCreated { .. } | SchedulingEvent::WorkHoursChanged { .. } => None,
        }
    }

    pub fn audit_name(&self) -> String {
        match self {
            SchedulingEvent::AppointmentCreated { source: BookingSource::Direct, .. } => "appointment.created".into(),
            SchedulingEvent::AppointmentCreated { source: BookingSource::Crm, .. } => {
                "appointment.created_from_lead".into()
            }
            SchedulingEvent::AppointmentUpdated { .. } => "appointment.updated".into(),
            SchedulingEvent::AppointmentCancelled { .. } => "appointment.cancelled".into(),
            SchedulingEvent::WorkflowTransitioned { operation, .. } => format!("appointment.workflow.{}", operation),
            SchedulingEvent::BlockCreated { .. } => "appointment_block.created".into(),
            SchedulingEvent::WorkHoursChanged { .. } => "work_hours.updated".into(),
        }
    }

    pub fn audit_fields(&self, actor_id: &str) -> Value {
        match self {
            SchedulingEvent::AppointmentCreated { appointment, .. }
            | SchedulingEvent::AppointmentUpdated { appointment }
            | SchedulingEvent::AppointmentCancelled { appointment } => json!({
                "actor_id": actor_id,
                "appointment_id": appointment.id,
                "date": appointment.date,
                "start_time": appointment.start_time,
                "end_time": appointment.end_time,
                "professional_id": appointment.professional_id,
                "room_id": appointment.room_id,
                "status": appointment.status,
            }),
            SchedulingEvent::WorkflowTransitioned { appointment, from, .. } => json!({
                "actor_id": actor_id,
                "appointment_id": appointment.id,
                "from": from,
                "to": appointment.status,
            }),
            SchedulingEvent::BlockCreated { block } => json!({
                "actor_id": actor_id,
                "block_id": block.id,
                "date": block.date,
                "start_time": block.start_time,
                "end_time": block.end_time,
                "professional_id": block.professional_id,
                "room_id": block.room_id,
            }),
            SchedulingEvent::WorkHoursChanged { rule } => json!({
                "actor_id": actor_id,
                "rule_id": rule.id,
                "professional_id": rule.professional_id,
                "weekday": rule.weekday,
                "active": rule.active,
            }),
        }
    }
}

pub trait PostCommitHook: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_commit(&self, actor_id: &str, event: &SchedulingEvent) -> Result<(), HookError>;
}

/// Ordered hook list. Dispatch never fails.
#[derive(Clone, Default)]
pub struct PostCommitHooks {
    hooks: Vec<Arc<dyn PostCommitHook>>,
}

impl PostCommitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hook: Arc<dyn PostCommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn dispatch(&self, actor_id: &str, event: &SchedulingEvent) {
        for hook in &self.hooks {
            if let Err(e) = hook.on_commit(actor_id, event) {
                warn!(hook = hook.name(), event = %event.audit_name(), "Post-commit hook failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for PostCommitHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("PostCommitHooks").field("hooks", &names).finish()
    }
}

fn lock_failed(what: &str) -> HookError {
    HookError::Unavailable(format!("{} lock poisoned", what))
}

// ==============================================================================
// AUDIT
// ==============================================================================

pub trait AuditLogger: Send + Sync {
    fn log_action(&self, event: &str, fields: Value);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub event: String,
    pub fields: Value,
    pub at: DateTime<Utc>,
}

/// Emits every action as a structured `info!` line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl TracingAuditLog {
    pub fn new() -> Self {
        Self
    }
}

impl AuditLogger for TracingAuditLog {
    fn log_action(&self, event: &str, fields: Value) {
        info!(event = %event, fields = %fields, "AUDIT: {}", event);
    }
}

/// Keeps the most recent `capacity` actions in memory, oldest dropped first.
#[derive(Debug)]
pub struct RecentAuditLog {
    capacity: usize,
    entries: Mutex<VecDeque<AuditEntry>>,
}

impl RecentAuditLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl AuditLogger for RecentAuditLog {
    fn log_action(&self, event: &str, fields: Value) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(AuditEntry {
                event: event.to_string(),
                fields,
                at: Utc::now(),
            });
        }
    }
}

pub struct AuditHook {
    logger: Arc<dyn AuditLogger>,
}

impl AuditHook {
    pub fn new(logger: Arc<dyn AuditLogger>) -> Self {
        Self { logger }
    }
}

impl PostCommitHook for AuditHook {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn on_commit(&self, actor_id: &str, event: &SchedulingEvent) -> Result<(), HookError> {
        self.logger.log_action(&event.audit_name(), event.audit_fields(actor_id));
        Ok(())
    }
}

// ==============================================================================
// CRM FUNNEL
// ==============================================================================

pub trait LeadFunnel: Send + Sync {
    fn move_to_stage(&self, lead_id: &str, stage: &str) -> Result<(), HookError>;
}

/// Funnel over the scheduling document: moving a lead writes `Lead.stage`
/// in its own transaction. Only the configured stage keys are accepted.
pub struct StoreLeadFunnel {
    store: Arc<dyn SchedulingStore>,
    stages: Vec<String>,
}

impl StoreLeadFunnel {
    pub fn new<I, S>(store: Arc<dyn SchedulingStore>, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            store,
            stages: stages.into_iter().map(Into::into).collect(),
        }
    }
}

impl LeadFunnel for StoreLeadFunnel {
    fn move_to_stage(&self, lead_id: &str, stage: &str) -> Result<(), HookError> {
        let stage = self
            .stages
            .iter()
            .find(|s| s.eq_ignore_ascii_case(stage))
            .ok_or_else(|| HookError::StageNotFound(stage.to_string()))?;

        mutate(self.store.as_ref(), |state| {
            let lead = state.lead_mut(lead_id)?;
            lead.stage = Some(stage.clone());
            Ok(())
        })
        .map_err(|e| match e {
            AppointmentError::NotFound { .. } => HookError::LeadNotFound(lead_id.to_string()),
            other => HookError::Unavailable(other.to_string()),
        })?;

        debug!(lead_id, stage = %stage, "Lead moved to funnel stage");
        Ok(())
    }
}

impl std::fmt::Debug for StoreLeadFunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLeadFunnel")
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

/// Moves the lead behind a CRM booking to the configured stage.
pub struct CrmStageHook {
    funnel: Arc<dyn LeadFunnel>,
    target_stage: String,
}

impl CrmStageHook {
    pub fn new(funnel: Arc<dyn LeadFunnel>, target_stage: impl Into<String>) -> Self {
        Self {
            funnel,
            target_stage: target_stage.into(),
        }
    }
}

impl PostCommitHook for CrmStageHook {
    fn name(&self) -> &'static str {
        "crm_stage"
    }

    fn on_commit(&self, _actor_id: &str, event: &SchedulingEvent) -> Result<(), HookError> {
        let SchedulingEvent::AppointmentCreated {
            appointment,
            source: BookingSource::Crm,
        } = event
        else {
            return Ok(());
        };
        let Some(lead_id) = appointment.lead_id.as_deref() else {
            return Ok(());
        };

        match self.funnel.move_to_stage(lead_id, &self.target_stage) {
            Err(HookError::StageNotFound(stage)) => {
                debug!(lead_id, stage = %stage, "Funnel stage missing, lead left in place");
                Ok(())
            }
            other => other,
        }
    }
}

// ==============================================================================
// JOURNEY
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JourneyEntry {
    pub appointment_id: String,
    pub patient_id: Option<String>,
    pub lead_id: Option<String>,
    pub status: AppointmentStatus,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub professional_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Appointment> for JourneyEntry {
    fn from(appointment: &Appointment) -> Self {
        Self {
            appointment_id: appointment.id.clone(),
            patient_id: appointment.patient_id.clone(),
            lead_id: appointment.lead_id.clone(),
            status: appointment.status,
            date: appointment.date,
            start_time: appointment.start_time,
            professional_id: appointment.professional_id.clone(),
            updated_at: appointment.updated_at,
        }
    }
}

pub trait JourneyProjector: Send + Sync {
    fn project(&self, appointment: &Appointment) -> Result<(), HookError>;
}

/// Latest projected entry per appointment.
#[derive(Debug, Default)]
pub struct InMemoryJourney {
    entries: Mutex<HashMap<String, JourneyEntry>>,
}

impl InMemoryJourney {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, appointment_id: &str) -> Option<JourneyEntry> {
        self.entries.lock().ok()?.get(appointment_id).cloned()
    }
}

impl JourneyProjector for InMemoryJourney {
    fn project(&self, appointment: &Appointment) -> Result<(), HookError> {
        self.entries
            .lock()
            .map_err(|_| lock_failed("journey"))?
            .insert(appointment.id.clone(), JourneyEntry::from(appointment));
        Ok(())
    }
}

pub struct JourneyHook {
    projector: Arc<dyn JourneyProjector>,
}

impl JourneyHook {
    pub fn new(projector: Arc<dyn JourneyProjector>) -> Self {
        Self { projector }
    }
}

impl PostCommitHook for JourneyHook {
    fn name(&self) -> &'static str {
        "journey"
    }

    fn on_commit(&self, _actor_id: &str, event: &SchedulingEvent) -> Result<(), HookError> {
        match event.appointment() {
            Some(appointment) => self.projector.project(appointment),
            None => Ok(()),
        }
    }
}
