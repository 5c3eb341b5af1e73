// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use shared_config::SchedulingConfig;
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentBlock, AppointmentError, AppointmentFilter, AppointmentStatus,
    AvailableSlot, CallToRoomRequest, CancelAppointmentRequest, ConfirmAppointmentRequest,
    ConflictCheckRequest, ConflictCheckResponse, CreateAppointmentRequest, CreateBlockRequest,
    CreateLeadAppointmentRequest, LeadTimelineEvent, SlotQuery, UpdateAppointmentRequest,
    UpsertWorkHourRequest, WorkHourRule, MAX_SLOT_CAPACITY, MIN_SLOT_CAPACITY,
};
use crate::services::authorization::{Authorizer, Permission, Role, RoleBasedAuthorizer};
use crate::services::availability::AvailabilityService;
use crate::services::conflict::{ConflictDetectionService, PlacementCandidate};
use crate::services::hooks::{BookingSource, PostCommitHooks, SchedulingEvent};
use crate::services::identity::{Clock, IdGenerator, SystemClock, UuidIdGenerator};
use crate::services::lifecycle::{AppointmentLifecycleService, Transition};
use crate::services::store::{mutate, SchedulingStore};
use crate::services::time::TimeOfDay;

/// Validated placement fields shared by both creation paths.
#[derive(Debug, Clone)]
struct PlacementDraft {
    date: NaiveDate,
    start_time: TimeOfDay,
    end_time: TimeOfDay,
    duration_minutes: u32,
    professional_id: Option<String>,
    room_id: Option<String>,
    slot_capacity: u8,
}

impl PlacementDraft {
    fn candidate(&self) -> PlacementCandidate {
        PlacementCandidate {
            id: None,
            start_time: self.start_time,
            end_time: self.end_time,
            professional_id: self.professional_id.clone(),
            room_id: self.room_id.clone(),
            slot_capacity: self.slot_capacity,
        }
    }
}

pub struct AppointmentBookingService {
    store: Arc<dyn SchedulingStore>,
    authorizer: Arc<dyn Authorizer>,
    hooks: PostCommitHooks,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    availability_service: AvailabilityService,
}

impl AppointmentBookingService {
    pub fn new(config: &SchedulingConfig, store: Arc<dyn SchedulingStore>) -> Self {
        Self {
            store,
            authorizer: Arc::new(RoleBasedAuthorizer::new()),
            hooks: PostCommitHooks::new(),
            ids: Arc::new(UuidIdGenerator),
            clock: Arc::new(SystemClock),
            conflict_service: ConflictDetectionService::new(),
            lifecycle_service: AppointmentLifecycleService::new(),
            availability_service: AvailabilityService::new(config),
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_hooks(mut self, hooks: PostCommitHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn lifecycle(&self) -> &AppointmentLifecycleService {
        &self.lifecycle_service
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    pub fn create_appointment(
        &self,
        actor: &User,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        self.authorizer.require_permission(actor, Permission::AgendaCreate)?;
        debug!("Creating appointment for patient {:?}", request.patient_id);

        let draft = validate_placement(&request)?;
        if non_blank(request.patient_id.clone()).is_none() {
            return Err(AppointmentError::missing("patient_id"));
        }

        let now = self.clock.now();
        let appointment = new_appointment(self.ids.new_id("apt"), &draft, &request, now);

        let candidate = draft.candidate();
        let appointment = mutate(self.store.as_ref(), |state| {
            self.conflict_service.ensure_placeable(state, draft.date, &candidate, None)?;
            state.appointments.push(appointment.clone());
            Ok(appointment)
        })?;

        info!(
            appointment_id = %appointment.id,
            date = %appointment.date,
            start = %appointment.start_time,
            "Appointment created"
        );
        self.hooks.dispatch(
            &actor.id,
            &SchedulingEvent::AppointmentCreated {
                appointment: appointment.clone(),
                source: BookingSource::Direct,
            },
        );
        Ok(appointment)
    }

    /// Book on behalf of a CRM lead; past dates are refused.
    pub fn create_appointment_from_lead(
        &self,
        actor: &User,
        request: CreateLeadAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        self.authorizer.require_permission(actor, Permission::AgendaCreate)?;

        let lead_id = non_blank(request.lead_id.clone()).ok_or_else(|| AppointmentError::missing("lead_id"))?;
        debug!("Creating appointment from lead {}", lead_id);

        let draft = validate_placement(&request.appointment)?;
        if draft.date < self.clock.today() {
            return Err(AppointmentError::invalid("date", "cannot book a date in the past"));
        }

        let now = self.clock.now();
        let mut appointment = new_appointment(self.ids.new_id("apt"), &draft, &request.appointment, now);
        appointment.lead_id = Some(lead_id.clone());

        let candidate = draft.candidate();
        let actor_id = actor.id.clone();
        let appointment = mutate(self.store.as_ref(), |state| {
            let lead = state.lead_mut(&lead_id)?;
            appointment.lead_display_name = Some(lead.display_name.clone());
            if appointment.patient_id.is_none() {
                appointment.patient_id = lead.patient_id.clone();
            }
            lead.timeline.push(LeadTimelineEvent {
                at: now,
                kind: "appointment_scheduled".to_string(),
                description: format!(
                    "Appointment booked for {} {}-{}",
                    appointment.date, appointment.start_time, appointment.end_time
                ),
                appointment_id: Some(appointment.id.clone()),
                actor_id: Some(actor_id),
            });

            self.conflict_service.ensure_placeable(state, draft.date, &candidate, None)?;
            state.appointments.push(appointment.clone());
            Ok(appointment)
        })?;

        info!(
            appointment_id = %appointment.id,
            lead_id = %lead_id,
            "Appointment created from lead"
        );
        self.hooks.dispatch(
            &actor.id,
            &SchedulingEvent::AppointmentCreated {
                appointment: appointment.clone(),
                source: BookingSource::Crm,
            },
        );
        Ok(appointment)
    }

    pub fn update_appointment(
        &self,
        actor: &User,
        appointment_id: &str,
        patch: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        self.authorizer.require_permission(actor, Permission::AgendaUpdate)?;
        debug!("Updating appointment {}", appointment_id);

        let now = self.clock.now();
        let updated = mutate(self.store.as_ref(), |state| {
            let index = state.appointment_index(appointment_id)?;
            let current = self.lifecycle_service.normalize(&state.appointments[index]);
            let merged = merge_patch(current, &patch, now)?;

            if !merged.is_cancelled() {
                let candidate = PlacementCandidate::from_appointment(&merged);
                self.conflict_service
                    .ensure_placeable(state, merged.date, &candidate, Some(appointment_id))?;
            }

            state.appointments[index] = merged.clone();
            Ok(merged)
        })?;

        info!(appointment_id = %updated.id, "Appointment updated");
        self.hooks.dispatch(
            &actor.id,
            &SchedulingEvent::AppointmentUpdated {
                appointment: updated.clone(),
            },
        );
        Ok(updated)
    }

    pub fn cancel_appointment(
        &self,
        actor: &User,
        appointment_id: &str,
        request: CancelAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        self.authorizer.require_permission(actor, Permission::AgendaCancel)?;

        let transition = Transition::Cancel {
            reason: non_blank(request.reason),
        };
        let (cancelled, _) = self.commit_transition(appointment_id, &transition)?;

        info!(appointment_id = %cancelled.id, reason = ?cancelled.cancel_reason, "Appointment cancelled");
        self.hooks.dispatch(
            &actor.id,
            &SchedulingEvent::AppointmentCancelled {
                appointment: cancelled.clone(),
            },
        );
        Ok(cancelled)
    }

    pub fn create_block(&self, actor: &User, request: CreateBlockRequest) -> Result<AppointmentBlock, AppointmentError> {
        self.authorizer.require_permission(actor, Permission::AgendaBlock)?;

        let date = request.date.ok_or_else(|| AppointmentError::missing("date"))?;
        let start_time = parse_time("start_time", request.start_time.as_deref())?;
        let end_time = parse_time("end_time", request.end_time.as_deref())?;
        ensure_ordered(start_time, end_time)?;
        let professional_id = non_blank(request.professional_id);
        let room_id = non_blank(request.room_id);
        if professional_id.is_none() && room_id.is_none() {
            return Err(AppointmentError::missing("professional_id"));
        }

        let block = AppointmentBlock {
            id: self.ids.new_id("blk"),
            date,
            start_time,
            end_time,
            professional_id,
            room_id,
            reason: non_blank(request.reason),
            created_at: self.clock.now(),
        };

        let candidate = PlacementCandidate::from_block(&block);
        let block = mutate(self.store.as_ref(), |state| {
            self.conflict_service.ensure_block_placeable(state, date, &candidate)?;
            state.blocks.push(block.clone());
            Ok(block)
        })?;

        info!(block_id = %block.id, date = %block.date, "Block created");
        self.hooks
            .dispatch(&actor.id, &SchedulingEvent::BlockCreated { block: block.clone() });
        Ok(block)
    }

    // ==========================================================================
    // WORKFLOW
    // ==========================================================================

    pub fn check_in(&self, actor: &User, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        self.transition(actor, appointment_id, Permission::WorkflowCheckIn, Transition::CheckIn)
    }

    pub fn undo_check_in(&self, actor: &User, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        self.transition(actor, appointment_id, Permission::WorkflowCheckIn, Transition::UndoCheckIn)
    }

    pub fn call_to_room(
        &self,
        actor: &User,
        appointment_id: &str,
        request: CallToRoomRequest,
    ) -> Result<Appointment, AppointmentError> {
        let transition = Transition::CallToRoom {
            consultorio_id: non_blank(request.consultorio_id),
        };
        self.transition(actor, appointment_id, Permission::WorkflowCall, transition)
    }

    pub fn finish(&self, actor: &User, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        self.transition(actor, appointment_id, Permission::WorkflowFinish, Transition::Finish)
    }

    pub fn return_to_waiting(&self, actor: &User, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        self.transition(actor, appointment_id, Permission::WorkflowCall, Transition::ReturnToWaiting)
    }

    pub fn request_confirmation(&self, actor: &User, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        self.transition(actor, appointment_id, Permission::AgendaUpdate, Transition::RequestConfirmation)
    }

    pub fn confirm(
        &self,
        actor: &User,
        appointment_id: &str,
        request: ConfirmAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let transition = Transition::Confirm {
            channel: non_blank(request.channel),
            note: non_blank(request.note),
            actor_id: Some(actor.id.clone()),
        };
        self.transition(actor, appointment_id, Permission::AgendaUpdate, transition)
    }

    pub fn mark_late(&self, actor: &User, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        self.transition(actor, appointment_id, Permission::AgendaUpdate, Transition::MarkLate)
    }

    pub fn mark_no_show(&self, actor: &User, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        self.transition(actor, appointment_id, Permission::AgendaUpdate, Transition::MarkNoShow)
    }

    pub fn flag_for_reschedule(&self, actor: &User, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        self.transition(actor, appointment_id, Permission::AgendaUpdate, Transition::FlagForReschedule)
    }

    fn transition(
        &self,
        actor: &User,
        appointment_id: &str,
        permission: Permission,
        transition: Transition,
    ) -> Result<Appointment, AppointmentError> {
        self.authorizer.require_permission(actor, permission)?;

        let operation = transition.operation();
        let (appointment, from) = self.commit_transition(appointment_id, &transition)?;

        info!(
            appointment_id = %appointment.id,
            operation = %operation,
            from = %from,
            to = %appointment.status,
            "Workflow transition committed"
        );
        self.hooks.dispatch(
            &actor.id,
            &SchedulingEvent::WorkflowTransitioned {
                appointment: appointment.clone(),
                operation,
                from,
            },
        );
        Ok(appointment)
    }

    /// Validate and apply inside the atomic section so the precondition is
    /// checked against the state that gets written.
    fn commit_transition(
        &self,
        appointment_id: &str,
        transition: &Transition,
    ) -> Result<(Appointment, AppointmentStatus), AppointmentError> {
        let now = self.clock.now();
        mutate(self.store.as_ref(), |state| {
            let index = state.appointment_index(appointment_id)?;
            let current = &state.appointments[index];
            let from = self.lifecycle_service.effective_status(current);
            let next = self.lifecycle_service.apply(current, transition, now)?;
            state.appointments[index] = next.clone();
            Ok((next, from))
        })
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub fn get_appointment(&self, actor: &User, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        self.authorizer.require_permission(actor, Permission::AgendaView)?;

        let state = self.store.snapshot()?;
        state
            .appointment(appointment_id)
            .map(|a| self.lifecycle_service.normalize(a))
            .ok_or_else(|| AppointmentError::not_found("appointment", appointment_id))
    }

    pub fn list_appointments(&self, actor: &User, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError> {
        self.authorizer.require_permission(actor, Permission::AgendaView)?;

        let state = self.store.snapshot()?;
        let professional = filter.professional_id.as_deref().filter(|p| !p.is_empty());
        let room = filter.room_id.as_deref().filter(|r| !r.is_empty());

        let mut appointments: Vec<Appointment> = state
            .appointments
            .iter()
            .filter(|a| filter.include_cancelled || !a.is_cancelled())
            .filter(|a| filter.date.map_or(true, |d| a.date == d))
            .filter(|a| professional.map_or(true, |p| a.professional_id.as_deref() == Some(p)))
            .filter(|a| room.map_or(true, |r| a.room_id.as_deref() == Some(r)))
            .map(|a| self.lifecycle_service.normalize(a))
            .collect();
        appointments.sort_by(|a, b| (a.date, a.start_time, &a.id).cmp(&(b.date, b.start_time, &b.id)));

        debug!("Listed {} appointments", appointments.len());
        Ok(appointments)
    }

    pub fn list_blocks(
        &self,
        actor: &User,
        date: Option<NaiveDate>,
        professional_id: Option<&str>,
    ) -> Result<Vec<AppointmentBlock>, AppointmentError> {
        self.authorizer.require_permission(actor, Permission::AgendaView)?;

        let state = self.store.snapshot()?;
        let mut blocks: Vec<AppointmentBlock> = state
            .blocks
            .into_iter()
            .filter(|b| date.map_or(true, |d| b.date == d))
            .filter(|b| professional_id.map_or(true, |p| b.professional_id.as_deref() == Some(p)))
            .collect();
        blocks.sort_by_key(|b| (b.date, b.start_time));
        Ok(blocks)
    }

    pub fn available_slots(&self, actor: &User, query: &SlotQuery) -> Result<Vec<AvailableSlot>, AppointmentError> {
        self.authorizer.require_permission(actor, Permission::AgendaView)?;

        let state = self.store.snapshot()?;
        self.availability_service.available_slots(&state, query)
    }

    pub fn check_conflict(&self, actor: &User, request: &ConflictCheckRequest) -> Result<ConflictCheckResponse, AppointmentError> {
        self.authorizer.require_permission(actor, Permission::AgendaView)?;

        let start_time = parse_time("start_time", Some(&request.start_time))?;
        let end_time = parse_time("end_time", Some(&request.end_time))?;
        ensure_ordered(start_time, end_time)?;

        let candidate = PlacementCandidate {
            id: None,
            start_time,
            end_time,
            professional_id: non_blank(request.professional_id.clone()),
            room_id: non_blank(request.room_id.clone()),
            slot_capacity: validate_capacity(request.slot_capacity)?,
        };

        let state = self.store.snapshot()?;
        Ok(self.conflict_service.check_response(
            &state,
            request.date,
            &candidate,
            request.exclude_appointment_id.as_deref(),
        ))
    }

    // ==========================================================================
    // WORK HOURS
    // ==========================================================================

    pub fn upsert_work_hours(&self, actor: &User, request: UpsertWorkHourRequest) -> Result<WorkHourRule, AppointmentError> {
        self.authorizer.require_role(actor, &[Role::Admin, Role::Manager])?;

        let professional_id = non_blank(Some(request.professional_id.clone()))
            .ok_or_else(|| AppointmentError::missing("professional_id"))?;
        if request.weekday > 6 {
            return Err(AppointmentError::invalid("weekday", "must be between 0 (Sunday) and 6"));
        }
        let start_time = parse_time("start_time", Some(&request.start_time))?;
        let end_time = parse_time("end_time", Some(&request.end_time))?;
        ensure_ordered(start_time, end_time)?;

        let (break_start, break_end) = match (request.break_start.as_deref(), request.break_end.as_deref()) {
            (None, None) => (None, None),
            (Some(bs), Some(be)) => {
                let bs = parse_time("break_start", Some(bs))?;
                let be = parse_time("break_end", Some(be))?;
                if bs >= be || bs < start_time || be > end_time {
                    return Err(AppointmentError::invalid(
                        "break_start",
                        "break must lie inside the working range",
                    ));
                }
                (Some(bs), Some(be))
            }
            (Some(_), None) => return Err(AppointmentError::missing("break_end")),
            (None, Some(_)) => return Err(AppointmentError::missing("break_start")),
        };

        let rule_id = non_blank(request.id.clone()).unwrap_or_else(|| self.ids.new_id("wh"));
        let rule = WorkHourRule {
            id: rule_id,
            professional_id,
            weekday: request.weekday,
            start_time,
            end_time,
            break_start,
            break_end,
            active: request.active.unwrap_or(true),
        };

        let rule = mutate(self.store.as_ref(), |state| {
            match state.work_hours.iter_mut().find(|r| r.id == rule.id) {
                Some(existing) => *existing = rule.clone(),
                None => state.work_hours.push(rule.clone()),
            }
            Ok(rule)
        })?;

        info!(rule_id = %rule.id, professional_id = %rule.professional_id, "Work hours saved");
        self.hooks
            .dispatch(&actor.id, &SchedulingEvent::WorkHoursChanged { rule: rule.clone() });
        Ok(rule)
    }

    pub fn list_work_hours(&self, actor: &User, professional_id: &str) -> Result<Vec<WorkHourRule>, AppointmentError> {
        self.authorizer.require_permission(actor, Permission::AgendaView)?;

        let state = self.store.snapshot()?;
        let mut rules: Vec<WorkHourRule> = state
            .work_hours
            .into_iter()
            .filter(|r| r.professional_id == professional_id)
            .collect();
        rules.sort_by_key(|r| (r.weekday, r.start_time));
        Ok(rules)
    }
}

// ==============================================================================
// VALIDATION HELPERS
// ==============================================================================

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_time(field: &'static str, raw: Option<&str>) -> Result<TimeOfDay, AppointmentError> {
    let raw = raw.filter(|r| !r.trim().is_empty()).ok_or_else(|| AppointmentError::missing(field))?;
    TimeOfDay::parse(raw).map_err(|e| AppointmentError::invalid(field, e.to_string()))
}

fn ensure_ordered(start: TimeOfDay, end: TimeOfDay) -> Result<(), AppointmentError> {
    if end <= start {
        return Err(AppointmentError::invalid("end_time", "must be after start_time"));
    }
    Ok(())
}

fn validate_capacity(raw: Option<u8>) -> Result<u8, AppointmentError> {
    let capacity = raw.unwrap_or(MIN_SLOT_CAPACITY);
    if !(MIN_SLOT_CAPACITY..=MAX_SLOT_CAPACITY).contains(&capacity) {
        return Err(AppointmentError::invalid("slot_capacity", "must be 1 or 2"));
    }
    Ok(capacity)
}

/// End comes from `end_time`, or from `start + duration` when only a duration is given.
fn resolve_end(
    start: TimeOfDay,
    end_time: Option<&str>,
    duration_minutes: Option<u32>,
) -> Result<TimeOfDay, AppointmentError> {
    if end_time.is_some_and(|e| !e.trim().is_empty()) {
        return parse_time("end_time", end_time);
    }
    match duration_minutes {
        Some(0) => Err(AppointmentError::invalid("duration_minutes", "must be greater than zero")),
        Some(duration) => start
            .add_minutes(duration)
            .ok_or_else(|| AppointmentError::invalid("duration_minutes", "appointment would end after midnight")),
        None => Err(AppointmentError::missing("end_time")),
    }
}

fn validate_placement(request: &CreateAppointmentRequest) -> Result<PlacementDraft, AppointmentError> {
    let date = request.date.ok_or_else(|| AppointmentError::missing("date"))?;
    let start_time = parse_time("start_time", request.start_time.as_deref())?;
    let end_time = resolve_end(start_time, request.end_time.as_deref(), request.duration_minutes)?;
    ensure_ordered(start_time, end_time)?;

    let professional_id = non_blank(request.professional_id.clone());
    let room_id = non_blank(request.room_id.clone());
    if professional_id.is_none() && room_id.is_none() {
        return Err(AppointmentError::missing("professional_id"));
    }

    Ok(PlacementDraft {
        date,
        start_time,
        end_time,
        duration_minutes: start_time.minutes_until(end_time).unwrap_or(0),
        professional_id,
        room_id,
        slot_capacity: validate_capacity(request.slot_capacity)?,
    })
}

fn new_appointment(
    id: String,
    draft: &PlacementDraft,
    request: &CreateAppointmentRequest,
    now: DateTime<Utc>,
) -> Appointment {
    Appointment {
        id,
        date: draft.date,
        start_time: draft.start_time,
        end_time: draft.end_time,
        professional_id: draft.professional_id.clone(),
        room_id: draft.room_id.clone(),
        slot_capacity: draft.slot_capacity,
        patient_id: non_blank(request.patient_id.clone()),
        lead_id: None,
        lead_display_name: None,
        status: AppointmentStatus::Scheduled,
        check_in_at: None,
        called_at: None,
        started_at: None,
        finished_at: None,
        check_in_previous_status: None,
        consultorio_id: draft.room_id.clone(),
        dentist_id: draft.professional_id.clone(),
        notes: non_blank(request.notes.clone()),
        procedure_name: non_blank(request.procedure_name.clone()),
        insurance: non_blank(request.insurance.clone()),
        channel: non_blank(request.channel.clone()),
        duration_minutes: draft.duration_minutes,
        confirmation_logs: Vec::new(),
        cancel_reason: None,
        created_at: now,
        updated_at: now,
    }
}

/// Merge a generic patch onto a (normalized) record and re-validate the result.
fn merge_patch(
    mut appointment: Appointment,
    patch: &UpdateAppointmentRequest,
    now: DateTime<Utc>,
) -> Result<Appointment, AppointmentError> {
    if let Some(date) = patch.date {
        appointment.date = date;
    }
    if patch.start_time.is_some() {
        appointment.start_time = parse_time("start_time", patch.start_time.as_deref())?;
    }
    if patch.end_time.is_some() || patch.duration_minutes.is_some() {
        appointment.end_time = resolve_end(appointment.start_time, patch.end_time.as_deref(), patch.duration_minutes)?;
    }
    ensure_ordered(appointment.start_time, appointment.end_time)?;
    appointment.duration_minutes = appointment
        .start_time
        .minutes_until(appointment.end_time)
        .unwrap_or(0);

    if let Some(professional_id) = &patch.professional_id {
        let professional_id = non_blank(Some(professional_id.clone()));
        if professional_id != appointment.professional_id && patch.dentist_id.is_none() {
            appointment.dentist_id = professional_id.clone();
        }
        appointment.professional_id = professional_id;
    }
    if let Some(room_id) = &patch.room_id {
        let room_id = non_blank(Some(room_id.clone()));
        if room_id != appointment.room_id && patch.consultorio_id.is_none() {
            appointment.consultorio_id = room_id.clone();
        }
        appointment.room_id = room_id;
    }
    if patch.dentist_id.is_some() {
        appointment.dentist_id = non_blank(patch.dentist_id.clone());
    }
    if patch.consultorio_id.is_some() {
        appointment.consultorio_id = non_blank(patch.consultorio_id.clone());
    }
    if appointment.professional_id.is_none() && appointment.room_id.is_none() {
        return Err(AppointmentError::missing("professional_id"));
    }

    if patch.slot_capacity.is_some() {
        appointment.slot_capacity = validate_capacity(patch.slot_capacity)?;
    }
    if patch.patient_id.is_some() {
        appointment.patient_id = non_blank(patch.patient_id.clone());
    }
    if patch.notes.is_some() {
        appointment.notes = non_blank(patch.notes.clone());
    }
    if patch.procedure_name.is_some() {
        appointment.procedure_name = non_blank(patch.procedure_name.clone());
    }
    if patch.insurance.is_some() {
        appointment.insurance = non_blank(patch.insurance.clone());
    }
    if patch.channel.is_some() {
        appointment.channel = non_blank(patch.channel.clone());
    }

    appointment.updated_at = now;
    Ok(appointment)
}

impl std::fmt::Debug for AppointmentBookingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppointmentBookingService")
            .field("hooks", &self.hooks)
            .field("availability_service", &self.availability_service)
            .finish_non_exhaustive()
    }
}
