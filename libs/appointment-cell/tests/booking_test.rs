use std::sync::Arc;
use std::thread;

use assert_matches::assert_matches;
use chrono::{NaiveDate, TimeZone, Utc};

use appointment_cell::models::*;
use appointment_cell::services::hooks::{
    AuditHook, BookingSource, CrmStageHook, HookError, InMemoryJourney, JourneyHook, PostCommitHook,
    PostCommitHooks, RecentAuditLog, SchedulingEvent, StoreLeadFunnel,
};
use appointment_cell::services::identity::FixedClock;
use appointment_cell::services::store::{InMemoryStore, JsonFileStore, SchedulingState, SchedulingStore};
use appointment_cell::services::AppointmentBookingService;
use shared_config::SchedulingConfig;
use shared_models::auth::User;
use shared_utils::test_utils::TestUser;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()))
}

fn reception() -> User {
    TestUser::reception("desk@clinic.test").to_user()
}

fn service_over(store: Arc<dyn SchedulingStore>) -> AppointmentBookingService {
    AppointmentBookingService::new(&SchedulingConfig::default(), store).with_clock(clock())
}

fn booking(start: &str, end: &str, capacity: Option<u8>) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        date: Some(day()),
        start_time: Some(start.to_string()),
        end_time: Some(end.to_string()),
        professional_id: Some("pro_ana".to_string()),
        room_id: Some("room_1".to_string()),
        slot_capacity: capacity,
        patient_id: Some("pat_1".to_string()),
        ..Default::default()
    }
}

fn seeded_lead(id: &str, patient_id: Option<&str>) -> SchedulingState {
    SchedulingState {
        leads: vec![Lead {
            id: id.to_string(),
            display_name: "Maria Souza".to_string(),
            patient_id: patient_id.map(str::to_string),
            stage: Some("novo".to_string()),
            timeline: Vec::new(),
        }],
        ..Default::default()
    }
}

#[test]
fn test_create_then_conflict_then_double_booking() {
    let service = service_over(Arc::new(InMemoryStore::new()));
    let actor = reception();

    let first = service.create_appointment(&actor, booking("10:00", "10:30", None)).unwrap();
    assert_eq!(first.status, AppointmentStatus::Scheduled);
    assert_eq!(first.slot_capacity, 1);
    assert_eq!(first.duration_minutes, 30);
    assert_eq!(first.dentist_id.as_deref(), Some("pro_ana"));
    assert_eq!(first.consultorio_id.as_deref(), Some("room_1"));
    assert!(first.check_in_at.is_none());

    let err = service
        .create_appointment(&actor, booking("10:00", "10:30", Some(1)))
        .unwrap_err();
    assert_matches!(
        err,
        AppointmentError::Conflict { kind: ConflictKind::Appointment, ref conflicting_id } if *conflicting_id == first.id
    );

    service
        .update_appointment(
            &actor,
            &first.id,
            UpdateAppointmentRequest {
                slot_capacity: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
    let second = service.create_appointment(&actor, booking("10:00", "10:30", Some(2))).unwrap();
    assert_ne!(first.id, second.id);
}

#[test]
fn test_third_concurrent_placement_is_rejected() {
    let service = service_over(Arc::new(InMemoryStore::new()));
    let actor = reception();

    service.create_appointment(&actor, booking("10:00", "10:30", Some(2))).unwrap();
    service.create_appointment(&actor, booking("10:10", "10:40", Some(2))).unwrap();

    assert_matches!(
        service.create_appointment(&actor, booking("10:20", "10:50", Some(2))),
        Err(AppointmentError::Conflict { .. })
    );
}

#[test]
fn test_cancelled_appointment_frees_its_slot() {
    let service = service_over(Arc::new(InMemoryStore::new()));
    let actor = reception();

    let first = service.create_appointment(&actor, booking("10:00", "10:30", None)).unwrap();
    let cancelled = service
        .cancel_appointment(
            &actor,
            &first.id,
            CancelAppointmentRequest {
                reason: Some("patient called".into()),
            },
        )
        .unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("patient called"));

    assert!(service.create_appointment(&actor, booking("10:00", "10:30", None)).is_ok());

    // Cancelling twice hits the terminal status.
    assert_matches!(
        service.cancel_appointment(&actor, &first.id, CancelAppointmentRequest::default()),
        Err(AppointmentError::Workflow(WorkflowError::TerminalStatus { .. }))
    );
}

#[test]
fn test_required_fields_are_named() {
    let service = service_over(Arc::new(InMemoryStore::new()));
    let actor = reception();

    let mut no_patient = booking("10:00", "10:30", None);
    no_patient.patient_id = None;
    assert_matches!(
        service.create_appointment(&actor, no_patient),
        Err(AppointmentError::Validation { field: "patient_id", .. })
    );

    let mut no_end = booking("10:00", "10:30", None);
    no_end.end_time = None;
    assert_matches!(
        service.create_appointment(&actor, no_end),
        Err(AppointmentError::Validation { field: "end_time", .. })
    );

    let backwards = booking("11:00", "10:30", None);
    assert_matches!(
        service.create_appointment(&actor, backwards),
        Err(AppointmentError::Validation { field: "end_time", .. })
    );
}

#[test]
fn test_update_revalidates_against_others_but_not_itself() {
    let service = service_over(Arc::new(InMemoryStore::new()));
    let actor = reception();

    let morning = service.create_appointment(&actor, booking("09:00", "09:30", None)).unwrap();
    let later = service.create_appointment(&actor, booking("11:00", "11:30", None)).unwrap();

    // Stretching over its own slot is fine.
    let stretched = service
        .update_appointment(
            &actor,
            &morning.id,
            UpdateAppointmentRequest {
                end_time: Some("09:45".into()),
                notes: Some("longer cleaning".into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(stretched.duration_minutes, 45);
    assert_eq!(stretched.notes.as_deref(), Some("longer cleaning"));

    // Moving onto the other appointment is not, and nothing is written.
    let err = service
        .update_appointment(
            &actor,
            &morning.id,
            UpdateAppointmentRequest {
                start_time: Some("11:00".into()),
                end_time: Some("11:30".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert_matches!(err, AppointmentError::Conflict { ref conflicting_id, .. } if *conflicting_id == later.id);

    let stored = service.get_appointment(&actor, &morning.id).unwrap();
    assert_eq!(stored.start_time.to_string(), "09:00");
}

#[test]
fn test_update_rederives_workflow_aliases() {
    let service = service_over(Arc::new(InMemoryStore::new()));
    let actor = reception();
    let created = service.create_appointment(&actor, booking("09:00", "09:30", None)).unwrap();

    let moved = service
        .update_appointment(
            &actor,
            &created.id,
            UpdateAppointmentRequest {
                professional_id: Some("pro_bruno".into()),
                room_id: Some("room_2".into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(moved.dentist_id.as_deref(), Some("pro_bruno"));
    assert_eq!(moved.consultorio_id.as_deref(), Some("room_2"));
}

#[test]
fn test_unknown_appointment_is_not_found() {
    let service = service_over(Arc::new(InMemoryStore::new()));
    assert_matches!(
        service.update_appointment(&reception(), "apt_missing", UpdateAppointmentRequest::default()),
        Err(AppointmentError::NotFound { entity: "appointment", .. })
    );
}

#[test]
fn test_blocks_are_exclusive() {
    let service = service_over(Arc::new(InMemoryStore::new()));
    let actor = reception();

    let existing = service.create_appointment(&actor, booking("09:00", "09:30", Some(2))).unwrap();

    let over_appointment = CreateBlockRequest {
        date: Some(day()),
        start_time: Some("09:15".into()),
        end_time: Some("10:00".into()),
        professional_id: Some("pro_ana".into()),
        room_id: None,
        reason: Some("meeting".into()),
    };
    assert_matches!(
        service.create_block(&actor, over_appointment),
        Err(AppointmentError::Conflict { kind: ConflictKind::Appointment, ref conflicting_id }) if *conflicting_id == existing.id
    );

    let lunch = service
        .create_block(
            &actor,
            CreateBlockRequest {
                date: Some(day()),
                start_time: Some("12:00".into()),
                end_time: Some("13:00".into()),
                professional_id: Some("pro_ana".into()),
                room_id: None,
                reason: Some("lunch".into()),
            },
        )
        .unwrap();

    // Double-booking consent does not apply to blocks.
    assert_matches!(
        service.create_appointment(&actor, booking("12:30", "13:00", Some(2))),
        Err(AppointmentError::Conflict { kind: ConflictKind::Block, ref conflicting_id }) if *conflicting_id == lunch.id
    );

    let blocks = service.list_blocks(&actor, Some(day()), Some("pro_ana")).unwrap();
    assert_eq!(blocks.len(), 1);
}

#[test]
fn test_crm_booking_records_lead_timeline_and_moves_stage() {
    let store = Arc::new(InMemoryStore::with_state(seeded_lead("lead_1", Some("pat_9"))));
    let funnel = Arc::new(StoreLeadFunnel::new(store.clone(), ["novo", "agendado"]));
    let hooks = PostCommitHooks::new().with(Arc::new(CrmStageHook::new(funnel, "agendado")));
    let service = service_over(store.clone()).with_hooks(hooks);

    let mut request = booking("14:00", "14:30", None);
    request.patient_id = None;
    let appointment = service
        .create_appointment_from_lead(
            &reception(),
            CreateLeadAppointmentRequest {
                lead_id: Some("lead_1".into()),
                appointment: request,
            },
        )
        .unwrap();

    assert_eq!(appointment.lead_id.as_deref(), Some("lead_1"));
    assert_eq!(appointment.lead_display_name.as_deref(), Some("Maria Souza"));
    assert_eq!(appointment.patient_id.as_deref(), Some("pat_9"));

    let state = store.snapshot().unwrap();
    assert_eq!(state.leads[0].stage.as_deref(), Some("agendado"));
    let timeline = &state.leads[0].timeline;
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].appointment_id.as_deref(), Some(appointment.id.as_str()));
}

#[test]
fn test_crm_booking_survives_missing_stage() {
    let store = Arc::new(InMemoryStore::with_state(seeded_lead("lead_1", None)));
    let funnel = Arc::new(StoreLeadFunnel::new(store.clone(), ["novo"]));
    let hooks = PostCommitHooks::new().with(Arc::new(CrmStageHook::new(funnel, "agendado")));
    let service = service_over(store.clone()).with_hooks(hooks);

    let result = service.create_appointment_from_lead(
        &reception(),
        CreateLeadAppointmentRequest {
            lead_id: Some("lead_1".into()),
            appointment: booking("14:00", "14:30", None),
        },
    );

    assert!(result.is_ok());
    let state = store.snapshot().unwrap();
    assert_eq!(state.appointments.len(), 1);
    assert_eq!(state.leads[0].stage.as_deref(), Some("novo"));
}

#[test]
fn test_crm_booking_rejects_past_dates_and_unknown_leads() {
    let store = Arc::new(InMemoryStore::with_state(seeded_lead("lead_1", None)));
    let service = service_over(store.clone());

    let mut yesterday = booking("14:00", "14:30", None);
    yesterday.date = NaiveDate::from_ymd_opt(2026, 2, 28);
    assert_matches!(
        service.create_appointment_from_lead(
            &reception(),
            CreateLeadAppointmentRequest {
                lead_id: Some("lead_1".into()),
                appointment: yesterday,
            },
        ),
        Err(AppointmentError::Validation { field: "date", .. })
    );

    assert_matches!(
        service.create_appointment_from_lead(
            &reception(),
            CreateLeadAppointmentRequest {
                lead_id: Some("lead_404".into()),
                appointment: booking("14:00", "14:30", None),
            },
        ),
        Err(AppointmentError::NotFound { entity: "lead", .. })
    );

    let state = store.snapshot().unwrap();
    assert!(state.appointments.is_empty());
    assert!(state.leads[0].timeline.is_empty());
}

struct BrokenHook;

impl PostCommitHook for BrokenHook {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn on_commit(&self, _actor_id: &str, _event: &SchedulingEvent) -> Result<(), HookError> {
        Err(HookError::Unavailable("journey service offline".into()))
    }
}

#[test]
fn test_failing_hooks_never_undo_the_commit() {
    let audit = Arc::new(RecentAuditLog::with_capacity(16));
    let journey = Arc::new(InMemoryJourney::new());
    let hooks = PostCommitHooks::new()
        .with(Arc::new(BrokenHook))
        .with(Arc::new(AuditHook::new(audit.clone())))
        .with(Arc::new(JourneyHook::new(journey.clone())));
    let store = Arc::new(InMemoryStore::new());
    let service = service_over(store.clone()).with_hooks(hooks);

    let created = service.create_appointment(&reception(), booking("10:00", "10:30", None)).unwrap();

    assert_eq!(store.snapshot().unwrap().appointments.len(), 1);
    let entries = audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event, "appointment.created");
    assert_eq!(journey.entry(&created.id).map(|e| e.status), Some(AppointmentStatus::Scheduled));
}

#[test]
fn test_audit_event_names_follow_operation() {
    let audit = Arc::new(RecentAuditLog::with_capacity(16));
    let service = service_over(Arc::new(InMemoryStore::new()))
        .with_hooks(PostCommitHooks::new().with(Arc::new(AuditHook::new(audit.clone()))));
    let actor = reception();

    let created = service.create_appointment(&actor, booking("10:00", "10:30", None)).unwrap();
    service.check_in(&actor, &created.id).unwrap();
    service
        .cancel_appointment(&actor, &created.id, CancelAppointmentRequest::default())
        .unwrap();

    let names: Vec<String> = audit.entries().into_iter().map(|e| e.event).collect();
    assert_eq!(
        names,
        vec!["appointment.created", "appointment.workflow.check_in", "appointment.cancelled"]
    );

    // The event source is kept on the created event.
    let event = SchedulingEvent::AppointmentCreated {
        appointment: created,
        source: BookingSource::Crm,
    };
    assert_eq!(event.audit_name(), "appointment.created_from_lead");
}

#[test]
fn test_professionals_cannot_book() {
    let service = service_over(Arc::new(InMemoryStore::new()));
    let professional = TestUser::professional("ana@clinic.test").to_user();

    assert_matches!(
        service.create_appointment(&professional, booking("10:00", "10:30", None)),
        Err(AppointmentError::Authorization(_))
    );
}

#[test]
fn test_work_hours_need_admin_or_manager() {
    let service = service_over(Arc::new(InMemoryStore::new()));
    let rule = UpsertWorkHourRequest {
        id: None,
        professional_id: "pro_ana".into(),
        weekday: 1,
        start_time: "08:00".into(),
        end_time: "12:00".into(),
        break_start: Some("10:00".into()),
        break_end: Some("10:15".into()),
        active: None,
    };

    assert_matches!(
        service.upsert_work_hours(&reception(), rule.clone()),
        Err(AppointmentError::Authorization(_))
    );

    let admin = TestUser::admin("admin@clinic.test").to_user();
    let saved = service.upsert_work_hours(&admin, rule.clone()).unwrap();
    assert!(saved.active);

    // Same id replaces the rule.
    let mut narrowed = rule;
    narrowed.id = Some(saved.id.clone());
    narrowed.end_time = "11:00".into();
    service.upsert_work_hours(&admin, narrowed).unwrap();

    let rules = service.list_work_hours(&admin, "pro_ana").unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].end_time.to_string(), "11:00");
}

#[test]
fn test_work_hour_break_must_fit_inside_range() {
    let service = service_over(Arc::new(InMemoryStore::new()));
    let admin = TestUser::admin("admin@clinic.test").to_user();

    let result = service.upsert_work_hours(
        &admin,
        UpsertWorkHourRequest {
            id: None,
            professional_id: "pro_ana".into(),
            weekday: 1,
            start_time: "08:00".into(),
            end_time: "12:00".into(),
            break_start: Some("11:30".into()),
            break_end: Some("12:30".into()),
            active: Some(true),
        },
    );
    assert_matches!(result, Err(AppointmentError::Validation { .. }));
}

#[test]
fn test_concurrent_bookings_for_one_slot() {
    let service = Arc::new(service_over(Arc::new(InMemoryStore::new())));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || service.create_appointment(&reception(), booking("15:00", "15:30", None)).is_ok())
        })
        .collect();
    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 1);
}

#[test]
fn test_json_store_keeps_bookings_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agenda.json");

    let created = {
        let store = Arc::new(JsonFileStore::open(&path).unwrap());
        service_over(store)
            .create_appointment(&reception(), booking("10:00", "10:30", None))
            .unwrap()
    };

    let reopened = service_over(Arc::new(JsonFileStore::open(&path).unwrap()));
    let stored = reopened.get_appointment(&reception(), &created.id).unwrap();
    assert_eq!(stored.start_time.to_string(), "10:00");
    assert_matches!(
        reopened.create_appointment(&reception(), booking("10:00", "10:30", None)),
        Err(AppointmentError::Conflict { .. })
    );
}
