use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::NaiveDate;

use appointment_cell::models::*;
use appointment_cell::services::store::InMemoryStore;
use appointment_cell::services::time::{add_minutes, minutes_to_time, overlaps, to_minutes, TimeOfDay};
use appointment_cell::services::AppointmentBookingService;
use shared_config::{BreakMode, SchedulingConfig};
use shared_models::auth::User;
use shared_utils::test_utils::TestUser;

// 2026-03-02 is a Monday (weekday 1).
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn admin() -> User {
    TestUser::admin("admin@clinic.test").to_user()
}

fn service_with(config: SchedulingConfig) -> AppointmentBookingService {
    AppointmentBookingService::new(&config, Arc::new(InMemoryStore::new()))
}

fn morning_shift(service: &AppointmentBookingService, brk: Option<(&str, &str)>) {
    service
        .upsert_work_hours(
            &admin(),
            UpsertWorkHourRequest {
                id: None,
                professional_id: "pro_ana".into(),
                weekday: 1,
                start_time: "08:00".into(),
                end_time: "12:00".into(),
                break_start: brk.map(|(s, _)| s.to_string()),
                break_end: brk.map(|(_, e)| e.to_string()),
                active: Some(true),
            },
        )
        .unwrap();
}

fn book(service: &AppointmentBookingService, start: &str, end: &str, capacity: u8) -> Appointment {
    service
        .create_appointment(
            &admin(),
            CreateAppointmentRequest {
                date: Some(monday()),
                start_time: Some(start.into()),
                end_time: Some(end.into()),
                professional_id: Some("pro_ana".into()),
                room_id: Some("room_1".into()),
                slot_capacity: Some(capacity),
                patient_id: Some("pat_1".into()),
                ..Default::default()
            },
        )
        .unwrap()
}

fn query(duration: u32, allow_double_booking: bool) -> SlotQuery {
    SlotQuery {
        date: monday(),
        professional_id: "pro_ana".into(),
        duration_minutes: duration,
        room_id: Some("room_1".into()),
        allow_double_booking,
    }
}

fn starts(slots: &[AvailableSlot]) -> Vec<String> {
    slots.iter().map(|s| s.start_time.to_string()).collect()
}

#[test]
fn test_slots_skip_existing_appointment() {
    let service = service_with(SchedulingConfig::default());
    morning_shift(&service, None);
    book(&service, "09:00", "09:30", 1);

    let slots = service.available_slots(&admin(), &query(30, false)).unwrap();
    let starts = starts(&slots);

    for kept in ["08:00", "08:15", "08:30", "09:30", "09:45", "11:30"] {
        assert!(starts.contains(&kept.to_string()), "{} should be offered", kept);
    }
    for dropped in ["08:45", "09:00", "09:15", "11:45"] {
        assert!(!starts.contains(&dropped.to_string()), "{} should not be offered", dropped);
    }

    let busy_start = TimeOfDay::parse("09:00").unwrap();
    let busy_end = TimeOfDay::parse("09:30").unwrap();
    assert!(slots
        .iter()
        .all(|s| !overlaps(s.start_time, s.end_time, busy_start, busy_end)));
    assert!(slots.windows(2).all(|w| w[0].start_time < w[1].start_time));
}

#[test]
fn test_double_booking_reopens_slot() {
    let service = service_with(SchedulingConfig::default());
    morning_shift(&service, None);
    book(&service, "09:00", "09:30", 1);

    let slots = service.available_slots(&admin(), &query(30, true)).unwrap();
    assert!(starts(&slots).contains(&"09:00".to_string()));

    book(&service, "09:00", "09:30", 2);
    let slots = service.available_slots(&admin(), &query(30, true)).unwrap();
    assert!(!starts(&slots).contains(&"09:00".to_string()));
}

#[test]
fn test_blocks_remove_slots() {
    let service = service_with(SchedulingConfig::default());
    morning_shift(&service, None);
    service
        .create_block(
            &admin(),
            CreateBlockRequest {
                date: Some(monday()),
                start_time: Some("10:00".into()),
                end_time: Some("11:00".into()),
                professional_id: Some("pro_ana".into()),
                room_id: None,
                reason: Some("training".into()),
            },
        )
        .unwrap();

    let slots = service.available_slots(&admin(), &query(30, true)).unwrap();
    let starts = starts(&slots);
    assert!(!starts.contains(&"10:00".to_string()));
    assert!(!starts.contains(&"10:45".to_string()));
    assert!(starts.contains(&"11:00".to_string()));
}

#[test]
fn test_default_day_without_rules() {
    let service = service_with(SchedulingConfig::default());

    let slots = service.available_slots(&admin(), &query(60, false)).unwrap();
    assert_eq!(slots.first().map(|s| s.start_time.to_string()).as_deref(), Some("08:00"));
    assert_eq!(slots.last().map(|s| s.end_time.to_string()).as_deref(), Some("18:00"));
    assert_eq!(slots.len(), 37);
}

#[test]
fn test_break_handling_is_configurable() {
    let legacy = service_with(SchedulingConfig::default());
    morning_shift(&legacy, Some(("10:00", "10:30")));
    let offered = starts(&legacy.available_slots(&admin(), &query(30, false)).unwrap());
    assert!(offered.contains(&"10:00".to_string()));

    let excluding = service_with(SchedulingConfig {
        break_mode: BreakMode::Exclude,
        ..SchedulingConfig::default()
    });
    morning_shift(&excluding, Some(("10:00", "10:30")));
    let offered = starts(&excluding.available_slots(&admin(), &query(30, false)).unwrap());
    assert!(!offered.contains(&"09:45".to_string()));
    assert!(!offered.contains(&"10:00".to_string()));
    assert!(offered.contains(&"09:30".to_string()));
    assert!(offered.contains(&"10:30".to_string()));
}

#[test]
fn test_slot_generation_is_repeatable() {
    let service = service_with(SchedulingConfig::default());
    morning_shift(&service, None);
    book(&service, "08:30", "09:15", 1);

    let first = service.available_slots(&admin(), &query(45, false)).unwrap();
    let second = service.available_slots(&admin(), &query(45, false)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_slot_query_validation() {
    let service = service_with(SchedulingConfig::default());
    assert_matches!(
        service.available_slots(&admin(), &query(0, false)),
        Err(AppointmentError::Validation { field: "duration_minutes", .. })
    );
}

#[test]
fn test_overlap_is_symmetric_and_half_open() {
    let points = [0u32, 30, 45, 60, 90];
    for &s1 in &points {
        for &e1 in points.iter().filter(|e| **e > s1) {
            for &s2 in &points {
                for &e2 in points.iter().filter(|e| **e > s2) {
                    assert_eq!(overlaps(s1, e1, s2, e2), overlaps(s2, e2, s1, e1));
                }
            }
        }
    }
    assert!(!overlaps(0, 30, 30, 60));
    assert!(overlaps(0, 31, 30, 60));
}

#[test]
fn test_legacy_time_helpers() {
    assert_eq!(to_minutes("09:30"), 570);
    // Malformed input reads as midnight; scheduling paths never rely on this.
    assert_eq!(to_minutes("nine thirty"), 0);
    assert_eq!(to_minutes(""), 0);

    for raw in ["00:00", "07:05", "23:59"] {
        assert_eq!(minutes_to_time(to_minutes(raw)), raw);
    }
    assert_eq!(add_minutes("09:45", 30), "10:15");
}
