// libs/appointment-cell/src/services/availability.rs
use chrono::{Datelike, NaiveDate};
use tracing::debug;

use shared_config::{BreakMode, SchedulingConfig};

use crate::models::{AppointmentError, AvailableSlot, SlotQuery, WorkHourRule, MAX_SLOT_CAPACITY, MIN_SLOT_CAPACITY};
use crate::services::conflict::{ConflictDetectionService, PlacementCandidate};
use crate::services::store::SchedulingState;
use crate::services::time::{TimeOfDay, MINUTES_PER_DAY};

/// Half-open minute range `[start, end)` inside one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingRange {
    pub start: u32,
    pub end: u32,
}

/// Read-only slot enumeration over a state snapshot.
#[derive(Debug, Clone)]
pub struct AvailabilityService {
    stride_minutes: u32,
    default_day_start: u32,
    default_day_end: u32,
    break_mode: BreakMode,
    conflict_service: ConflictDetectionService,
}

impl AvailabilityService {
    pub fn new(config: &SchedulingConfig) -> Self {
        Self {
            stride_minutes: config.slot_stride_minutes.max(1),
            default_day_start: config.default_day_start,
            default_day_end: config.default_day_end,
            break_mode: config.break_mode,
            conflict_service: ConflictDetectionService::new(),
        }
    }

    /// Ranges a professional works on `date`, from active rules for that weekday
    /// or the default day when none exist.
    pub fn working_ranges(&self, rules: &[WorkHourRule], professional_id: &str, date: NaiveDate) -> Vec<WorkingRange> {
        let weekday = date.weekday().num_days_from_sunday() as u8;

        let mut ranges = Vec::new();
        for rule in rules
            .iter()
            .filter(|r| r.active && r.weekday == weekday && r.professional_id == professional_id)
        {
            let start = rule.start_time.minutes();
            let end = rule.end_time.minutes();

            match (rule.break_start, rule.break_end, self.break_mode) {
                (Some(break_start), Some(break_end), BreakMode::Candidate) => {
                    ranges.push(WorkingRange { start, end });
                    ranges.push(WorkingRange {
                        start: break_start.minutes(),
                        end: break_end.minutes(),
                    });
                }
                (Some(break_start), Some(break_end), BreakMode::Exclude) => {
                    ranges.push(WorkingRange {
                        start,
                        end: break_start.minutes().min(end),
                    });
                    ranges.push(WorkingRange {
                        start: break_end.minutes().max(start),
                        end,
                    });
                }
                _ => ranges.push(WorkingRange { start, end }),
            }
        }

        if ranges.is_empty() {
            debug!("No work-hour rule for {} on weekday {}, using default day", professional_id, weekday);
            ranges.push(WorkingRange {
                start: self.default_day_start,
                end: self.default_day_end,
            });
        }

        ranges.retain(|r| r.start < r.end);
        ranges
    }

    pub fn available_slots(&self, state: &SchedulingState, query: &SlotQuery) -> Result<Vec<AvailableSlot>, AppointmentError> {
        if query.duration_minutes == 0 {
            return Err(AppointmentError::invalid("duration_minutes", "must be greater than zero"));
        }
        if query.duration_minutes > MINUTES_PER_DAY {
            return Err(AppointmentError::invalid("duration_minutes", "must fit inside one day"));
        }
        if query.professional_id.trim().is_empty() {
            return Err(AppointmentError::missing("professional_id"));
        }

        let capacity = if query.allow_double_booking {
            MAX_SLOT_CAPACITY
        } else {
            MIN_SLOT_CAPACITY
        };
        let ranges = self.working_ranges(&state.work_hours, &query.professional_id, query.date);

        let mut slots = Vec::new();
        for range in &ranges {
            let mut cursor = range.start;
            while let Some(slot_end) = cursor
                .checked_add(query.duration_minutes)
                .filter(|end| *end <= range.end)
            {
                if let (Some(start_time), Some(end_time)) =
                    (TimeOfDay::from_minutes(cursor), TimeOfDay::from_minutes(slot_end))
                {
                    let candidate = PlacementCandidate {
                        id: None,
                        start_time,
                        end_time,
                        professional_id: Some(query.professional_id.clone()),
                        room_id: query.room_id.clone(),
                        slot_capacity: capacity,
                    };
                    if !self.conflict_service.has_conflict(state, query.date, &candidate, None) {
                        slots.push(AvailableSlot { start_time, end_time });
                    }
                }
                match cursor.checked_add(self.stride_minutes) {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
        }

        slots.sort_by_key(|s| (s.start_time, s.end_time));
        slots.dedup();

        debug!(
            professional_id = %query.professional_id,
            date = %query.date,
            ranges = ranges.len(),
            "Generated {} available slots", slots.len()
        );
        Ok(slots)
    }
}
