// libs/appointment-cell/src/services/conflict.rs
use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::models::{
    Appointment, AppointmentBlock, AppointmentError, ConflictCheckResponse, ConflictKind,
    MAX_SLOT_CAPACITY, MIN_SLOT_CAPACITY,
};
use crate::services::store::SchedulingState;
use crate::services::time::{overlaps, TimeOfDay};

/// Anything that occupies a resource for an interval of a day.
pub trait Occupant {
    fn occupant_id(&self) -> &str;
    fn interval(&self) -> (TimeOfDay, TimeOfDay);
    fn professional_id(&self) -> Option<&str>;
    fn room_id(&self) -> Option<&str>;
}

impl Occupant for Appointment {
    fn occupant_id(&self) -> &str {
        &self.id
    }

    fn interval(&self) -> (TimeOfDay, TimeOfDay) {
        (self.start_time, self.end_time)
    }

    fn professional_id(&self) -> Option<&str> {
        non_empty(self.professional_id.as_deref())
    }

    fn room_id(&self) -> Option<&str> {
        non_empty(self.room_id.as_deref())
    }
}

impl Occupant for AppointmentBlock {
    fn occupant_id(&self) -> &str {
        &self.id
    }

    fn interval(&self) -> (TimeOfDay, TimeOfDay) {
        (self.start_time, self.end_time)
    }

    fn professional_id(&self) -> Option<&str> {
        non_empty(self.professional_id.as_deref())
    }

    fn room_id(&self) -> Option<&str> {
        non_empty(self.room_id.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// An interval someone wants to place on a professional or room.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementCandidate {
    pub id: Option<String>,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub professional_id: Option<String>,
    pub room_id: Option<String>,
    pub slot_capacity: u8,
}

impl PlacementCandidate {
    pub fn from_appointment(appointment: &Appointment) -> Self {
        Self {
            id: Some(appointment.id.clone()),
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            professional_id: appointment.professional_id.clone(),
            room_id: appointment.room_id.clone(),
            slot_capacity: appointment.slot_capacity,
        }
    }

    pub fn from_block(block: &AppointmentBlock) -> Self {
        Self {
            id: Some(block.id.clone()),
            start_time: block.start_time,
            end_time: block.end_time,
            professional_id: block.professional_id.clone(),
            room_id: block.room_id.clone(),
            slot_capacity: MIN_SLOT_CAPACITY,
        }
    }

    /// Professional takes precedence; a candidate with neither matches nothing.
    fn shares_resource_with(&self, item: &impl Occupant) -> bool {
        if let Some(professional) = non_empty(self.professional_id.as_deref()) {
            return item.professional_id() == Some(professional);
        }
        if let Some(room) = non_empty(self.room_id.as_deref()) {
            return item.room_id() == Some(room);
        }
        false
    }

    fn overlaps(&self, item: &impl Occupant) -> bool {
        let (start, end) = item.interval();
        overlaps(self.start_time, self.end_time, start, end)
    }

    fn is_excluded(&self, item: &impl Occupant, exclude_id: Option<&str>) -> bool {
        let id = item.occupant_id();
        exclude_id == Some(id) || self.id.as_deref() == Some(id)
    }
}

/// Outcome of placing a candidate among existing appointments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub ok: bool,
    pub reason: Option<String>,
    pub conflicting_id: Option<String>,
}

impl Placement {
    fn legal() -> Self {
        Self {
            ok: true,
            reason: None,
            conflicting_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub conflicting_id: String,
}

impl From<Conflict> for AppointmentError {
    fn from(conflict: Conflict) -> Self {
        AppointmentError::Conflict {
            kind: conflict.kind,
            conflicting_id: conflict.conflicting_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetectionService;

impl ConflictDetectionService {
    pub fn new() -> Self {
        Self
    }

    /// Capacity-aware placement among appointments (cancelled ones filtered by the caller).
    ///
    /// Occupants are the resource-matched, overlapping appointments other than
    /// the candidate itself. The candidate plus its occupants must fit in the
    /// largest capacity any of them was booked with, capped at two.
    pub fn resolve(
        &self,
        existing: &[Appointment],
        candidate: &PlacementCandidate,
        exclude_id: Option<&str>,
    ) -> Placement {
        let occupants: Vec<&Appointment> = existing
            .iter()
            .filter(|item| !candidate.is_excluded(*item, exclude_id))
            .filter(|item| candidate.shares_resource_with(*item))
            .filter(|item| candidate.overlaps(*item))
            .collect();

        if occupants.is_empty() {
            return Placement::legal();
        }

        let occupant_count = occupants.len() + 1;
        let allowed = occupants
            .iter()
            .map(|a| a.slot_capacity)
            .fold(candidate.slot_capacity, u8::max)
            .clamp(MIN_SLOT_CAPACITY, MAX_SLOT_CAPACITY) as usize;

        if occupant_count <= allowed {
            debug!(
                occupants = occupant_count,
                allowed, "Double booking accepted for {}-{}", candidate.start_time, candidate.end_time
            );
            return Placement::legal();
        }

        let blocking = occupants[0];
        Placement {
            ok: false,
            reason: Some(format!(
                "overlaps appointment {} ({}-{}); {} occupants exceed capacity {}",
                blocking.id, blocking.start_time, blocking.end_time, occupant_count, allowed
            )),
            conflicting_id: Some(blocking.id.clone()),
        }
    }

    /// Blocks admit no sharing: any resource-matched overlap is a conflict.
    pub fn find_block_conflict<'a>(
        &self,
        blocks: &'a [AppointmentBlock],
        candidate: &PlacementCandidate,
        exclude_id: Option<&str>,
    ) -> Option<&'a AppointmentBlock> {
        blocks.iter().find(|block| {
            !candidate.is_excluded(*block, exclude_id)
                && candidate.shares_resource_with(*block)
                && candidate.overlaps(*block)
        })
    }

    /// Appointment-vs-appointment first, then appointment-vs-block.
    pub fn find_conflict(
        &self,
        state: &SchedulingState,
        date: NaiveDate,
        candidate: &PlacementCandidate,
        exclude_id: Option<&str>,
    ) -> Option<Conflict> {
        let appointments = state.active_appointments_on(date);
        let placement = self.resolve(&appointments, candidate, exclude_id);
        if let Some(conflicting_id) = placement.conflicting_id.filter(|_| !placement.ok) {
            return Some(Conflict {
                kind: ConflictKind::Appointment,
                conflicting_id,
            });
        }

        let blocks = state.blocks_on(date);
        self.find_block_conflict(&blocks, candidate, exclude_id)
            .map(|block| Conflict {
                kind: ConflictKind::Block,
                conflicting_id: block.id.clone(),
            })
    }

    pub fn has_conflict(
        &self,
        state: &SchedulingState,
        date: NaiveDate,
        candidate: &PlacementCandidate,
        exclude_id: Option<&str>,
    ) -> bool {
        self.find_conflict(state, date, candidate, exclude_id).is_some()
    }

    pub fn ensure_placeable(
        &self,
        state: &SchedulingState,
        date: NaiveDate,
        candidate: &PlacementCandidate,
        exclude_id: Option<&str>,
    ) -> Result<(), AppointmentError> {
        match self.find_conflict(state, date, candidate, exclude_id) {
            Some(conflict) => {
                warn!(
                    date = %date,
                    start = %candidate.start_time,
                    end = %candidate.end_time,
                    conflicting_id = %conflict.conflicting_id,
                    "Placement rejected: conflict with {}", conflict.kind
                );
                Err(conflict.into())
            }
            None => Ok(()),
        }
    }

    /// A new block may not overlap any live appointment or other block on its resource.
    pub fn ensure_block_placeable(
        &self,
        state: &SchedulingState,
        date: NaiveDate,
        candidate: &PlacementCandidate,
    ) -> Result<(), AppointmentError> {
        let appointments = state.active_appointments_on(date);
        if let Some(appointment) = appointments.iter().find(|a| {
            !candidate.is_excluded(*a, None) && candidate.shares_resource_with(*a) && candidate.overlaps(*a)
        }) {
            warn!(conflicting_id = %appointment.id, "Block rejected: overlaps appointment");
            return Err(AppointmentError::Conflict {
                kind: ConflictKind::Appointment,
                conflicting_id: appointment.id.clone(),
            });
        }

        let blocks = state.blocks_on(date);
        if let Some(block) = self.find_block_conflict(&blocks, candidate, None) {
            warn!(conflicting_id = %block.id, "Block rejected: overlaps block");
            return Err(AppointmentError::Conflict {
                kind: ConflictKind::Block,
                conflicting_id: block.id.clone(),
            });
        }
        Ok(())
    }

    pub fn check_response(
        &self,
        state: &SchedulingState,
        date: NaiveDate,
        candidate: &PlacementCandidate,
        exclude_id: Option<&str>,
    ) -> ConflictCheckResponse {
        match self.find_conflict(state, date, candidate, exclude_id) {
            Some(conflict) => ConflictCheckResponse {
                has_conflict: true,
                reason: Some(format!("conflicts with {} {}", conflict.kind, conflict.conflicting_id)),
                conflicting_id: Some(conflict.conflicting_id),
                conflict_kind: Some(conflict.kind),
            },
            None => ConflictCheckResponse {
                has_conflict: false,
                conflicting_id: None,
                conflict_kind: None,
                reason: None,
            },
        }
    }
}
