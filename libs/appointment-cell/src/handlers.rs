// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, CallToRoomRequest, CancelAppointmentRequest,
    ConfirmAppointmentRequest, ConflictCheckRequest, CreateAppointmentRequest, CreateBlockRequest,
    CreateLeadAppointmentRequest, SlotQuery, UpdateAppointmentRequest, UpsertWorkHourRequest,
};
use crate::services::booking::AppointmentBookingService;

/// Router state: config for the auth middleware plus the shared booking service.
#[derive(Debug, Clone)]
pub struct AppointmentCellState {
    pub config: Arc<AppConfig>,
    pub booking: Arc<AppointmentBookingService>,
}

impl AppointmentCellState {
    pub fn new(config: Arc<AppConfig>, booking: AppointmentBookingService) -> Self {
        Self {
            config,
            booking: Arc::new(booking),
        }
    }
}

/// Service calls take the store lock and, for file-backed stores, write to disk,
/// so they run on the blocking pool.
async fn run_blocking<T, F>(state: &AppointmentCellState, call: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&AppointmentBookingService) -> Result<T, AppointmentError> + Send + 'static,
{
    let booking = Arc::clone(&state.booking);
    tokio::task::spawn_blocking(move || call(&booking))
        .await
        .map_err(|e| AppError::Internal(format!("Scheduling task failed: {}", e)))?
        .map_err(AppError::from)
}

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct BlockQueryParams {
    pub date: Option<NaiveDate>,
    pub professional_id: Option<String>,
}

fn appointment_response(appointment: Appointment, message: &str) -> Json<Value> {
    Json(json!({
        "success": true,
        "appointment": appointment,
        "message": message
    }))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = run_blocking(&state, move |booking| {
        booking.create_appointment(&user, request)
    })
    .await?;
    Ok(appointment_response(appointment, "Appointment booked successfully"))
}

#[axum::debug_handler]
pub async fn create_appointment_from_lead(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateLeadAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = run_blocking(&state, move |booking| {
        booking.create_appointment_from_lead(&user, request)
    })
    .await?;
    Ok(appointment_response(appointment, "Appointment booked from lead"))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Query(filter): Query<AppointmentFilter>,
) -> Result<Json<Value>, AppError> {
    let appointments = run_blocking(&state, move |booking| {
        booking.list_appointments(&user, &filter)
    })
    .await?;
    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let (appointment, valid_operations) = run_blocking(&state, move |booking| {
        let appointment = booking.get_appointment(&user, &appointment_id)?;
        let valid_operations = booking.lifecycle().get_valid_operations(&appointment);
        Ok((appointment, valid_operations))
    })
    .await?;

    Ok(Json(json!({
        "appointment": appointment,
        "valid_operations": valid_operations
    })))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    Json(patch): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = run_blocking(&state, move |booking| {
        booking.update_appointment(&user, &appointment_id, patch)
    })
    .await?;
    Ok(appointment_response(appointment, "Appointment updated successfully"))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = run_blocking(&state, move |booking| {
        booking.cancel_appointment(&user, &appointment_id, request)
    })
    .await?;
    Ok(appointment_response(appointment, "Appointment cancelled successfully"))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let (query, slots) = run_blocking(&state, move |booking| {
        let slots = booking.available_slots(&user, &query)?;
        Ok((query, slots))
    })
    .await?;
    Ok(Json(json!({
        "date": query.date,
        "professional_id": query.professional_id,
        "slots": slots
    })))
}

#[axum::debug_handler]
pub async fn check_conflicts(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Query(request): Query<ConflictCheckRequest>,
) -> Result<Json<Value>, AppError> {
    let response = run_blocking(&state, move |booking| {
        booking.check_conflict(&user, &request)
    })
    .await?;
    Ok(Json(json!(response)))
}

// ==============================================================================
// WORKFLOW HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn check_in(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = run_blocking(&state, move |booking| {
        booking.check_in(&user, &appointment_id)
    })
    .await?;
    Ok(appointment_response(appointment, "Patient checked in"))
}

#[axum::debug_handler]
pub async fn undo_check_in(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = run_blocking(&state, move |booking| {
        booking.undo_check_in(&user, &appointment_id)
    })
    .await?;
    Ok(appointment_response(appointment, "Check-in reverted"))
}

#[axum::debug_handler]
pub async fn call_to_room(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    Json(request): Json<CallToRoomRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = run_blocking(&state, move |booking| {
        booking.call_to_room(&user, &appointment_id, request)
    })
    .await?;
    Ok(appointment_response(appointment, "Patient called to room"))
}

#[axum::debug_handler]
pub async fn finish(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = run_blocking(&state, move |booking| {
        booking.finish(&user, &appointment_id)
    })
    .await?;
    Ok(appointment_response(appointment, "Appointment finished"))
}

#[axum::debug_handler]
pub async fn return_to_waiting(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = run_blocking(&state, move |booking| {
        booking.return_to_waiting(&user, &appointment_id)
    })
    .await?;
    Ok(appointment_response(appointment, "Patient returned to waiting room"))
}

#[axum::debug_handler]
pub async fn request_confirmation(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = run_blocking(&state, move |booking| {
        booking.request_confirmation(&user, &appointment_id)
    })
    .await?;
    Ok(appointment_response(appointment, "Confirmation requested"))
}

#[axum::debug_handler]
pub async fn confirm(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    Json(request): Json<ConfirmAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = run_blocking(&state, move |booking| {
        booking.confirm(&user, &appointment_id, request)
    })
    .await?;
    Ok(appointment_response(appointment, "Appointment confirmed"))
}

#[axum::debug_handler]
pub async fn mark_late(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = run_blocking(&state, move |booking| {
        booking.mark_late(&user, &appointment_id)
    })
    .await?;
    Ok(appointment_response(appointment, "Appointment marked late"))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = run_blocking(&state, move |booking| {
        booking.mark_no_show(&user, &appointment_id)
    })
    .await?;
    Ok(appointment_response(appointment, "Appointment marked as no-show"))
}

#[axum::debug_handler]
pub async fn flag_for_reschedule(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = run_blocking(&state, move |booking| {
        booking.flag_for_reschedule(&user, &appointment_id)
    })
    .await?;
    Ok(appointment_response(appointment, "Appointment flagged for rescheduling"))
}

// ==============================================================================
// BLOCKS & WORK HOURS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_block(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateBlockRequest>,
) -> Result<Json<Value>, AppError> {
    let block = run_blocking(&state, move |booking| booking.create_block(&user, request)).await?;
    Ok(Json(json!({
        "success": true,
        "block": block,
        "message": "Interval blocked"
    })))
}

#[axum::debug_handler]
pub async fn list_blocks(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Query(params): Query<BlockQueryParams>,
) -> Result<Json<Value>, AppError> {
    let blocks = run_blocking(&state, move |booking| {
        booking.list_blocks(&user, params.date, params.professional_id.as_deref())
    })
    .await?;
    Ok(Json(json!({
        "blocks": blocks,
        "total": blocks.len()
    })))
}

#[axum::debug_handler]
pub async fn upsert_work_hours(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpsertWorkHourRequest>,
) -> Result<Json<Value>, AppError> {
    let rule = run_blocking(&state, move |booking| {
        booking.upsert_work_hours(&user, request)
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "rule": rule
    })))
}

#[axum::debug_handler]
pub async fn list_work_hours(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(professional_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let lookup = professional_id.clone();
    let rules = run_blocking(&state, move |booking| booking.list_work_hours(&user, &lookup)).await?;
    Ok(Json(json!({
        "professional_id": professional_id,
        "rules": rules
    })))
}
