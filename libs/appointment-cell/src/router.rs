// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentCellState};

pub fn appointment_routes(state: Arc<AppointmentCellState>) -> Router {
    // Every scheduling operation requires authentication
    let protected_routes = Router::new()
        // Booking
        .route("/", post(handlers::create_appointment).get(handlers::list_appointments))
        .route("/from-lead", post(handlers::create_appointment_from_lead))
        .route("/slots", get(handlers::get_available_slots))
        .route("/conflicts/check", get(handlers::check_conflicts))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).patch(handlers::update_appointment),
        )
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))

        // Attendance workflow
        .route("/{appointment_id}/check-in", post(handlers::check_in))
        .route("/{appointment_id}/undo-check-in", post(handlers::undo_check_in))
        .route("/{appointment_id}/call", post(handlers::call_to_room))
        .route("/{appointment_id}/finish", post(handlers::finish))
        .route("/{appointment_id}/return-to-waiting", post(handlers::return_to_waiting))
        .route("/{appointment_id}/request-confirmation", post(handlers::request_confirmation))
        .route("/{appointment_id}/confirm", post(handlers::confirm))
        .route("/{appointment_id}/late", post(handlers::mark_late))
        .route("/{appointment_id}/no-show", post(handlers::mark_no_show))
        .route("/{appointment_id}/reschedule-flag", post(handlers::flag_for_reschedule))

        // Blocks and working hours
        .route("/blocks", post(handlers::create_block).get(handlers::list_blocks))
        .route("/work-hours", put(handlers::upsert_work_hours))
        .route("/work-hours/{professional_id}", get(handlers::list_work_hours))

        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
