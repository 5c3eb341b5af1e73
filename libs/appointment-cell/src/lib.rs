// =====================================================================================
// APPOINTMENT CELL - CLINIC SCHEDULING & ATTENDANCE WORKFLOW
// =====================================================================================
//
// Calendar placement for professionals and rooms (double-booking aware),
// available-slot generation from weekly work hours, and the per-appointment
// attendance workflow from booking to check-in to service to completion.
//
// =====================================================================================

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Appointment, AppointmentBlock, AppointmentError, AppointmentStatus, WorkHourRule,
    WorkflowError, WorkflowOperation,
};

pub use services::{AppointmentBookingService, InMemoryStore, JsonFileStore, SchedulingStore};

pub use handlers::AppointmentCellState;
pub use router::appointment_routes;
