pub mod authorization;
pub mod availability;
pub mod booking;
pub mod conflict;
pub mod hooks;
pub mod identity;
pub mod lifecycle;
pub mod store;
pub mod time;

pub use authorization::{Authorizer, Permission, Role, RoleBasedAuthorizer};
pub use availability::AvailabilityService;
pub use booking::AppointmentBookingService;
pub use conflict::{ConflictDetectionService, PlacementCandidate};
pub use hooks::{
    AuditHook, AuditLogger, CrmStageHook, InMemoryJourney, JourneyHook, PostCommitHook,
    PostCommitHooks, RecentAuditLog, SchedulingEvent, StoreLeadFunnel, TracingAuditLog,
};
pub use identity::{Clock, FixedClock, IdGenerator, SystemClock, UuidIdGenerator};
pub use lifecycle::{AppointmentLifecycleService, Transition};
pub use store::{InMemoryStore, JsonFileStore, SchedulingState, SchedulingStore};
pub use time::TimeOfDay;
