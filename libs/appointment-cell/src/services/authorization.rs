// libs/appointment-cell/src/services/authorization.rs
use std::fmt;

use tracing::warn;

use shared_models::auth::User;

use crate::models::AppointmentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Manager,
    Reception,
    Professional,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Reception => "reception",
            Role::Professional => "professional",
        }
    }

    /// Role carried by the JWT `role` claim, if it is one of ours.
    pub fn of(user: &User) -> Option<Role> {
        [Role::Admin, Role::Manager, Role::Reception, Role::Professional]
            .into_iter()
            .find(|role| user.has_role(role.as_str()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    AgendaCreate,
    AgendaUpdate,
    AgendaCancel,
    AgendaBlock,
    AgendaView,
    WorkflowCheckIn,
    WorkflowCall,
    WorkflowFinish,
    WorkHoursManage,
}

impl Permission {
    pub fn key(&self) -> &'static str {
        match self {
            Permission::AgendaCreate => "agenda.create",
            Permission::AgendaUpdate => "agenda.update",
            Permission::AgendaCancel => "agenda.cancel",
            Permission::AgendaBlock => "agenda.block",
            Permission::AgendaView => "agenda.view",
            Permission::WorkflowCheckIn => "workflow.check_in",
            Permission::WorkflowCall => "workflow.call",
            Permission::WorkflowFinish => "workflow.finish",
            Permission::WorkHoursManage => "work_hours.manage",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Guards called before any state is touched. Both fail with
/// [`AppointmentError::Authorization`] on denial.
pub trait Authorizer: Send + Sync {
    fn require_permission(&self, actor: &User, permission: Permission) -> Result<(), AppointmentError>;

    fn require_role(&self, actor: &User, roles: &[Role]) -> Result<(), AppointmentError>;
}

/// Static role → permission table.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleBasedAuthorizer;

impl RoleBasedAuthorizer {
    pub fn new() -> Self {
        Self
    }

    pub fn grants(&self, role: Role, permission: Permission) -> bool {
        use Permission::*;
        match role {
            Role::Admin | Role::Manager => true,
            Role::Reception => matches!(
                permission,
                AgendaCreate | AgendaUpdate | AgendaCancel | AgendaBlock | AgendaView | WorkflowCheckIn
            ),
            Role::Professional => matches!(permission, AgendaView | WorkflowCall | WorkflowFinish),
        }
    }
}

impl Authorizer for RoleBasedAuthorizer {
    fn require_permission(&self, actor: &User, permission: Permission) -> Result<(), AppointmentError> {
        match Role::of(actor) {
            Some(role) if self.grants(role, permission) => Ok(()),
            role => {
                warn!(
                    user_id = %actor.id,
                    role = ?role,
                    permission = permission.key(),
                    "Permission denied"
                );
                Err(AppointmentError::Authorization(format!(
                    "missing permission {}",
                    permission
                )))
            }
        }
    }

    fn require_role(&self, actor: &User, roles: &[Role]) -> Result<(), AppointmentError> {
        match Role::of(actor) {
            Some(role) if roles.contains(&role) => Ok(()),
            role => {
                warn!(user_id = %actor.id, role = ?role, "Role check failed");
                let expected: Vec<&str> = roles.iter().map(Role::as_str).collect();
                Err(AppointmentError::Authorization(format!(
                    "requires one of roles: {}",
                    expected.join(", ")
                )))
            }
        }
    }
}
