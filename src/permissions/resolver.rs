//! Route access resolution.
//!
//! One resolver, consulted by every guard call site. Rule evaluation order is
//! fixed and load-bearing: the data-import exception must run before the
//! generic "empty grants" rule, since an admin with zero grant rows may still
//! enter data import.

use serde::Serialize;
use tracing::debug;

use super::routes::{FOUNDATIONAL_TABLES, RouteResource, RouteTable};
use super::types::Principal;

/// Outcome of a permission check. `Allow` carries nothing; `Deny` always
/// carries a machine-readable reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(DenyReason),
}

impl Access {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Access::Allow)
    }
}

/// Why a navigation was denied. Drives the user-facing message and the
/// denial log line; never an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The route has no resource mapping.
    Unmapped,
    /// The principal holds no table grants at all.
    NoAccess,
    /// The resource requires a role the principal does not have.
    InsufficientPermissions,
    /// The principal has grants, but none for this table.
    TableAccessDenied,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Unmapped => "unmapped",
            DenyReason::NoAccess => "no_access",
            DenyReason::InsufficientPermissions => "insufficient_permissions",
            DenyReason::TableAccessDenied => "table_access_denied",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maps (principal, route) to an access decision over a static route table.
pub struct PermissionResolver {
    routes: RouteTable,
}

impl PermissionResolver {
    pub fn new(routes: RouteTable) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Decide whether the principal may reach the route.
    ///
    /// Rules, in order (first match wins):
    /// 1. superadmin bypasses everything;
    /// 2. unmapped routes are denied;
    /// 3. public routes are allowed;
    /// 4. special resources (table admin, logs, user management, data
    ///    import) apply their named policy;
    /// 5. ordinary tables require a matching enabled grant, with an empty
    ///    grant set denied outright.
    pub fn resolve(&self, principal: &Principal, route: &str) -> Access {
        if principal.permissions.is_superadmin {
            return Access::Allow;
        }

        let Some(resource) = self.routes.resource(route) else {
            return Access::Deny(DenyReason::Unmapped);
        };

        let decision = match resource {
            RouteResource::Public => Access::Allow,
            // Superadmin-only screens; the bypass above already admitted them.
            RouteResource::TableAdmin | RouteResource::Logs | RouteResource::UserManagement => {
                Access::Deny(DenyReason::InsufficientPermissions)
            }
            RouteResource::DataImport => {
                let foundational = FOUNDATIONAL_TABLES.iter().any(|t| principal.has_grant(t));
                if principal.permissions.is_admin || foundational {
                    Access::Allow
                } else {
                    Access::Deny(DenyReason::InsufficientPermissions)
                }
            }
            RouteResource::Table(table_name) => {
                if principal.table_access.is_empty() {
                    Access::Deny(DenyReason::NoAccess)
                } else if principal.has_grant(table_name) {
                    Access::Allow
                } else {
                    Access::Deny(DenyReason::TableAccessDenied)
                }
            }
        };

        if let Access::Deny(reason) = decision {
            debug!(route, reason = %reason, email = %principal.email, "Access denied");
        }
        decision
    }

    /// Routes the principal may reach, for menu construction.
    ///
    /// Advisory only: enforcement always re-runs [`resolve`](Self::resolve).
    pub fn accessible_routes(&self, principal: &Principal) -> Vec<&str> {
        self.routes
            .routes()
            .filter(|route| self.resolve(principal, route).is_allowed())
            .collect()
    }
}
