//! Principal, role, and grant types carried in access token claims.

use serde::{Deserialize, Serialize};

/// Role flags as encoded in the token's `permissions` claim.
///
/// Flags are independent booleans; a missing flag deserializes as `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionFlags {
    pub is_superadmin: bool,
    pub is_admin: bool,
    #[serde(rename = "isHSZC")]
    pub is_hszc: bool,
    pub is_privileged: bool,
    pub is_standard: bool,
}

/// Derived role, ordered by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Superadmin,
    Admin,
    Hszc,
    Privileged,
    Standard,
    /// Fallback when no role flag is set.
    User,
}

impl Role {
    /// Derive the role from the permission flags.
    ///
    /// Precedence is total: Superadmin > Admin > HSZC > Privileged > Standard,
    /// falling back to `User` when no flag is set.
    pub fn from_flags(flags: &PermissionFlags) -> Self {
        if flags.is_superadmin {
            Role::Superadmin
        } else if flags.is_admin {
            Role::Admin
        } else if flags.is_hszc {
            Role::Hszc
        } else if flags.is_privileged {
            Role::Privileged
        } else if flags.is_standard {
            Role::Standard
        } else {
            Role::User
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Superadmin => "superadmin",
            Role::Admin => "admin",
            Role::Hszc => "hszc",
            Role::Privileged => "privileged",
            Role::Standard => "standard",
            Role::User => "user",
        };
        write!(f, "{}", name)
    }
}

/// CRUD detail flags inside a table grant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GrantDetails {
    pub can_read: bool,
    pub can_create: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

/// A per-table access grant.
///
/// The claims may carry at most one grant per table; duplicates are dropped
/// at decode time (first entry wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableGrant {
    pub table_name: String,
    /// Master switch over the CRUD detail flags. A grant row with
    /// `access: false` does not open the table.
    #[serde(default = "default_true")]
    pub access: bool,
    #[serde(default)]
    pub permissions_details: GrantDetails,
}

fn default_true() -> bool {
    true
}

impl TableGrant {
    /// Read-only grant for a single table. Used heavily in tests.
    pub fn read_only(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            access: true,
            permissions_details: GrantDetails {
                can_read: true,
                ..GrantDetails::default()
            },
        }
    }
}

/// The acting identity of the session.
///
/// Derived entirely from the access token claims at decode time; never
/// hand-mutated outside a decode or an impersonation transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub permissions: PermissionFlags,
    pub table_access: Vec<TableGrant>,
    pub school_id: Option<String>,
    /// Expiry (epoch seconds) of the access token this principal was
    /// decoded from.
    pub token_expiry: u64,
}

impl Principal {
    pub fn is_superadmin(&self) -> bool {
        self.permissions.is_superadmin
    }

    /// Look up the grant for a table, if any.
    pub fn grant_for(&self, table_name: &str) -> Option<&TableGrant> {
        self.table_access
            .iter()
            .find(|g| g.table_name == table_name)
    }

    /// True if the principal holds an enabled grant for the table.
    pub fn has_grant(&self, table_name: &str) -> bool {
        self.grant_for(table_name).is_some_and(|g| g.access)
    }
}
