//! Permission model: roles, grants, and route access resolution.

mod resolver;
mod routes;
mod types;

pub use resolver::{Access, DenyReason, PermissionResolver};
pub use routes::{FOUNDATIONAL_TABLES, RouteResource, RouteTable};
pub use types::{GrantDetails, PermissionFlags, Principal, Role, TableGrant};
