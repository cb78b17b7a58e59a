//! Access control for map requests.

mod authorization;

pub use authorization::{ActionType, AllowAll, Authorizer, PermissionGrant, Role, RoleAuthorizer};
