//! Permission checks for map requests.

use std::collections::HashSet;
use std::fmt;

use hazelmap_core::{HazelmapError, Result};

/// Actions a map request can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    /// Read entries (get, contains, size, queries).
    Read,
    /// Write entries (put, set, replace, evict).
    Put,
    /// Remove entries.
    Remove,
    /// Lock and unlock keys.
    Lock,
    /// Add and remove entry listeners.
    Listen,
    /// Add and remove interceptors.
    Intercept,
    /// Every action.
    All,
}

impl ActionType {
    /// Returns `true` if holding this action also grants `other`.
    pub fn implies(self, other: ActionType) -> bool {
        self == ActionType::All || self == other
    }

    /// Returns the lower-case action name.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Read => "read",
            ActionType::Put => "put",
            ActionType::Remove => "remove",
            ActionType::Lock => "lock",
            ActionType::Listen => "listen",
            ActionType::Intercept => "intercept",
            ActionType::All => "all",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether an action on a named map is allowed.
pub trait Authorizer: Send + Sync {
    /// Returns `Ok(())` if allowed, `PermissionDenied` otherwise.
    fn authorize(&self, action: ActionType, resource: &str) -> Result<()>;
}

/// Allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _action: ActionType, _resource: &str) -> Result<()> {
        Ok(())
    }
}

/// Actions granted on the maps matching a name pattern.
///
/// Patterns are an exact name, `*`, a `prefix*`, or a `*suffix`.
#[derive(Debug, Clone)]
pub struct PermissionGrant {
    pattern: String,
    actions: HashSet<ActionType>,
}

impl PermissionGrant {
    /// Creates an empty grant on every map.
    pub fn new() -> Self {
        Self {
            pattern: "*".to_string(),
            actions: HashSet::new(),
        }
    }

    /// Restricts the grant to maps matching `pattern`.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    /// Adds an action.
    pub fn with_action(mut self, action: ActionType) -> Self {
        self.actions.insert(action);
        self
    }

    /// Adds several actions.
    pub fn with_actions(mut self, actions: impl IntoIterator<Item = ActionType>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Returns the map name pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns `true` if the grant covers `action` on `resource`.
    pub fn allows(&self, action: ActionType, resource: &str) -> bool {
        self.matches(resource) && self.actions.iter().any(|granted| granted.implies(action))
    }

    fn matches(&self, resource: &str) -> bool {
        let pattern = self.pattern.as_str();
        if pattern == "*" {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix('*') {
            return resource.starts_with(prefix);
        }
        if let Some(suffix) = pattern.strip_prefix('*') {
            return resource.ends_with(suffix);
        }
        pattern == resource
    }
}

impl Default for PermissionGrant {
    fn default() -> Self {
        Self::new()
    }
}

/// A named set of grants.
#[derive(Debug, Clone)]
pub struct Role {
    name: String,
    grants: Vec<PermissionGrant>,
}

impl Role {
    /// Creates a role with no grants.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grants: Vec::new(),
        }
    }

    /// Adds a grant.
    pub fn with_grant(mut self, grant: PermissionGrant) -> Self {
        self.grants.push(grant);
        self
    }

    /// Returns the role name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if any grant covers `action` on `resource`.
    pub fn allows(&self, action: ActionType, resource: &str) -> bool {
        self.grants.iter().any(|g| g.allows(action, resource))
    }

    /// A role that may read and listen on every map.
    pub fn read_only(name: impl Into<String>) -> Self {
        Self::new(name).with_grant(PermissionGrant::new().with_actions([ActionType::Read, ActionType::Listen]))
    }

    /// A role that may read, write, lock and listen on every map.
    pub fn read_write(name: impl Into<String>) -> Self {
        Self::new(name).with_grant(PermissionGrant::new().with_actions([
            ActionType::Read,
            ActionType::Put,
            ActionType::Remove,
            ActionType::Lock,
            ActionType::Listen,
        ]))
    }

    /// A role that may do anything.
    pub fn admin(name: impl Into<String>) -> Self {
        Self::new(name).with_grant(PermissionGrant::new().with_action(ActionType::All))
    }
}

/// Authorizes requests against a set of roles.
///
/// With no roles every request is denied.
#[derive(Debug, Clone, Default)]
pub struct RoleAuthorizer {
    roles: Vec<Role>,
}

impl RoleAuthorizer {
    /// Creates an authorizer with no roles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    /// Returns the assigned roles.
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}

impl Authorizer for RoleAuthorizer {
    fn authorize(&self, action: ActionType, resource: &str) -> Result<()> {
        if self.roles.iter().any(|role| role.allows(action, resource)) {
            return Ok(());
        }
        tracing::debug!(action = %action, map = %resource, "permission denied");
        Err(HazelmapError::PermissionDenied {
            action: action.to_string(),
            resource: resource.to_string(),
        })
    }
}
