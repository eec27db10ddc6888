// src/feed/visibility.rs
//! Per-viewer visibility. Pure over `(items, viewer, policy)`; nothing here is
//! stored, so one merged state can serve differently scoped viewers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::feed::types::ActivityItem;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Owner,
    Admin,
    Engineer,
    Technician,
    Guard,
    Client,
    Other(String),
}

impl Role {
    /// Lenient parse; known aliases fold onto the canonical roles.
    pub fn parse(s: &str) -> Role {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" | "superadmin" => Role::Owner,
            "admin" | "manager" => Role::Admin,
            "engineer" => Role::Engineer,
            "technician" | "tech" => Role::Technician,
            "guard" | "watchman" => Role::Guard,
            "client" | "customer" => Role::Client,
            other => Role::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Engineer => "engineer",
            Role::Technician => "technician",
            Role::Guard => "guard",
            Role::Client => "client",
            Role::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RolePolicy {
    /// Sees every item regardless of scope.
    #[serde(default)]
    pub privileged: bool,
    /// May see items carrying neither a site nor a plant.
    #[serde(default)]
    pub sees_unscoped: bool,
}

impl RolePolicy {
    pub const PRIVILEGED: RolePolicy = RolePolicy {
        privileged: true,
        sees_unscoped: true,
    };
    pub const RESTRICTED: RolePolicy = RolePolicy {
        privileged: false,
        sees_unscoped: false,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityPolicy {
    /// Keyed by canonical role name. Entries loaded from a file are laid
    /// over the built-in table by `merged_over_defaults`.
    #[serde(default = "default_roles")]
    pub roles: BTreeMap<String, RolePolicy>,
    /// Applies to roles missing from `roles`.
    #[serde(default = "default_fallback")]
    pub fallback: RolePolicy,
}

fn default_roles() -> BTreeMap<String, RolePolicy> {
    let mut roles = BTreeMap::new();
    roles.insert("owner".to_string(), RolePolicy::PRIVILEGED);
    roles.insert("admin".to_string(), RolePolicy::PRIVILEGED);
    for r in ["engineer", "technician", "guard", "client"] {
        roles.insert(r.to_string(), RolePolicy::RESTRICTED);
    }
    roles
}

fn default_fallback() -> RolePolicy {
    RolePolicy::RESTRICTED
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self {
            roles: default_roles(),
            fallback: default_fallback(),
        }
    }
}

impl VisibilityPolicy {
    pub fn for_role(&self, role: &Role) -> RolePolicy {
        self.roles
            .get(Role::parse(role.as_str()).as_str())
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Folds alias keys onto canonical role names and fills in every
    /// built-in role the table does not mention.
    pub fn merged_over_defaults(self) -> Self {
        let mut roles = default_roles();
        for (name, policy) in self.roles {
            roles.insert(Role::parse(&name).as_str().to_string(), policy);
        }
        Self {
            roles,
            fallback: self.fallback,
        }
    }

    /// Builder-style override, mostly for tests and the demo.
    pub fn with_role(mut self, role: Role, policy: RolePolicy) -> Self {
        self.roles.insert(role.as_str().to_string(), policy);
        self
    }
}

/// Identity + scope assignment used to filter one subscriber's feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub role: Role,
    pub allowed_site_ids: HashSet<String>,
    pub allowed_plant_ids: HashSet<String>,
    /// Only ever logged in hashed form.
    pub user_id: Option<String>,
}

impl Viewer {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            allowed_site_ids: HashSet::new(),
            allowed_plant_ids: HashSet::new(),
            user_id: None,
        }
    }

    pub fn with_sites<I, S>(mut self, sites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_site_ids.extend(sites.into_iter().map(Into::into));
        self
    }

    pub fn with_plants<I, S>(mut self, plants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_plant_ids.extend(plants.into_iter().map(Into::into));
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Decides one item for one viewer.
pub fn is_visible(item: &ActivityItem, viewer: &Viewer, rule: RolePolicy) -> bool {
    if rule.privileged {
        return true;
    }
    let site = item.site_id();
    let plant = item.plant_id();
    if site.is_none() && plant.is_none() {
        return rule.sees_unscoped;
    }
    let site_ok = site.is_some_and(|s| viewer.allowed_site_ids.contains(s));
    let plant_ok = plant.is_some_and(|p| viewer.allowed_plant_ids.contains(p));
    site_ok || plant_ok
}

/// Keeps the visible items, preserving order.
pub fn apply(items: &[ActivityItem], viewer: &Viewer, policy: &VisibilityPolicy) -> Vec<ActivityItem> {
    let rule = policy.for_role(&viewer.role);
    items
        .iter()
        .filter(|it| is_visible(it, viewer, rule))
        .cloned()
        .collect()
}

/// What one viewer receives from a sorted view: filter the whole list, then cap.
pub fn visible_window(
    sorted: &[ActivityItem],
    viewer: &Viewer,
    policy: &VisibilityPolicy,
    limit: usize,
) -> Vec<ActivityItem> {
    let rule = policy.for_role(&viewer.role);
    sorted
        .iter()
        .filter(|it| is_visible(it, viewer, rule))
        .take(limit)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::{Scope, SourceKind};
    use chrono::{DateTime, Utc};

    fn item(id: &str, site: Option<&str>, plant: Option<&str>) -> ActivityItem {
        let scope = Scope {
            site_id: site.map(str::to_string),
            plant_id: plant.map(str::to_string),
            actor_id: None,
        };
        ActivityItem {
            id: id.into(),
            source_kind: SourceKind::Fault,
            title: id.into(),
            description: None,
            occurred_at: DateTime::<Utc>::UNIX_EPOCH,
            scope: (!scope.is_empty()).then_some(scope),
            attributes: Default::default(),
        }
    }

    fn ids(v: &[ActivityItem]) -> Vec<&str> {
        v.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn privileged_roles_see_everything() {
        let items = vec![item("a", Some("S1"), None), item("b", None, None)];
        let policy = VisibilityPolicy::default();
        for role in [Role::Owner, Role::Admin, Role::parse("superadmin")] {
            let out = apply(&items, &Viewer::new(role), &policy);
            assert_eq!(ids(&out), vec!["a", "b"]);
        }
    }

    #[test]
    fn restricted_role_keeps_assigned_site_or_plant() {
        let items = vec![
            item("a", Some("S1"), None),
            item("b", Some("S2"), None),
            item("c", None, Some("P1")),
            item("d", Some("S2"), Some("P1")),
            item("e", None, None),
        ];
        let viewer = Viewer::new(Role::Technician)
            .with_sites(["S1"])
            .with_plants(["P1"]);
        let out = apply(&items, &viewer, &VisibilityPolicy::default());
        assert_eq!(ids(&out), vec!["a", "c", "d"]);
    }

    #[test]
    fn unscoped_visibility_is_configurable() {
        let items = vec![item("u", None, None)];
        let viewer = Viewer::new(Role::Guard);
        let strict = VisibilityPolicy::default();
        assert!(apply(&items, &viewer, &strict).is_empty());

        let lenient = VisibilityPolicy::default().with_role(
            Role::Guard,
            RolePolicy {
                privileged: false,
                sees_unscoped: true,
            },
        );
        assert_eq!(apply(&items, &viewer, &lenient).len(), 1);
    }

    #[test]
    fn unknown_role_falls_back_to_restricted() {
        let items = vec![item("a", Some("S1"), None), item("u", None, None)];
        let viewer = Viewer::new(Role::parse("intern"));
        assert!(apply(&items, &viewer, &VisibilityPolicy::default()).is_empty());
    }

    #[test]
    fn window_caps_after_filtering() {
        let items = vec![
            item("x1", Some("S2"), None),
            item("x2", Some("S2"), None),
            item("a", Some("S1"), None),
            item("b", Some("S1"), None),
            item("c", Some("S1"), None),
        ];
        let viewer = Viewer::new(Role::Client).with_sites(["S1"]);
        let out = visible_window(&items, &viewer, &VisibilityPolicy::default(), 2);
        assert_eq!(ids(&out), vec!["a", "b"]);
    }

    #[test]
    fn role_aliases_fold() {
        assert_eq!(Role::parse(" Manager "), Role::Admin);
        assert_eq!(Role::parse("customer"), Role::Client);
        assert_eq!(Role::parse("intern"), Role::Other("intern".into()));
    }
}
