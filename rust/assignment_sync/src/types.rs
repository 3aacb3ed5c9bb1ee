//! Core types shared by the store, the engine and the transport.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Something that can be attached to a parent entity: a permission (on a
/// role) or a role (on a user).
///
/// Field aliases accept the console's permission shape
/// (`module`/`action`) and role shape (`name`) alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignableItem {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Grouping key for bulk operations. Absent for roles.
    #[serde(default, alias = "module")]
    pub category: Option<String>,
    #[serde(default, alias = "action", alias = "label")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl AssignableItem {
    pub fn new(id: impl Into<String>, category: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: category.map(str::to_string),
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Display fields searched by the filter predicate.
    pub fn display_fields(&self) -> impl Iterator<Item = &str> {
        self.category
            .as_deref()
            .into_iter()
            .chain(std::iter::once(self.name.as_str()))
            .chain(self.description.as_deref())
    }

    /// Human-readable label used in notifications.
    pub fn label(&self) -> String {
        match &self.category {
            Some(category) => format!("{}:{}", category, self.name),
            None => self.name.clone(),
        }
    }
}

/// Ids arrive as strings or numbers depending on the endpoint.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// One partition of the grouped view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemGroup {
    /// `None` collects items without a category.
    pub category: Option<String>,
    pub items: Vec<AssignableItem>,
}

/// Assignment counts over the full catalog membership of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CategorySummary {
    pub total: usize,
    pub assigned: usize,
}

impl CategorySummary {
    pub fn is_fully_assigned(&self) -> bool {
        self.total > 0 && self.assigned == self.total
    }

    pub fn is_partially_assigned(&self) -> bool {
        self.assigned > 0 && self.assigned < self.total
    }
}

/// Which parent/item pair an engine edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentKind {
    /// Permissions attached to a role; grouped by permission module.
    PermissionsOnRole,
    /// Roles attached to a user; ungrouped.
    RolesOnUser,
}

impl AssignmentKind {
    /// REST collection of the parent entity.
    pub fn parent_collection(&self) -> &'static str {
        match self {
            Self::PermissionsOnRole => "roles",
            Self::RolesOnUser => "users",
        }
    }

    /// REST collection of the assignable items.
    pub fn item_collection(&self) -> &'static str {
        match self {
            Self::PermissionsOnRole => "permissions",
            Self::RolesOnUser => "roles",
        }
    }

    pub fn item_noun(&self) -> &'static str {
        match self {
            Self::PermissionsOnRole => "permission",
            Self::RolesOnUser => "role",
        }
    }

    pub fn parent_noun(&self) -> &'static str {
        match self {
            Self::PermissionsOnRole => "role",
            Self::RolesOnUser => "user",
        }
    }
}

impl fmt::Display for AssignmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionsOnRole => write!(f, "permissions-on-role"),
            Self::RolesOnUser => write!(f, "roles-on-user"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A transient user-facing message raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NotificationLevel::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_permission_shape() {
        let json = r#"{"id":7,"module":"Users","action":"Read","description":"List users"}"#;
        let item: AssignableItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "7");
        assert_eq!(item.category.as_deref(), Some("Users"));
        assert_eq!(item.name, "Read");
        assert_eq!(item.description.as_deref(), Some("List users"));
    }

    #[test]
    fn parse_role_shape() {
        let json = r#"{"id":"r-1","name":"ADMIN"}"#;
        let item: AssignableItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "r-1");
        assert_eq!(item.category, None);
        assert_eq!(item.name, "ADMIN");
    }

    #[test]
    fn display_fields_skip_missing() {
        let role = AssignableItem::new("1", None, "ADMIN");
        assert_eq!(role.display_fields().collect::<Vec<_>>(), vec!["ADMIN"]);

        let perm = AssignableItem::new("2", Some("Users"), "Read").with_description("List");
        assert_eq!(
            perm.display_fields().collect::<Vec<_>>(),
            vec!["Users", "Read", "List"]
        );
        assert_eq!(perm.label(), "Users:Read");
    }

    #[test]
    fn category_summary_flags() {
        let empty = CategorySummary::default();
        assert!(!empty.is_fully_assigned());
        assert!(!empty.is_partially_assigned());

        let partial = CategorySummary { total: 3, assigned: 1 };
        assert!(partial.is_partially_assigned());

        let full = CategorySummary { total: 3, assigned: 3 };
        assert!(full.is_fully_assigned());
    }
}
