use crate::identity;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A named, ordered collection of resources, such as a concert programme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    /// Ordered and free of duplicates.
    pub resource_ids: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Project {
    pub fn new(name: impl Into<String>, resource_ids: &[String], now: OffsetDateTime) -> Self {
        let mut project = Self { name: name.into(), resource_ids: Vec::new(), created_at: now, updated_at: now };
        project.append(resource_ids);
        project
    }

    /// See [`identity::project_id`].
    pub fn id(&self) -> String {
        identity::project_id(&self.name)
    }

    /// Union `resource_ids` into the project: existing ids keep their place,
    /// new ones are appended in order of first appearance.
    pub fn merge(&mut self, resource_ids: &[String], now: OffsetDateTime) {
        self.append(resource_ids);
        self.updated_at = now;
    }

    /// Drop one resource from the project. Returns `false` if it wasn't a
    /// member.
    pub fn remove(&mut self, resource_id: &str, now: OffsetDateTime) -> bool {
        let before = self.resource_ids.len();
        self.resource_ids.retain(|id| id != resource_id);
        self.updated_at = now;
        self.resource_ids.len() != before
    }

    fn append(&mut self, resource_ids: &[String]) {
        for id in resource_ids {
            if !self.resource_ids.contains(id) {
                self.resource_ids.push(id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_new_deduplicates() {
        let now = datetime!(2026-03-01 19:30 UTC);
        let project = Project::new("Spring Concert", &ids(&["a", "b", "a", "c"]), now);
        assert_eq!(project.resource_ids, ids(&["a", "b", "c"]));
        assert_eq!(project.id(), "springconcert");
        assert_eq!(project.created_at, project.updated_at);
    }

    #[test]
    fn test_merge_keeps_order_and_bumps_updated_at() {
        let created = datetime!(2026-03-01 19:30 UTC);
        let later = datetime!(2026-03-02 08:00 UTC);
        let mut project = Project::new("Spring Concert", &ids(&["b", "a"]), created);
        project.merge(&ids(&["c", "a", "d", "c"]), later);
        assert_eq!(project.resource_ids, ids(&["b", "a", "c", "d"]));
        assert_eq!(project.created_at, created);
        assert_eq!(project.updated_at, later);
    }

    #[test]
    fn test_remove() {
        let now = datetime!(2026-03-01 19:30 UTC);
        let mut project = Project::new("Gala", &ids(&["a", "b"]), now);
        assert!(project.remove("a", now));
        assert!(!project.remove("zzz", now));
        assert_eq!(project.resource_ids, ids(&["b"]));
    }

    #[test]
    fn test_timestamps_serialize_as_rfc3339() {
        let now = datetime!(2026-03-01 19:30 UTC);
        let value = serde_json::to_value(Project::new("Gala", &[], now)).unwrap();
        assert_eq!(value["created_at"], serde_json::json!("2026-03-01T19:30:00Z"));
    }
}
