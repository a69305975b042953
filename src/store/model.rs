//! Persisted records: user profiles and the global college registry.

use serde::{Deserialize, Serialize};

/// Language assigned to users who never picked one.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Registry sentinel, always the last college.
pub const OTHER_COLLEGE: &str = "Other";

/// Well-known keys in the globals document.
pub mod keys {
    pub const COLLEGES: &str = "colleges";
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// Profile collected during onboarding, keyed by user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default = "default_language")]
    pub lang: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub college: Option<String>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            lang: default_language(),
            name: None,
            college: None,
        }
    }
}

impl UserProfile {
    /// Both onboarding fields are filled in.
    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.college.is_some()
    }
}

/// Known colleges in display order, with [`OTHER_COLLEGE`] last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollegeRegistry(Vec<String>);

impl Default for CollegeRegistry {
    fn default() -> Self {
        Self(vec![OTHER_COLLEGE.to_string()])
    }
}

impl CollegeRegistry {
    /// Build a registry from stored names, moving the sentinel to the end.
    pub fn from_names(names: impl IntoIterator<Item = String>) -> Self {
        let mut colleges: Vec<String> = Vec::new();
        for name in names {
            let name = name.trim().to_string();
            if name.is_empty() || name == OTHER_COLLEGE || colleges.contains(&name) {
                continue;
            }
            colleges.push(name);
        }
        colleges.push(OTHER_COLLEGE.to_string());
        Self(colleges)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|c| c == name)
    }

    /// Insert `name` immediately before the sentinel.
    ///
    /// Returns `false` if the name is already known or blank.
    pub fn insert(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        let at = self.0.len().saturating_sub(1);
        self.0.insert(at, name.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_defaults_language() {
        let profile: UserProfile = serde_json::from_str(r#"{ "name": "Asha" }"#).unwrap();
        assert_eq!(profile.lang, "en");
        assert_eq!(profile.name.as_deref(), Some("Asha"));
        assert!(!profile.is_complete());
    }

    #[test]
    fn profile_skips_missing_fields() {
        let json = serde_json::to_value(UserProfile::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "lang": "en" }));
    }

    #[test]
    fn registry_keeps_sentinel_last() {
        let registry = CollegeRegistry::from_names(vec![
            "Other".to_string(),
            "Hansraj College".to_string(),
            "Hansraj College".to_string(),
            "Miranda House".to_string(),
        ]);
        assert_eq!(
            registry.names(),
            &["Hansraj College", "Miranda House", "Other"]
        );
    }

    #[test]
    fn insert_goes_before_sentinel() {
        let mut registry = CollegeRegistry::from_names(vec!["Hansraj College".to_string()]);
        assert!(registry.insert("  Ramjas College "));
        assert!(!registry.insert("Ramjas College"));
        assert!(!registry.insert("Other"));
        assert!(!registry.insert("   "));
        assert_eq!(
            registry.names(),
            &["Hansraj College", "Ramjas College", "Other"]
        );
    }

    #[test]
    fn empty_registry_has_only_sentinel() {
        assert_eq!(CollegeRegistry::default().names(), &["Other"]);
        assert_eq!(CollegeRegistry::from_names(Vec::new()).names(), &["Other"]);
    }
}
