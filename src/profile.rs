//! Build profiles: named pairings of a container image and a script template.
//!
//! Built-in definitions are compiled into the binary. A `profiles.json` in
//! the local profiles directory is merged on top, so a user profile with the
//! same id replaces the built-in one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, IoContext, Result};
use crate::settings::Settings;

/// Built-in profile definitions.
pub const BUILTIN_PROFILES: &str = include_str!("../profiles/internal_profiles.json");

/// One target environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildProfile {
    pub profile_id: String,
    pub docker_image: String,
    pub script: String,
    pub insecure_registry: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileDefinition {
    docker_image: String,
    script: String,
    #[serde(default)]
    insecure_registry: Option<InsecureFlag>,
}

/// Profile files historically spell the flag as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InsecureFlag {
    Flag(bool),
    Text(String),
}

impl InsecureFlag {
    fn enabled(&self) -> bool {
        match self {
            InsecureFlag::Flag(flag) => *flag,
            InsecureFlag::Text(text) => text.trim().eq_ignore_ascii_case("true"),
        }
    }
}

/// Parse one definitions document (`profile_id -> {docker_image, script, ...}`).
pub fn parse_definitions(origin: &str, text: &str) -> Result<Vec<BuildProfile>> {
    let definitions: BTreeMap<String, ProfileDefinition> =
        serde_json::from_str(text).map_err(|e| Error::ProfileDefinition {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;

    Ok(definitions
        .into_iter()
        .map(|(profile_id, definition)| BuildProfile {
            profile_id,
            docker_image: definition.docker_image,
            script: definition.script,
            insecure_registry: definition
                .insecure_registry
                .is_some_and(|flag| flag.enabled()),
        })
        .collect())
}

#[derive(Debug, Clone)]
enum UserDefinitions {
    None,
    Inline(String),
    File(PathBuf),
}

/// Profile id to profile mapping.
///
/// Unknown ids only fail on [`ProfileRegistry::lookup`], never while loading.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    builtin: String,
    user: UserDefinitions,
    profiles: BTreeMap<String, BuildProfile>,
}

impl ProfileRegistry {
    /// Load built-in definitions and optional user definitions from memory.
    pub fn load(builtin: &str, user: Option<&str>) -> Result<Self> {
        let user = match user {
            Some(text) => UserDefinitions::Inline(text.to_string()),
            None => UserDefinitions::None,
        };
        Self::with_sources(builtin.to_string(), user)
    }

    /// Registry for the embedded profiles plus the local `profiles.json`.
    pub fn open(settings: &Settings) -> Result<Self> {
        Self::with_sources(
            BUILTIN_PROFILES.to_string(),
            UserDefinitions::File(settings.local_profiles_file()),
        )
    }

    fn with_sources(builtin: String, user: UserDefinitions) -> Result<Self> {
        let mut registry = Self {
            builtin,
            user,
            profiles: BTreeMap::new(),
        };
        registry.refresh()?;
        Ok(registry)
    }

    /// Re-read every definition source, replacing the mapping wholesale.
    pub fn refresh(&mut self) -> Result<()> {
        let mut profiles = BTreeMap::new();
        for profile in parse_definitions("built-in profiles", &self.builtin)? {
            profiles.insert(profile.profile_id.clone(), profile);
        }

        let user = match &self.user {
            UserDefinitions::None => None,
            UserDefinitions::Inline(text) => Some(("user profiles".to_string(), text.clone())),
            UserDefinitions::File(path) if path.is_file() => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading profiles '{}'", path.display()))?;
                Some((path.display().to_string(), text))
            }
            UserDefinitions::File(_) => None,
        };
        if let Some((origin, text)) = user {
            for profile in parse_definitions(&origin, &text)? {
                if profiles.contains_key(&profile.profile_id) {
                    tracing::debug!("profile '{}' overridden by {}", profile.profile_id, origin);
                }
                profiles.insert(profile.profile_id.clone(), profile);
            }
        }

        tracing::debug!("loaded {} build profiles", profiles.len());
        self.profiles = profiles;
        Ok(())
    }

    pub fn lookup(&self, profile_id: &str) -> Result<&BuildProfile> {
        self.profiles
            .get(profile_id)
            .ok_or_else(|| Error::ProfileNotFound {
                profile: profile_id.to_string(),
            })
    }

    /// Every loaded profile, sorted by id.
    pub fn available(&self) -> impl Iterator<Item = &BuildProfile> {
        self.profiles.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    const USER: &str = r#"{
        "ubuntu-trusty": {"docker_image": "registry.local/trusty", "script": "custom.sh", "insecure_registry": "true"},
        "alpine": {"docker_image": "alpine:3", "script": "alpine.sh"}
    }"#;

    #[test]
    fn test_builtin_profiles_load() {
        let registry = ProfileRegistry::load(BUILTIN_PROFILES, None).unwrap();

        let trusty = registry.lookup("ubuntu-trusty").unwrap();
        assert_eq!(trusty.script, "debian.sh");
        assert!(!trusty.insecure_registry);
        assert!(registry.lookup("centos7").is_ok());
    }

    #[test]
    fn test_user_definitions_override_builtin() {
        let registry = ProfileRegistry::load(BUILTIN_PROFILES, Some(USER)).unwrap();

        assert_eq!(
            registry.lookup("ubuntu-trusty").unwrap(),
            &BuildProfile {
                profile_id: "ubuntu-trusty".to_string(),
                docker_image: "registry.local/trusty".to_string(),
                script: "custom.sh".to_string(),
                insecure_registry: true,
            }
        );
        assert_eq!(registry.lookup("alpine").unwrap().docker_image, "alpine:3");
        assert!(registry.lookup("centos7").is_ok());
    }

    #[test]
    fn test_unknown_profile_fails_on_lookup() {
        let registry = ProfileRegistry::load(BUILTIN_PROFILES, None).unwrap();
        let err = registry.lookup("plan9").unwrap_err();
        assert!(matches!(err, Error::ProfileNotFound { profile } if profile == "plan9"));
    }

    #[test]
    fn test_missing_required_attribute_rejected() {
        let err = parse_definitions("test", r#"{"x": {"docker_image": "img"}}"#).unwrap_err();
        assert!(matches!(err, Error::ProfileDefinition { .. }));

        let err = parse_definitions(
            "test",
            r#"{"x": {"docker_image": "img", "script": "s.sh", "colour": "red"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ProfileDefinition { .. }));
    }

    #[test]
    fn test_boolean_insecure_flag_accepted() {
        let profiles = parse_definitions(
            "test",
            r#"{"x": {"docker_image": "img", "script": "s.sh", "insecure_registry": true}}"#,
        )
        .unwrap();
        assert!(profiles[0].insecure_registry);
    }

    #[test]
    fn test_refresh_picks_up_local_file() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::rooted_at(temp.path(), Path::new("/home/nobody"));
        let mut registry = ProfileRegistry::open(&settings).unwrap();
        assert!(registry.lookup("alpine").is_err());

        fs::create_dir_all(&settings.profiles_dir).unwrap();
        fs::write(settings.local_profiles_file(), USER).unwrap();
        registry.refresh().unwrap();

        assert!(registry.lookup("alpine").is_ok());
        assert!(registry.lookup("ubuntu-trusty").unwrap().insecure_registry);
    }

    #[test]
    fn test_available_sorted_by_id() {
        let registry = ProfileRegistry::load(BUILTIN_PROFILES, None).unwrap();
        let ids: Vec<_> = registry.available().map(|p| p.profile_id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), 4);
    }
}
