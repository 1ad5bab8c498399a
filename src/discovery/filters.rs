//! Service exclusion filters and the instance blacklist
//!
//! All checks here are pure and synchronous.

use crate::config::{BridgeConfig, RenameRule};

/// Why a service was excluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterMatch {
    /// Resolved name contains this configured substring
    Name(String),
    /// Accessory serial equals a configured exclusion
    Serial(String),
}

impl std::fmt::Display for FilterMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterMatch::Name(pattern) => write!(f, "matches accessory_filter '{pattern}'"),
            FilterMatch::Serial(serial) => {
                write!(f, "matches accessory_serial_filter '{serial}'")
            }
        }
    }
}

/// Name-substring and serial-number exclusions plus rename rules
#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    name_substrings: Vec<String>,
    serials: Vec<String>,
    renames: Vec<RenameRule>,
}

impl ServiceFilter {
    pub fn new(
        name_substrings: Vec<String>,
        serials: Vec<String>,
        renames: Vec<RenameRule>,
    ) -> Self {
        Self {
            name_substrings,
            serials,
            renames,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            config.accessory_filter.clone(),
            config.accessory_serial_filter.clone(),
            config.device_name_map.clone(),
        )
    }

    /// Apply the first rename rule whose `replace` equals the name exactly
    pub fn rename(&self, name: String) -> String {
        match self.renames.iter().find(|rule| rule.replace == name) {
            Some(rule) => rule.with.clone(),
            None => name,
        }
    }

    /// Check a resolved name and optional serial against the exclusions
    pub fn excludes(&self, name: &str, serial: Option<&str>) -> Option<FilterMatch> {
        if let Some(pattern) = self
            .name_substrings
            .iter()
            .find(|pattern| !pattern.is_empty() && name.contains(pattern.as_str()))
        {
            return Some(FilterMatch::Name(pattern.clone()));
        }

        let serial = serial?;
        self.serials
            .iter()
            .find(|s| s.as_str() == serial)
            .map(|s| FilterMatch::Serial(s.clone()))
    }
}

/// Instance identities that are never parsed.
///
/// Matching is case-insensitive. Entries are only ever added; removal takes a
/// configuration change and a restart.
#[derive(Debug, Clone, Default)]
pub struct InstanceBlacklist {
    entries: Vec<String>,
}

impl InstanceBlacklist {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut blacklist = Self::default();
        for entry in entries {
            blacklist.add(entry);
        }
        blacklist
    }

    pub fn contains(&self, username: &str) -> bool {
        self.entries.iter().any(|e| e.eq_ignore_ascii_case(username))
    }

    /// Add an identity; returns false when it was already present
    pub fn add<S: Into<String>>(&mut self, username: S) -> bool {
        let username = username.into();
        if self.contains(&username) {
            return false;
        }
        self.entries.push(username);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn filter() -> ServiceFilter {
        ServiceFilter::new(
            vec!["Camera".to_string()],
            vec!["SN-42".to_string()],
            vec![RenameRule {
                replace: "TV".to_string(),
                with: "Living Room TV".to_string(),
            }],
        )
    }

    #[rstest]
    #[case("Front Camera", None, Some(FilterMatch::Name("Camera".to_string())))]
    #[case("Camera", Some("SN-42"), Some(FilterMatch::Name("Camera".to_string())))]
    #[case("Lamp", Some("SN-42"), Some(FilterMatch::Serial("SN-42".to_string())))]
    #[case("Lamp", Some("SN-421"), None)]
    #[case("front camera", None, None)]
    #[case("Lamp", None, None)]
    fn test_excludes(
        #[case] name: &str,
        #[case] serial: Option<&str>,
        #[case] expected: Option<FilterMatch>,
    ) {
        assert_eq!(filter().excludes(name, serial), expected);
    }

    #[test]
    fn test_rename_is_exact() {
        let filter = filter();
        assert_eq!(filter.rename("TV".to_string()), "Living Room TV");
        assert_eq!(filter.rename("TV 2".to_string()), "TV 2");
    }

    #[test]
    fn test_blacklist_is_case_insensitive_and_append_only() {
        let mut blacklist = InstanceBlacklist::new(["0E:3C:22:18:9F:3A"]);
        assert!(blacklist.contains("0e:3c:22:18:9f:3a"));
        assert!(!blacklist.add("0e:3c:22:18:9f:3a"));
        assert!(blacklist.add("AA:BB"));
        assert_eq!(blacklist.len(), 2);
    }
}
