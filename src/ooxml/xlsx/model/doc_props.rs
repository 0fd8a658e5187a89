//! Core (`docProps/core.xml`) and extended (`docProps/app.xml`) document
//! properties.
//!
//! Dates are kept as the W3CDTF text found in the part.

use chrono::{SecondsFormat, Utc};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreProperties {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub keywords: Option<String>,
    pub description: Option<String>,
    pub last_modified_by: Option<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub category: Option<String>,
    pub revision: Option<String>,
    pub content_status: Option<String>,
    pub identifier: Option<String>,
    pub language: Option<String>,
    pub last_printed: Option<String>,
    pub version: Option<String>,
}

impl CoreProperties {
    /// Properties of a package created from scratch.
    pub fn for_new_package() -> Self {
        let now = w3cdtf_now();
        Self {
            creator: Some("longan".to_string()),
            created: Some(now.clone()),
            modified: Some(now),
            ..Self::default()
        }
    }

    /// Stamp `modified` with the current time.
    pub fn touch(&mut self) {
        self.modified = Some(w3cdtf_now());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppProperties {
    pub application: Option<String>,
    pub app_version: Option<String>,
    pub company: Option<String>,
    pub manager: Option<String>,
    pub doc_security: Option<u32>,
    pub hyperlinks_changed: Option<bool>,
    pub shared_doc: Option<bool>,
    /// Worksheet titles, as listed in `TitlesOfParts`.
    pub titles: Vec<String>,
}

impl AppProperties {
    pub fn for_new_package() -> Self {
        Self {
            application: Some("Microsoft Excel".to_string()),
            doc_security: Some(0),
            hyperlinks_changed: Some(false),
            shared_doc: Some(false),
            ..Self::default()
        }
    }
}

/// Both property parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocProps {
    pub core: CoreProperties,
    pub app: AppProperties,
}

/// Current UTC time as `2024-01-15T10:30:00Z`.
pub fn w3cdtf_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_package_dates() {
        let core = CoreProperties::for_new_package();
        let created = core.created.as_deref().unwrap();
        assert!(created.ends_with('Z'));
        assert_eq!(created.len(), 20);
        assert_eq!(core.created, core.modified);
    }
}
