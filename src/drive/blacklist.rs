//! Document types excluded from synchronization
//!
//! Neither registered as synchronization roots nor surfaced as changes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlacklistedDocumentType {
    Root,
    ManagementRoot,
    AdministrativeStatusContainer,
    AdministrativeStatus,
    UserWorkspacesRoot,
    UserProfile,
    DefaultRelation,
    TaskRoot,
    DocumentRouteModelsRoot,
    DocumentRoute,
    RouteNode,
}

impl BlacklistedDocumentType {
    pub const ALL: [BlacklistedDocumentType; 11] = [
        BlacklistedDocumentType::Root,
        BlacklistedDocumentType::ManagementRoot,
        BlacklistedDocumentType::AdministrativeStatusContainer,
        BlacklistedDocumentType::AdministrativeStatus,
        BlacklistedDocumentType::UserWorkspacesRoot,
        BlacklistedDocumentType::UserProfile,
        BlacklistedDocumentType::DefaultRelation,
        BlacklistedDocumentType::TaskRoot,
        BlacklistedDocumentType::DocumentRouteModelsRoot,
        BlacklistedDocumentType::DocumentRoute,
        BlacklistedDocumentType::RouteNode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlacklistedDocumentType::Root => "Root",
            BlacklistedDocumentType::ManagementRoot => "ManagementRoot",
            BlacklistedDocumentType::AdministrativeStatusContainer => {
                "AdministrativeStatusContainer"
            }
            BlacklistedDocumentType::AdministrativeStatus => "AdministrativeStatus",
            BlacklistedDocumentType::UserWorkspacesRoot => "UserWorkspacesRoot",
            BlacklistedDocumentType::UserProfile => "UserProfile",
            BlacklistedDocumentType::DefaultRelation => "DefaultRelation",
            BlacklistedDocumentType::TaskRoot => "TaskRoot",
            BlacklistedDocumentType::DocumentRouteModelsRoot => "DocumentRouteModelsRoot",
            BlacklistedDocumentType::DocumentRoute => "DocumentRoute",
            BlacklistedDocumentType::RouteNode => "RouteNode",
        }
    }
}

impl fmt::Display for BlacklistedDocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlacklistedDocumentType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|t| t.as_str() == s).ok_or(())
    }
}

/// Whether documents of this type are kept out of synchronization
pub fn is_blacklisted(doc_type: &str) -> bool {
    doc_type.parse::<BlacklistedDocumentType>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variant_parses_back() {
        for doc_type in BlacklistedDocumentType::ALL {
            assert_eq!(doc_type.as_str().parse(), Ok(doc_type));
        }
    }

    #[test]
    fn test_is_blacklisted() {
        assert!(is_blacklisted("UserWorkspacesRoot"));
        assert!(is_blacklisted("RouteNode"));
        assert!(!is_blacklisted("Folder"));
        assert!(!is_blacklisted("Workspace"));
        // Type names are case sensitive
        assert!(!is_blacklisted("root"));
    }
}
