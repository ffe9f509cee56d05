use serde::{Deserialize, Serialize};

use crate::model::ids::LicenseTypeId;

/// A license category questions are tagged with.
///
/// Categories form a two-level tree: a parent (e.g. `B`) groups its
/// children (e.g. `B1`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseType {
    pub id: LicenseTypeId,
    pub code: String,
    pub name: String,
    pub parent_id: Option<LicenseTypeId>,
    pub is_parent: bool,
}

impl LicenseType {
    #[must_use]
    pub fn summary(&self) -> LicenseTypeSummary {
        LicenseTypeSummary {
            id: self.id,
            code: self.code.clone(),
            name: self.name.clone(),
        }
    }
}

/// Reduced license type shape embedded in view models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseTypeSummary {
    pub id: LicenseTypeId,
    pub code: String,
    pub name: String,
}

/// A license type with its direct children loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseTypeFamily {
    #[serde(flatten)]
    pub license_type: LicenseType,
    pub children: Vec<LicenseType>,
}

impl LicenseTypeFamily {
    #[must_use]
    pub fn new(license_type: LicenseType, children: Vec<LicenseType>) -> Self {
        Self {
            license_type,
            children,
        }
    }

    /// Build the family of `parent` from a flat list of license types.
    #[must_use]
    pub fn from_flat(parent: LicenseType, all: &[LicenseType]) -> Self {
        let mut children: Vec<LicenseType> = all
            .iter()
            .filter(|lt| lt.parent_id == Some(parent.id))
            .cloned()
            .collect();
        children.sort_by_key(|lt| lt.id);
        Self::new(parent, children)
    }

    #[must_use]
    pub fn id(&self) -> LicenseTypeId {
        self.license_type.id
    }

    /// Parent id first, then child ids.
    #[must_use]
    pub fn ids(&self) -> Vec<LicenseTypeId> {
        std::iter::once(self.license_type.id)
            .chain(self.children.iter().map(|c| c.id))
            .collect()
    }
}
