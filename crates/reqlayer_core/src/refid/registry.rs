//! Process-wide family registry.
//!
//! # Responsibility
//! - Resolve prefixes and tags to immutable `Family` descriptions.
//! - Reject inconsistent family sets at construction time.
//!
//! # Invariants
//! - The global registry is built once from the builtin families, passes
//!   the same validation as any other set, and is never mutated.
//! - Prefixes, coordination keys and counter names are unique.

use crate::model::family::{Family, FamilyTag, BUILTIN_FAMILIES};
use crate::refid::{AllocError, AllocResult};
use once_cell::sync::Lazy;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

const PREFIX_MIN_LEN: usize = 2;
const PREFIX_MAX_LEN: usize = 6;

static GLOBAL_REGISTRY: Lazy<FamilyRegistry> = Lazy::new(|| {
    FamilyRegistry::new(BUILTIN_FAMILIES.to_vec()).expect("builtin families are valid")
});

/// Family set validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidPrefix(String),
    DuplicatePrefix(String),
    DuplicateCoordKey(i64),
    DuplicateCounterName(String),
    DuplicateTag(FamilyTag),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPrefix(prefix) => write!(
                f,
                "family prefix `{prefix}` must be {PREFIX_MIN_LEN}-{PREFIX_MAX_LEN} upper-case ASCII letters"
            ),
            Self::DuplicatePrefix(prefix) => write!(f, "family prefix registered twice: {prefix}"),
            Self::DuplicateCoordKey(key) => {
                write!(f, "coordination key registered twice: {key}")
            }
            Self::DuplicateCounterName(name) => {
                write!(f, "counter name registered twice: {name}")
            }
            Self::DuplicateTag(tag) => write!(f, "family tag registered twice: {tag:?}"),
        }
    }
}

impl Error for RegistryError {}

/// Immutable lookup table of entity families.
#[derive(Debug, Clone)]
pub struct FamilyRegistry {
    families: Vec<Family>,
}

impl FamilyRegistry {
    /// Builds a validated registry from an explicit family set.
    ///
    /// Allocators always resolve through `global()`, so this stays internal.
    pub(crate) fn new(families: Vec<Family>) -> Result<Self, RegistryError> {
        let mut prefixes = BTreeSet::new();
        let mut coord_keys = BTreeSet::new();
        let mut counter_names = BTreeSet::new();
        let mut tags = BTreeSet::new();

        for family in &families {
            if !is_valid_prefix(family.prefix) {
                return Err(RegistryError::InvalidPrefix(family.prefix.to_string()));
            }
            if !prefixes.insert(family.prefix) {
                return Err(RegistryError::DuplicatePrefix(family.prefix.to_string()));
            }
            if !coord_keys.insert(family.coord_key) {
                return Err(RegistryError::DuplicateCoordKey(family.coord_key));
            }
            if !counter_names.insert(family.counter_name) {
                return Err(RegistryError::DuplicateCounterName(
                    family.counter_name.to_string(),
                ));
            }
            if !tags.insert(family.tag) {
                return Err(RegistryError::DuplicateTag(family.tag));
            }
        }

        Ok(Self { families })
    }

    /// Returns the registry built from `BUILTIN_FAMILIES`.
    pub fn global() -> &'static FamilyRegistry {
        &GLOBAL_REGISTRY
    }

    /// Resolves a prefix registered at init.
    ///
    /// # Errors
    /// - `AllocError::UnknownFamily` for any other prefix.
    pub fn resolve(&self, prefix: &str) -> AllocResult<&Family> {
        self.families
            .iter()
            .find(|family| family.prefix == prefix)
            .ok_or_else(|| AllocError::UnknownFamily(prefix.to_string()))
    }

    /// Resolves a tag.
    ///
    /// # Errors
    /// - `AllocError::UnknownFamily` when a custom registry omits the tag.
    pub fn family(&self, tag: FamilyTag) -> AllocResult<&Family> {
        self.families
            .iter()
            .find(|family| family.tag == tag)
            .ok_or_else(|| AllocError::UnknownFamily(tag.prefix().to_string()))
    }

    pub fn families(&self) -> &[Family] {
        &self.families
    }
}

fn is_valid_prefix(prefix: &str) -> bool {
    (PREFIX_MIN_LEN..=PREFIX_MAX_LEN).contains(&prefix.len())
        && prefix.bytes().all(|byte| byte.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::{FamilyRegistry, RegistryError};
    use crate::model::family::{Family, FamilyTag, BUILTIN_FAMILIES};
    use crate::refid::AllocError;

    #[test]
    fn builtin_families_pass_validation() {
        let registry = FamilyRegistry::new(BUILTIN_FAMILIES.to_vec()).unwrap();
        assert_eq!(registry.families().len(), 6);
        assert_eq!(
            FamilyRegistry::global().families(),
            registry.families()
        );
    }

    #[test]
    fn global_resolves_every_builtin_prefix() {
        let registry = FamilyRegistry::global();
        for tag in FamilyTag::ALL {
            let family = registry.resolve(tag.prefix()).unwrap();
            assert_eq!(family.tag, tag);
            assert_eq!(registry.family(tag).unwrap().coord_key, family.coord_key);
        }
    }

    #[test]
    fn unknown_prefix_is_rejected() {
        let err = FamilyRegistry::global().resolve("XYZ").unwrap_err();
        assert!(matches!(err, AllocError::UnknownFamily(prefix) if prefix == "XYZ"));
    }

    #[test]
    fn duplicate_coord_key_is_rejected() {
        let mut families = BUILTIN_FAMILIES.to_vec();
        families[1] = Family {
            coord_key: families[0].coord_key,
            ..families[1]
        };
        assert_eq!(
            FamilyRegistry::new(families).unwrap_err(),
            RegistryError::DuplicateCoordKey(BUILTIN_FAMILIES[0].coord_key)
        );
    }

    #[test]
    fn lowercase_prefix_is_rejected() {
        let mut families = BUILTIN_FAMILIES.to_vec();
        families[0] = Family {
            prefix: "ep",
            ..families[0]
        };
        assert!(matches!(
            FamilyRegistry::new(families),
            Err(RegistryError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn registry_without_tag_reports_unknown_family() {
        let registry = FamilyRegistry::new(BUILTIN_FAMILIES[..1].to_vec()).unwrap();
        assert!(matches!(
            registry.family(FamilyTag::Prompt),
            Err(AllocError::UnknownFamily(prefix)) if prefix == "PROMPT"
        ));
    }
}
