//! Metadata concepts every terminology store is bootstrapped with.
//!
//! Each constant pairs a fixed UUID with a reserved nid. [METADATA] indexes them by uuid, nid and
//! name so that configuration files and diagnostics can refer to metadata by name.

use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::identifier::Nid;

/// Global registry of the built-in metadata concepts.
pub static METADATA: Lazy<MetadataRegistry> = Lazy::new(MetadataRegistry::create);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConceptSpec {
    pub name: &'static str,
    pub uuid: Uuid,
    pub nid: Nid,
}

impl ConceptSpec {
    const fn new(name: &'static str, uuid: u128, nid: i32) -> Self {
        ConceptSpec {
            name,
            uuid: Uuid::from_u128(uuid),
            nid: Nid::new(nid),
        }
    }
}

impl AsRef<Nid> for ConceptSpec {
    fn as_ref(&self) -> &Nid {
        &self.nid
    }
}

impl From<ConceptSpec> for Nid {
    fn from(spec: ConceptSpec) -> Nid {
        spec.nid
    }
}

pub const UNINITIALIZED_COMPONENT: ConceptSpec =
    ConceptSpec::new("Uninitialized component", 0x55f74246_0a25_57ac_9473_a788d08fb656, 0);
pub const ROOT_CONCEPT: ConceptSpec =
    ConceptSpec::new("Root concept", 0x7c21b6c5_cf11_5af9_893b_743f004c97f5, 1);

// Paths
pub const PRIMORDIAL_PATH: ConceptSpec =
    ConceptSpec::new("Primordial path", 0xe95f3ce3_d5a2_5f8c_9a9c_6b3c0ea2a0e1, 2);
pub const MASTER_PATH: ConceptSpec =
    ConceptSpec::new("Master path", 0x2faa9260_8fb2_11db_b606_0800200c9a66, 3);
pub const DEVELOPMENT_PATH: ConceptSpec =
    ConceptSpec::new("Development path", 0x1f200ca6_960e_11e5_8994_feff819cdc9f, 4);
pub const SANDBOX_PATH: ConceptSpec =
    ConceptSpec::new("Sandbox path", 0x80710ea6_983c_5fa0_8908_e479f1f03ea9, 5);

// Authors
pub const USER: ConceptSpec = ConceptSpec::new("User", 0xf7495b58_6630_3499_a44e_2052b5fcf06c, 6);
pub const CLASSIFIER_USER: ConceptSpec =
    ConceptSpec::new("Classifier user", 0x4e1a06b8_8a5f_5fcd_9d12_34d95e6b2f32, 7);

// Modules
pub const PRIMORDIAL_MODULE: ConceptSpec =
    ConceptSpec::new("Primordial module", 0xc2012321_3903_532e_8a5f_b13e4ca46e86, 8);
pub const CORE_MODULE: ConceptSpec =
    ConceptSpec::new("Core module", 0xf680c868_f7e5_5d0e_91f2_615eca8f8fd2, 9);
pub const US_EXTENSION_MODULE: ConceptSpec =
    ConceptSpec::new("US extension module", 0x1c2d6a29_0a4b_5b7b_a0f2_0a4d8e8c3d11, 10);

// Languages and dialects
pub const LANGUAGE: ConceptSpec =
    ConceptSpec::new("Language", 0xf56fa231_10f9_5e7f_a86d_a1d61b5b56e3, 11);
pub const ENGLISH_LANGUAGE: ConceptSpec =
    ConceptSpec::new("English language", 0x06d905ea_c647_3af9_bfe5_2514e135b558, 12);
pub const SPANISH_LANGUAGE: ConceptSpec =
    ConceptSpec::new("Spanish language", 0x0fcf44fb_d0a7_3a67_bc9f_eb3065ed3c8e, 13);
pub const US_DIALECT_ASSEMBLAGE: ConceptSpec =
    ConceptSpec::new("US English dialect", 0xbca0a686_3516_3daf_8fcf_fe396d13cfad, 14);
pub const GB_DIALECT_ASSEMBLAGE: ConceptSpec =
    ConceptSpec::new("GB English dialect", 0xeb9a5e42_3cba_356d_b623_3ed472e20b30, 15);
pub const SPANISH_DIALECT_ASSEMBLAGE: ConceptSpec =
    ConceptSpec::new("Spanish dialect", 0x03615ef2_aa56_336d_89c5_a1b5c4cee8f6, 16);

// Description types and acceptabilities
pub const FULLY_QUALIFIED_NAME_DESCRIPTION_TYPE: ConceptSpec = ConceptSpec::new(
    "Fully qualified name description type",
    0x00791270_77c9_32b6_b34f_d932569bd2bf,
    17,
);
pub const REGULAR_NAME_DESCRIPTION_TYPE: ConceptSpec = ConceptSpec::new(
    "Regular name description type",
    0x8bfba944_3965_3946_9bcb_1e80a5da63a2,
    18,
);
pub const DEFINITION_DESCRIPTION_TYPE: ConceptSpec = ConceptSpec::new(
    "Definition description type",
    0x700546a3_09c7_3fc2_9eb9_53d318659a09,
    19,
);
pub const PREFERRED: ConceptSpec =
    ConceptSpec::new("Preferred", 0x266f1bc3_3361_39f3_bffe_69db9daea56e, 20);
pub const ACCEPTABLE: ConceptSpec =
    ConceptSpec::new("Acceptable", 0x12b9e103_060e_3256_9982_18c1191af60e, 21);
pub const ENGLISH_DESCRIPTION_ASSEMBLAGE: ConceptSpec = ConceptSpec::new(
    "English description assemblage",
    0x45021920_9567_11e5_8994_feff819cdc9f,
    22,
);
pub const SPANISH_DESCRIPTION_ASSEMBLAGE: ConceptSpec = ConceptSpec::new(
    "Spanish description assemblage",
    0x45021c36_9567_11e5_8994_feff819cdc9f,
    23,
);

// Logic
pub const EL_PLUS_PLUS_STATED_ASSEMBLAGE: ConceptSpec = ConceptSpec::new(
    "EL++ stated form assemblage",
    0xe7f21b6d_ac53_5bc0_8ca1_98b3b0a8ba75,
    24,
);
pub const EL_PLUS_PLUS_INFERRED_ASSEMBLAGE: ConceptSpec = ConceptSpec::new(
    "EL++ inferred form assemblage",
    0x1f20182c_a0c6_5a5a_8a4e_2ecb5e5e5f2b,
    25,
);
pub const EL_PLUS_PLUS_PROFILE: ConceptSpec =
    ConceptSpec::new("EL++ profile", 0x1f201e12_960e_11e5_8994_feff819cdc9f, 26);
pub const STRUCTURAL_CLASSIFIER: ConceptSpec =
    ConceptSpec::new("Structural classifier", 0x1f201fac_960e_11e5_8994_feff819cdc9f, 27);
pub const IS_A: ConceptSpec = ConceptSpec::new("Is a", 0x46bccdc4_8fb6_11db_b606_0800200c9a66, 28);
pub const ROLE_GROUP: ConceptSpec =
    ConceptSpec::new("Role group", 0x051fbfed_3c40_3130_8c09_889cb7b7b5b6, 29);
pub const CONCEPT_ASSEMBLAGE: ConceptSpec =
    ConceptSpec::new("Concept assemblage", 0xd39b3ecd_9a80_5009_a8ac_0b947f95ca7c, 30);

// Alternate identifiers
pub const SCTID_ASSEMBLAGE: ConceptSpec =
    ConceptSpec::new("SNOMED CT identifier", 0x0418a591_f75b_39ad_be2c_3ab849326da9, 31);
pub const VUID_ASSEMBLAGE: ConceptSpec =
    ConceptSpec::new("VHA unique identifier", 0xad0c19e8_2ba6_5f9f_8a5e_6c3ad6e7e0ad, 32);

const ALL_METADATA: &[ConceptSpec] = &[
    UNINITIALIZED_COMPONENT,
    ROOT_CONCEPT,
    PRIMORDIAL_PATH,
    MASTER_PATH,
    DEVELOPMENT_PATH,
    SANDBOX_PATH,
    USER,
    CLASSIFIER_USER,
    PRIMORDIAL_MODULE,
    CORE_MODULE,
    US_EXTENSION_MODULE,
    LANGUAGE,
    ENGLISH_LANGUAGE,
    SPANISH_LANGUAGE,
    US_DIALECT_ASSEMBLAGE,
    GB_DIALECT_ASSEMBLAGE,
    SPANISH_DIALECT_ASSEMBLAGE,
    FULLY_QUALIFIED_NAME_DESCRIPTION_TYPE,
    REGULAR_NAME_DESCRIPTION_TYPE,
    DEFINITION_DESCRIPTION_TYPE,
    PREFERRED,
    ACCEPTABLE,
    ENGLISH_DESCRIPTION_ASSEMBLAGE,
    SPANISH_DESCRIPTION_ASSEMBLAGE,
    EL_PLUS_PLUS_STATED_ASSEMBLAGE,
    EL_PLUS_PLUS_INFERRED_ASSEMBLAGE,
    EL_PLUS_PLUS_PROFILE,
    STRUCTURAL_CLASSIFIER,
    IS_A,
    ROLE_GROUP,
    CONCEPT_ASSEMBLAGE,
    SCTID_ASSEMBLAGE,
    VUID_ASSEMBLAGE,
];

/// Lookup tables over the built-in metadata concepts.
pub struct MetadataRegistry {
    by_uuid: HashMap<Uuid, ConceptSpec>,
    by_nid: BTreeMap<Nid, ConceptSpec>,
    by_name: HashMap<String, ConceptSpec>,
}

impl MetadataRegistry {
    pub fn create() -> Self {
        let mut registry = MetadataRegistry {
            by_uuid: HashMap::new(),
            by_nid: BTreeMap::new(),
            by_name: HashMap::new(),
        };
        for spec in ALL_METADATA {
            registry.by_uuid.insert(spec.uuid, *spec);
            registry.by_nid.insert(spec.nid, *spec);
            registry.by_name.insert(spec.name.to_lowercase(), *spec);
        }
        registry
    }

    pub fn all(&self) -> impl Iterator<Item = &ConceptSpec> {
        self.by_nid.values()
    }

    pub fn get_by_uuid(&self, uuid: &Uuid) -> Option<ConceptSpec> {
        self.by_uuid.get(uuid).copied()
    }

    pub fn get_by_nid(&self, nid: Nid) -> Option<ConceptSpec> {
        self.by_nid.get(&nid).copied()
    }

    /// Case-insensitive lookup by name.
    pub fn get_by_name(&self, name: &str) -> Option<ConceptSpec> {
        self.by_name.get(&name.trim().to_lowercase()).copied()
    }

    /// Human readable name for diagnostics; falls back to the raw nid.
    pub fn name_of(&self, nid: Nid) -> String {
        self.get_by_nid(nid)
            .map(|spec| spec.name.to_string())
            .unwrap_or_else(|| format!("<{nid}>"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_registry_is_consistent() {
        let nids: BTreeSet<_> = ALL_METADATA.iter().map(|s| s.nid).collect();
        let uuids: BTreeSet<_> = ALL_METADATA.iter().map(|s| s.uuid).collect();
        assert_eq!(nids.len(), ALL_METADATA.len(), "metadata nids must be unique");
        assert_eq!(uuids.len(), ALL_METADATA.len(), "metadata uuids must be unique");
        assert!(nids
            .iter()
            .all(|nid| nid.value() < crate::identifier::FIRST_DYNAMIC_NID));
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(
            METADATA.get_by_name("development PATH").map(|s| s.nid),
            Some(DEVELOPMENT_PATH.nid)
        );
        assert_eq!(METADATA.name_of(IS_A.nid), "Is a");
        assert_eq!(METADATA.name_of(Nid::new(123_456)), "<123456>");
    }
}
