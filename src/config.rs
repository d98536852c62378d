use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};

use crate::{
    coordinate::{
        EditCoordinate, LanguageCoordinate, LogicCoordinate, ManifoldCoordinate, Premise,
        StampFilter,
    },
    error::KometError,
    identifier::Nid,
    metadata::METADATA,
    stamp::{StampPosition, StatusSet},
};

/// Defaults for a [crate::context::KometContext]. Concepts are named by their metadata names,
/// matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KometConfig {
    pub path: String,
    /// Empty admits every module.
    pub modules: Vec<String>,
    pub module_priority: Vec<String>,
    pub active_only: bool,
    pub language: String,
    pub dialects: Vec<String>,
    pub description_types: Vec<String>,
    pub premise: Premise,
    pub author: String,
    pub default_module: String,
    /// Bound on the coordinate interner and the calculator cache; `None` leaves both unbounded.
    pub coordinate_cache_capacity: Option<usize>,
    pub classifier_comment: String,
}

impl Default for KometConfig {
    fn default() -> Self {
        KometConfig {
            path: "Development path".to_string(),
            modules: Vec::new(),
            module_priority: Vec::new(),
            active_only: true,
            language: "English language".to_string(),
            dialects: vec![
                "US English dialect".to_string(),
                "GB English dialect".to_string(),
            ],
            description_types: vec![
                "Regular name description type".to_string(),
                "Fully qualified name description type".to_string(),
                "Definition description type".to_string(),
            ],
            premise: Premise::Inferred,
            author: "User".to_string(),
            default_module: "Core module".to_string(),
            coordinate_cache_capacity: Some(256),
            classifier_comment: "Classifier results".to_string(),
        }
    }
}

fn resolve(name: &str) -> Result<Nid, KometError> {
    METADATA
        .get_by_name(name)
        .map(|spec| spec.nid)
        .ok_or_else(|| KometError::Configuration(format!("Unknown concept name '{name}'")))
}

fn resolve_all(names: &[String]) -> Result<Vec<Nid>, KometError> {
    names.iter().map(|name| resolve(name)).collect()
}

impl KometConfig {
    pub fn from_toml(content: &str) -> Result<Self, KometError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, KometError> {
        Ok(toml::to_string(self)?)
    }

    pub fn stamp_filter(&self) -> Result<StampFilter, KometError> {
        let states = if self.active_only {
            StatusSet::active_only()
        } else {
            StatusSet::active_and_inactive()
        };
        StampFilter::new(
            states,
            StampPosition::latest(resolve(&self.path)?),
            resolve_all(&self.modules)?.into_iter().collect(),
            BTreeSet::new(),
            resolve_all(&self.module_priority)?,
        )
    }

    pub fn language_coordinate(&self) -> Result<LanguageCoordinate, KometError> {
        LanguageCoordinate::new(
            resolve(&self.language)?,
            resolve_all(&self.dialects)?,
            resolve_all(&self.description_types)?,
            Vec::new(),
            None,
        )
    }

    pub fn edit_coordinate(&self) -> Result<EditCoordinate, KometError> {
        let module = resolve(&self.default_module)?;
        Ok(EditCoordinate::new(
            resolve(&self.author)?,
            module,
            module,
            resolve(&self.path)?,
        ))
    }

    /// The manifold these settings describe. Unknown names are configuration errors.
    pub fn default_manifold(&self) -> Result<ManifoldCoordinate, KometError> {
        Ok(ManifoldCoordinate::new(
            self.stamp_filter()?,
            self.language_coordinate()?,
            self.premise,
            LogicCoordinate::el_plus_plus(),
            self.edit_coordinate()?,
        ))
    }
}

pub trait ConfigProvider: Send + Sync {
    fn load(&self) -> Result<KometConfig, KometError>;
    fn store(&self, config: &KometConfig) -> Result<(), KometError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn load(&self) -> Result<KometConfig, KometError> {
        tracing::debug!("Attempting to read config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(KometConfig::default());
        }
        KometConfig::from_toml(&read_to_string(&self.path)?)
    }

    fn store(&self, config: &KometConfig) -> Result<(), KometError> {
        tracing::debug!("Attempting to write config to: {:?}", &self.path);
        write(&self.path, config.to_toml()?)?;
        Ok(())
    }
}
