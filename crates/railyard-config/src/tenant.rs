use std::path::Path;

use railyard_types::{Tenant, TenantId};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pipeline::PipelineConfig;

/// A tenant as it appears in a fully-parsed layout: a name, a stable
/// id, and its configured pipelines. Project and access-rule layout is
/// out of this crate's scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    pub id: u64,
    pub name: String,
    pub pipelines: Vec<PipelineConfig>,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self { id: 0, name: String::new(), pipelines: Vec::new() }
    }
}

impl TenantConfig {
    #[must_use]
    pub fn to_tenant(&self) -> Tenant {
        Tenant {
            id: TenantId::new(self.id),
            name: self.name.clone(),
            pipelines: self.pipelines.iter().map(PipelineConfig::to_pipeline).collect(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("tenant name must not be empty".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for pipeline in &self.pipelines {
            if pipeline.name.is_empty() {
                return Err(ConfigError::Invalid(format!("tenant {} has a pipeline with no name", self.name)));
            }
            if !seen.insert(pipeline.name.clone()) {
                return Err(ConfigError::Invalid(format!("tenant {} declares pipeline {} twice", self.name, pipeline.name)));
            }
        }
        Ok(())
    }
}

/// The top-level layout document: every tenant this scheduler serves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub tenants: Vec<TenantConfig>,
}

impl Layout {
    /// Parses an already-materialized TOML layout document. A real
    /// deployment's layouts are YAML assembled from per-project config
    /// files by a separate engine; this loads the *already-parsed*
    /// shape that engine would hand the pipeline manager, in the
    /// plain TOML form this crate commits to.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let layout: Layout = toml::from_str(raw).map_err(|source| ConfigError::Parse { path: "<in-memory>".into(), source: Box::new(source) })?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let layout: Layout =
            toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source: Box::new(source) })?;
        layout.validate()?;
        Ok(layout)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::BTreeSet::new();
        for tenant in &self.tenants {
            tenant.validate()?;
            if !seen.insert(tenant.name.clone()) {
                return Err(ConfigError::Invalid(format!("tenant {} declared twice", tenant.name)));
            }
        }
        Ok(())
    }
}
