use std::collections::BTreeMap;

use railyard_kernel::JobSpec;
use serde::{Deserialize, Serialize};

/// A job as it appears in a tenant's already-parsed layout. Converts
/// into the kernel's [`JobSpec`] for freezing into a `BuildSet`; the
/// layout this crate models is the *parsed* result, not a YAML engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub name: String,
    pub nodeset: Vec<String>,
    pub variables: BTreeMap<String, String>,
    pub depends_on: Vec<String>,
    pub executor_zone: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            nodeset: Vec::new(),
            variables: BTreeMap::new(),
            depends_on: Vec::new(),
            executor_zone: None,
        }
    }
}

impl JobConfig {
    #[must_use]
    pub fn to_spec(&self) -> JobSpec {
        let mut spec = JobSpec::new(self.name.clone(), self.nodeset.clone()).depends_on(self.depends_on.clone());
        spec.variables = self.variables.clone();
        spec.executor_zone = self.executor_zone.clone();
        spec
    }
}
