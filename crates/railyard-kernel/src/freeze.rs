use std::collections::BTreeMap;

use railyard_types::{BuildSet, Job};

/// A job as configured for a pipeline, before it is frozen into a
/// [`BuildSet`] for a specific [`railyard_types::QueueItem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,
    pub nodeset: Vec<String>,
    pub variables: BTreeMap<String, String>,
    pub depends_on: Vec<String>,
    pub executor_zone: Option<String>,
}

impl JobSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, nodeset: Vec<String>) -> Self {
        Self {
            name: name.into(),
            nodeset,
            variables: BTreeMap::new(),
            depends_on: Vec::new(),
            executor_zone: None,
        }
    }

    #[must_use]
    pub fn depends_on(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = names.into_iter().map(Into::into).collect();
        self
    }

    fn to_waiting_job(&self) -> Job {
        let mut job = Job::new(self.name.clone(), self.nodeset.clone());
        job.variables = self.variables.clone();
        job.depends_on = self.depends_on.clone();
        job.executor_zone = self.executor_zone.clone();
        job
    }
}

/// Computes the job graph for a queue item given its speculative
/// position in the queue: currently this is the pipeline's configured
/// job specs as-is (speculation lives in the predecessor-success
/// assumption, not in which jobs are selected). Freezing discards any
/// prior build state, so it must only be called once per item (guarded
/// by `BuildSet::frozen`) or during a speculative reset.
#[must_use]
pub fn freeze_build_set(specs: &[JobSpec]) -> BuildSet {
    BuildSet::frozen_with(specs.iter().map(JobSpec::to_waiting_job).collect())
}
