use std::collections::BTreeMap;

use railyard_types::Precedence;

/// What the pure advance/apply functions ask the runtime to do. The
/// kernel never performs I/O itself; `railyard-manager` executes
/// these against `railyard-dispatch` and `railyard-reporter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Submit a node request for `job_name`.
    RequestNodes {
        job_name: String,
        nodeset: Vec<String>,
        precedence: Precedence,
    },
    /// Cancel an outstanding node request, e.g. as part of a
    /// speculative reset.
    CancelNodeRequest { job_name: String, request_id: String },
    /// Submit a build to the executor queue once a job's nodes are
    /// ready.
    SubmitBuild {
        job_name: String,
        zone: Option<String>,
        variables: BTreeMap<String, String>,
    },
    /// Abort an in-flight build, e.g. as part of a speculative reset.
    AbortBuild { job_name: String, build_id: String },
    /// All jobs reached a terminal state; invoke the configured
    /// reporters with the computed item result.
    Report { result: ItemResult },
    /// The item succeeded in a gated pipeline: attempt the upstream
    /// merge.
    AttemptMerge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemResult {
    Success,
    Failure,
}
