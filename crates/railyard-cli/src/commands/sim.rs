//! Scenario listing: the end-to-end gated-pipeline scenarios the test
//! suite exercises.
//!
//! The scenarios themselves are deterministic, wall-clock-free
//! `railyard-sim` tests driven through `Harness` rather than a
//! standalone runner this binary launches — there is no executor
//! fleet or review-system network to simulate timing against. This
//! command is a pointer at them.

const SCENARIOS: &[(&str, &str)] = &[
    ("S1", "Simple check: one job runs to SUCCESS, one report"),
    ("S2", "Require-approval newer-than-24h gates enqueue"),
    ("S3", "Cross-repo Depends-On cycle enqueues and merges as one bundle"),
    ("S4", "Gate reset: a predecessor failure cancels and re-freezes later items"),
    ("S5", "Supercedent pipeline cancels an older live item on re-trigger"),
    ("S6", "Replica failover: a successor recovers a lost build and node request"),
];

pub fn list() {
    println!("End-to-end scenarios:");
    println!();
    for (id, description) in SCENARIOS {
        println!("  {id}  {description}");
    }
    println!();
    println!("Run them with: cargo test -p railyard-sim");
}
