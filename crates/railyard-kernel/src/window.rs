use railyard_types::Window;

use crate::effects::ItemResult;

/// Applies the AIMD window adjustment: the head item's result grows
/// the window additively on success and
/// shrinks it multiplicatively on failure. Called by the manager once
/// the head item of a gated pipeline's queue reaches a terminal
/// result.
pub fn on_head_result(window: &mut Window, result: ItemResult) {
    match result {
        ItemResult::Success => window.grow(),
        ItemResult::Failure => window.shrink(),
    }
}
