//! Result aggregation across backends
//!
//! Two dispatch policies exist and both are needed:
//! - fail-fast: stop at the first failing backend (`load_state`, `reconfig`)
//! - best-effort: call every backend, keep the worst error (everything else)
//!
//! Polling entry points reduce [`StageStatus`] by minimum instead.

use super::registry::PluginDescriptor;
use crate::domain::ports::StageStatus;
use crate::error::Result;
use tracing::warn;

/// Keep whichever of two outcomes is worse.
/// Errors compare by code; on a tie the earlier error wins.
pub fn worst(acc: Result<()>, next: Result<()>) -> Result<()> {
    match (acc, next) {
        (Ok(()), next) => next,
        (Err(a), Ok(())) => Err(a),
        (Err(a), Err(b)) => {
            if b.code() > a.code() {
                Err(b)
            } else {
                Err(a)
            }
        }
    }
}

/// Call backends in order until one fails
pub fn invoke_fail_fast<F>(plugins: &mut [PluginDescriptor], operation: &str, mut call: F) -> Result<()>
where
    F: FnMut(&mut PluginDescriptor) -> Result<()>,
{
    for desc in plugins.iter_mut() {
        if let Err(e) = call(desc) {
            warn!(plugin = desc.name(), operation, error = %e, "Burst buffer backend failed");
            return Err(e);
        }
    }
    Ok(())
}

/// Call every backend, starting from `initial`, and keep the worst outcome
pub fn invoke_best_effort<F>(
    plugins: &mut [PluginDescriptor],
    operation: &str,
    initial: Result<()>,
    mut call: F,
) -> Result<()>
where
    F: FnMut(&mut PluginDescriptor) -> Result<()>,
{
    plugins.iter_mut().fold(initial, |acc, desc| {
        let rc = call(desc);
        if let Err(e) = &rc {
            warn!(plugin = desc.name(), operation, error = %e, "Burst buffer backend failed");
        }
        worst(acc, rc)
    })
}

/// Poll every backend, starting from `initial`, and keep the minimum status
pub fn poll_all<F>(plugins: &mut [PluginDescriptor], initial: StageStatus, mut call: F) -> StageStatus
where
    F: FnMut(&mut PluginDescriptor) -> StageStatus,
{
    plugins
        .iter_mut()
        .fold(initial, |acc, desc| acc.min(call(desc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;

    fn err(code: u32) -> Result<()> {
        Err(Error::backend("b", "op", code, format!("code {}", code)))
    }

    #[test]
    fn test_worst_prefers_higher_code() {
        assert!(worst(Ok(()), Ok(())).is_ok());
        assert_matches!(worst(Ok(()), err(5)), Err(e) if e.code() == 5);
        assert_matches!(worst(err(5), Ok(())), Err(e) if e.code() == 5);
        assert_matches!(worst(err(5), err(9)), Err(e) if e.code() == 9);
        assert_matches!(worst(err(9), err(5)), Err(e) if e.code() == 9);
    }

    #[test]
    fn test_worst_keeps_first_on_tie() {
        let first = Err(Error::backend("first", "op", 7, "a"));
        let second = Err(Error::backend("second", "op", 7, "b"));
        assert_matches!(
            worst(first, second),
            Err(Error::Backend { ref backend, .. }) if backend == "first"
        );
    }
}
