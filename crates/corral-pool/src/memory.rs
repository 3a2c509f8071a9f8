// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process memory probe.

use sysinfo::{ProcessesToUpdate, System};
use tracing::warn;

/// Current process RSS in MiB, or `None` if the probe fails.
///
/// A failed probe is treated as "no pressure" by the caller; the pool must
/// not refuse all work because the platform hid its process table.
pub fn current_rss_mb() -> Option<u64> {
    let pid = match sysinfo::get_current_pid() {
        Ok(pid) => pid,
        Err(e) => {
            warn!(error = %e, "memory probe: cannot determine own pid");
            return None;
        }
    };
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).map(|p| p.memory() / (1024 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_reports_own_process() {
        let rss = current_rss_mb();
        // A running test binary has a nonzero resident set.
        assert!(rss.is_some());
        assert!(rss.unwrap() > 0);
    }
}
