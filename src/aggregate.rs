//! The aggregator contract (C4).
//!
//! Ported from `cljob/handler.py`, where each aggregator is a callable
//! (`__call__`) plus an optional `finish`. Rust realizes this as a trait
//! with a default no-op `flush`, per the "Dynamic aggregator composition →
//! capability interface" design note in spec.md §9.

use crate::job::Job;

/// A stateful consumer of the completed-job stream.
///
/// `consume` is called once per emitted job, in emission order. `flush` is
/// called once after the supervisor drains, in driver-registration order.
/// Implementations decide which completion categories to act on and
/// silently ignore the rest.
pub trait Aggregator {
    fn consume(&mut self, job: &Job);

    /// Commit any final artifact. Aggregators that emit incrementally (the
    /// `Print*` family) can rely on the default no-op.
    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Format a `hosts: a b c` / `(and N more)` suffix shared by every merged
/// report. Ported from the `hosts_msg`/`jobs_info` formatting repeated
/// across `cljob/handler.py`'s `finish` methods.
///
/// - `max_jobs_to_list < 0` — list every identifier.
/// - `max_jobs_to_list == 0` — list none (colon only).
/// - `max_jobs_to_list > 0` — list the first N sorted identifiers, followed
///   by `" (and N more)"` for the overflow.
pub fn format_host_suffix(mut hosts: Vec<String>, max_jobs_to_list: i64) -> String {
    hosts.sort();
    let total = hosts.len();

    if max_jobs_to_list < 0 || max_jobs_to_list as usize >= total {
        return format!(": {}", hosts.join(" "));
    }
    if max_jobs_to_list == 0 {
        return ":".to_string();
    }
    let n = max_jobs_to_list as usize;
    let shown = hosts[..n].join(" ");
    let more = total - n;
    format!(": {shown} (and {more} more)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_lists_all_sorted() {
        let hosts = vec!["b".to_string(), "a".to_string(), "c".to_string()];
        assert_eq!(format_host_suffix(hosts, -1), ": a b c");
    }

    #[test]
    fn zero_lists_none() {
        let hosts = vec!["b".to_string(), "a".to_string()];
        assert_eq!(format_host_suffix(hosts, 0), ":");
    }

    #[test]
    fn positive_truncates_with_overflow_count() {
        let hosts = vec!["a", "b", "c", "d", "e"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(format_host_suffix(hosts, 2), ": a b (and 3 more)");
    }

    #[test]
    fn positive_at_or_above_total_lists_all() {
        let hosts = vec!["b".to_string(), "a".to_string()];
        assert_eq!(format_host_suffix(hosts, 5), ": a b");
    }
}
