//! Partitioning of index ranges over a bounded set of workers.

use std::ops::Range;
use std::thread::ScopedJoinHandle;

/// Number of workers to use for `total` items when each worker should get at least
/// `min_per_worker` of them and at most `budget` workers are allowed.
pub fn worker_count(total: usize, budget: usize, min_per_worker: usize) -> usize {
    let min_per_worker = min_per_worker.max(1);
    let useful = total.div_ceil(min_per_worker);
    useful.min(budget).max(1)
}

/// Splits `0..total` into `parts` contiguous ranges whose lengths differ by at most one,
/// the longer ranges first. Empty ranges are omitted.
pub fn partition(total: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.max(1);
    let base = total / parts;
    let extra = total % parts;
    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let len = base + usize::from(i < extra);
        if len == 0 {
            break;
        }
        ranges.push(start..start + len);
        start += len;
    }
    debug_assert_eq!(start, total);
    ranges
}

/// Results of scoped workers, in spawn order. A panic in a worker is resumed on the caller.
pub fn join_all<T>(handles: Vec<ScopedJoinHandle<'_, T>>) -> Vec<T> {
    handles
        .into_iter()
        .map(|h| h.join().unwrap_or_else(|payload| std::panic::resume_unwind(payload)))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partition_covers_everything() {
        assert_eq!(partition(10, 3), vec![0..4, 4..7, 7..10]);
        assert_eq!(partition(2, 4), vec![0..1, 1..2]);
        assert!(partition(0, 4).is_empty());
        assert_eq!(partition(5, 0), vec![0..5]);
    }

    #[test]
    fn worker_count_respects_bounds() {
        assert_eq!(worker_count(0, 8, 100), 1);
        assert_eq!(worker_count(250, 8, 100), 3);
        assert_eq!(worker_count(100_000, 8, 100), 8);
        assert_eq!(worker_count(10, 8, 0), 8);
    }

    #[test]
    fn join_all_keeps_spawn_order() {
        let out = std::thread::scope(|scope| join_all((0..4).map(|i| scope.spawn(move || i * 10)).collect()));
        assert_eq!(out, vec![0, 10, 20, 30]);
    }

    #[test]
    #[should_panic(expected = "worker failed")]
    fn join_all_resumes_worker_panics() {
        std::thread::scope(|scope| {
            let handles = vec![scope.spawn(|| 1), scope.spawn(|| panic!("worker failed"))];
            join_all(handles)
        });
    }
}
