//! Fork-join loops over image rows or columns.

use std::thread;

/// Returns the number of worker threads to use when the caller does not
/// specify one.
pub fn default_num_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Runs `f` once for every index in `0..count`, spreading indices across
/// worker threads. Returns once all of them are done. Callers use an index
/// per image row (or column) so workers touch disjoint pixels.
///
/// * `count`     - Number of rows or columns.
/// * `n_threads` - Number of worker threads (0 uses all available cores).
/// * `f`         - Callback taking the index.
pub fn parallel_for<F>(count: usize, n_threads: usize, f: F)
where
    F: Fn(usize) + Sync,
{
    if count == 0 {
        return;
    }

    let n_threads = if n_threads == 0 {
        default_num_threads()
    } else {
        n_threads
    }
    .min(count);

    if n_threads == 1 {
        (0..count).for_each(f);
        return;
    }

    let f = &f;
    thread::scope(|scope| {
        let (tx_worker, rx_worker) = crossbeam_channel::bounded::<usize>(n_threads);

        for _ in 0..n_threads {
            let rx_worker = rx_worker.clone();
            scope.spawn(move || {
                for i in rx_worker.iter() {
                    f(i);
                }
            });
        }
        // Drop extra since we've cloned one for each worker.
        drop(rx_worker);

        for i in 0..count {
            if tx_worker.send(i).is_err() {
                error!("Row worker hung up before index {i} was dispatched");
                break;
            }
        }
    });
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
