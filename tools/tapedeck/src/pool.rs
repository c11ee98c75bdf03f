use tokio::sync::mpsc;

/// Runs the given tasks with at most `limit` in flight at once.
///
/// Tasks launch in submission order from a single control thread; each task
/// runs on its own scoped thread and reports back over a channel. The launch
/// loop blocks whenever the in-flight count reaches `limit` and resumes as
/// soon as any task settles. Results come back in submission order regardless
/// of completion order, one per task.
pub fn run_bounded<T, F>(tasks: Vec<F>, limit: usize) -> Vec<T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    let limit = limit.max(1);
    let total = tasks.len();
    if total == 0 {
        return Vec::new();
    }

    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();
    std::thread::scope(|scope| {
        let (done_tx, mut done_rx) = mpsc::channel::<(usize, T)>(total);
        let mut in_flight = 0usize;

        for (index, task) in tasks.into_iter().enumerate() {
            if in_flight >= limit {
                if let Some((finished, value)) = done_rx.blocking_recv() {
                    slots[finished] = Some(value);
                    in_flight -= 1;
                }
            }
            let done_tx = done_tx.clone();
            scope.spawn(move || {
                let value = task();
                let _ = done_tx.blocking_send((index, value));
            });
            in_flight += 1;
        }

        // Close our sender so the drain loop ends once every task reports.
        drop(done_tx);
        while let Some((finished, value)) = done_rx.blocking_recv() {
            slots[finished] = Some(value);
        }
    });

    slots.into_iter().flatten().collect()
}
