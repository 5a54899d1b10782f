//src/workers.rs

//! Shared plumbing for the scoped worker pools: a cancellation flag that
//! peers poll, a guard that trips it when a worker panics, and the join
//! point that turns worker outcomes into one phase result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ScopedJoinHandle;

use crate::error::{ProfileError, Result};

#[derive(Debug, Default)]
pub struct Cancellation {
    flag: AtomicBool,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once a peer has failed.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ProfileError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Guard to hold for the lifetime of a worker.
    pub fn guard(&self) -> CancelOnFailure<'_> {
        CancelOnFailure { cancellation: self }
    }
}

/// Trips the cancellation flag if the owning worker unwinds.
pub struct CancelOnFailure<'a> {
    cancellation: &'a Cancellation,
}

impl Drop for CancelOnFailure<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.cancellation.cancel();
        }
    }
}

/// Runs `f` and cancels peers if it returns an error.
pub fn run_worker<T, F>(cancellation: &Cancellation, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let _guard = cancellation.guard();
    let result = f();
    if result.is_err() {
        cancellation.cancel();
    }
    result
}

/// Waits for every worker of a phase. The first root-cause error wins over
/// the `Cancelled` errors it triggered in peers.
pub fn join_phase<T>(
    handles: Vec<ScopedJoinHandle<'_, Result<T>>>,
    phase: &'static str,
) -> Result<Vec<T>> {
    let mut outputs = Vec::with_capacity(handles.len());
    let mut first_error: Option<ProfileError> = None;

    for handle in handles {
        let outcome = handle
            .join()
            .unwrap_or(Err(ProfileError::WorkerPanicked(phase)));
        match outcome {
            Ok(v) => outputs.push(v),
            Err(e) => {
                let replace = match &first_error {
                    None => true,
                    Some(ProfileError::Cancelled) => !matches!(e, ProfileError::Cancelled),
                    Some(_) => false,
                };
                if replace {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(outputs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn failing_worker_cancels_peers() {
        let cancellation = Cancellation::new();
        let result: Result<Vec<usize>> = thread::scope(|s| {
            let mut handles = Vec::new();
            handles.push(s.spawn(|| {
                run_worker(&cancellation, || Err(ProfileError::Format("bad".into())))
            }));
            for _ in 0..3 {
                handles.push(s.spawn(|| {
                    run_worker(&cancellation, || -> Result<usize> {
                        while !cancellation.is_cancelled() {
                            thread::yield_now();
                        }
                        cancellation.check()?;
                        Ok(0)
                    })
                }));
            }
            join_phase(handles, "test")
        });
        assert!(matches!(result, Err(ProfileError::Format(_))));
    }

    #[test]
    fn panicking_worker_is_reported() {
        let cancellation = Cancellation::new();
        let result: Result<Vec<()>> = thread::scope(|s| {
            let handles = vec![s.spawn(|| {
                run_worker(&cancellation, || -> Result<()> { panic!("boom") })
            })];
            join_phase(handles, "panic test")
        });
        assert!(matches!(result, Err(ProfileError::WorkerPanicked("panic test"))));
        assert!(cancellation.is_cancelled());
    }

    #[test]
    fn all_ok_collects_in_spawn_order() {
        let cancellation = Cancellation::new();
        let result = thread::scope(|s| {
            let handles = (0..4)
                .map(|i| s.spawn(move || -> Result<usize> { Ok(i * 10) }))
                .collect();
            join_phase(handles, "ok")
        })
        .unwrap();
        assert_eq!(result, vec![0, 10, 20, 30]);
        assert!(!cancellation.is_cancelled());
    }
}
