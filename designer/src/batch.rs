//! Fans the attempt controller out over many targets.
//!
//! A fixed pool of `max_concurrency` scoped worker threads pulls targets from a
//! shared cursor; each worker runs one target's whole ladder at a time.
//! Finished results flow back over a channel to the calling thread, which owns
//! the result map and the progress callback. A target whose ladder panics is
//! reported as `unknown_error` and its worker moves on.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use tracing::{error, info, instrument, warn};

use crate::controller::AttemptController;
use crate::core::types::{FailureReason, Target, TargetResult};
use crate::io::backend::DesignBackend;

pub struct BatchCoordinator<'a, B: DesignBackend> {
    controller: AttemptController<'a, B>,
    max_concurrency: usize,
}

impl<'a, B: DesignBackend> BatchCoordinator<'a, B> {
    /// `max_concurrency` of zero is treated as one.
    pub fn new(controller: AttemptController<'a, B>, max_concurrency: usize) -> Self {
        Self {
            controller,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Run every target to a terminal result.
    ///
    /// Returns exactly one result per distinct `target_id`. Duplicate ids keep
    /// their first occurrence. `on_result` is called once per result, in
    /// completion order, on the calling thread.
    #[instrument(skip_all, fields(targets = targets.len(), max_concurrency = self.max_concurrency))]
    pub fn run<F>(&self, targets: &[Target], mut on_result: F) -> BTreeMap<String, TargetResult>
    where
        F: FnMut(&TargetResult),
    {
        let unique = dedupe(targets);
        let workers = self.max_concurrency.min(unique.len());
        let cursor = AtomicUsize::new(0);
        let mut results = BTreeMap::new();

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<TargetResult>();
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let tx = tx.clone();
                    let cursor = &cursor;
                    let unique = &unique;
                    let controller = &self.controller;
                    scope.spawn(move || {
                        while let Some(target) = unique.get(cursor.fetch_add(1, Ordering::SeqCst)) {
                            let result = panic::catch_unwind(AssertUnwindSafe(|| controller.run(target)))
                                .unwrap_or_else(|payload| {
                                    error!(
                                        worker,
                                        target_id = %target.target_id,
                                        panic = panic_message(payload.as_ref()),
                                        "target panicked"
                                    );
                                    TargetResult::unattempted((*target).clone(), FailureReason::UnknownError)
                                });
                            if tx.send(result).is_err() {
                                warn!(worker, "result channel closed");
                                break;
                            }
                        }
                    })
                })
                .collect();
            drop(tx);

            for result in rx {
                on_result(&result);
                results.insert(result.target.target_id.clone(), result);
            }

            for (worker, handle) in handles.into_iter().enumerate() {
                if handle.join().is_err() {
                    error!(worker, "worker panicked");
                }
            }
        });

        for target in &unique {
            if !results.contains_key(&target.target_id) {
                warn!(target_id = %target.target_id, "no result from worker");
                let result = TargetResult::unattempted((*target).clone(), FailureReason::UnknownError);
                on_result(&result);
                results.insert(target.target_id.clone(), result);
            }
        }

        let succeeded = results.values().filter(|result| result.is_success()).count();
        info!(
            total = results.len(),
            succeeded,
            exhausted = results.len() - succeeded,
            "batch finished"
        );
        results
    }
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn dedupe(targets: &[Target]) -> Vec<&Target> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(targets.len());
    for target in targets {
        if seen.insert(target.target_id.as_str()) {
            unique.push(target);
        } else {
            warn!(target_id = %target.target_id, sequence_id = %target.sequence_id, "duplicate target ignored");
        }
    }
    unique
}
