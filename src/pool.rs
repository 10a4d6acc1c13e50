/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
    panic::{self, AssertUnwindSafe},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{unbounded, Sender};

/// A unit of work to run on a worker.
type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool of worker threads, pulling jobs from a shared queue.
///
/// Workers are spawned on construction and joined when the pool is dropped.
/// A job that panics does not take its worker down with it.
#[derive(Debug)]
pub struct WorkerPool {
    /// Sending half of the job queue. Dropping it tells the workers to exit.
    sender: Option<Sender<Job>>,

    /// Handles to every worker that was successfully spawned.
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn a pool of `size` workers.
    ///
    /// If the OS refuses to spawn some of them, the pool runs with fewer.
    /// A pool that ends up with no workers at all runs jobs on the calling thread.
    pub fn new(size: usize) -> Self {
        let (sender, receiver) = unbounded::<Job>();

        let workers = (0..size)
            .filter_map(|id| {
                let receiver = receiver.clone();

                let spawned = thread::Builder::new()
                    .name(format!("search-worker-{id}"))
                    .spawn(move || {
                        // Exits once every sender has been dropped and the queue is drained
                        for job in receiver.iter() {
                            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                                log::error!("Job panicked on search-worker-{id}");
                            }
                        }
                    });

                spawned
                    .inspect_err(|err| log::warn!("Failed to spawn search-worker-{id}: {err}"))
                    .ok()
            })
            .collect::<Vec<_>>();

        log::debug!("Spawned {} of {size} search workers", workers.len());

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Number of workers in this pool.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue `job` to be run by the next free worker.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        match &self.sender {
            Some(sender) if !self.workers.is_empty() => {
                // Workers only exit after the sender is dropped, so the queue is always open here
                if let Err(err) = sender.send(Box::new(job)) {
                    log::error!("Search workers are gone; running job inline");
                    (err.into_inner())();
                }
            }
            _ => job(),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the queue lets every worker finish its current job and exit
        drop(self.sender.take());

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("A search worker panicked while shutting down");
            }
        }
    }
}
