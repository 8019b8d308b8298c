// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::thread::JoinHandle;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};

use crate::core::event_loop::LoopMessage;
use crate::core::work_queue::Job;
use crate::core::{BridgeConfig, Result};

/// Fixed set of named threads running `do_work`.
pub(crate) struct WorkerPool {
    jobs: Sender<Job>,
    shutdown: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `config.worker_threads` workers that post finished work to `completions`.
    pub(crate) fn start(config: &BridgeConfig, completions: Sender<LoopMessage>) -> Result<Self> {
        let (jobs_tx, jobs_rx) = unbounded::<Job>();
        // Never sent on; dropping the sender wakes every worker.
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let mut pool = Self {
            jobs: jobs_tx,
            shutdown: Some(shutdown_tx),
            workers: Vec::with_capacity(config.worker_threads),
        };

        for index in 0..config.worker_threads {
            let name = format!("{}-{}", config.worker_thread_name, index);
            let jobs = jobs_rx.clone();
            let shutdown = shutdown_rx.clone();
            let completions = completions.clone();
            let worker_name = name.clone();

            // On error `pool` drops here and joins the workers already spawned.
            let handle = std::thread::Builder::new()
                .name(name)
                .spawn(move || run_worker(&worker_name, jobs, shutdown, completions))?;
            pool.workers.push(handle);
        }

        tracing::info!(
            "Worker pool started with {} thread(s) ({}-*)",
            pool.workers.len(),
            config.worker_thread_name
        );
        Ok(pool)
    }

    pub(crate) fn jobs(&self) -> Sender<Job> {
        self.jobs.clone()
    }

    /// Signal every worker and wait for them. Jobs still queued are dropped.
    pub(crate) fn shutdown(&mut self) {
        if self.shutdown.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                tracing::warn!("[{}] Worker thread panicked during shutdown", name);
            }
        }
        tracing::debug!("Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    name: &str,
    jobs: Receiver<Job>,
    shutdown: Receiver<()>,
    completions: Sender<LoopMessage>,
) {
    tracing::debug!("[{}] Worker started", name);

    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(jobs) -> msg => {
                let Ok(job) = msg else { break };
                let id = job.id();
                tracing::trace!("[{}] Running {}", name, id);

                let finished = job.perform();
                if completions.send(LoopMessage::Completion(finished)).is_err() {
                    tracing::warn!("[{}] Main loop closed, completion for {} dropped", name, id);
                }
            }
        }
    }

    tracing::debug!("[{}] Worker stopped", name);
}
