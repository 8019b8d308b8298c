// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The main-thread loop.
//!
//! Each turn drains ready messages (dispatched closures and work completions,
//! in arrival order) and then, if nothing else is waiting, runs one idle
//! phase. The loop is `!Send`: it is built on the thread that becomes "main"
//! and must be driven there.

use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver};

use crate::core::dispatcher::PendingClosure;
use crate::core::handle::LoopShared;
use crate::core::work_queue::{CompletedWork, WorkerPool};
use crate::core::{BridgeConfig, BridgeError, BridgeHandle, Result, ThreadIdentity, ThreadToken};
use crate::host::{install_host, Host, HostSlotGuard};

pub(crate) enum LoopMessage {
    Dispatch(PendingClosure),
    Completion(Box<dyn CompletedWork>),
    /// Nudge a blocked loop; carries nothing.
    Wake,
    Stop,
}

#[derive(Debug, Default, Clone, Copy)]
struct TurnOutcome {
    ran: usize,
    stop: bool,
}

pub struct EventLoopBuilder {
    config: BridgeConfig,
    host: Option<Rc<dyn Host>>,
}

impl EventLoopBuilder {
    fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
            host: None,
        }
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Host to install in the main-thread slot while the loop is alive.
    pub fn host(mut self, host: Rc<dyn Host>) -> Self {
        self.host = Some(host);
        self
    }

    /// Build the loop, binding the calling thread as main.
    pub fn build(self) -> Result<EventLoop> {
        self.config.validate()?;

        let identity = ThreadIdentity::capture_current();
        let (sender, receiver) = unbounded();
        let pool = WorkerPool::start(&self.config, sender.clone())?;
        let shared = Arc::new(LoopShared::new(
            identity,
            sender,
            pool.jobs(),
            self.config.dispatch_queue_capacity,
        ));
        let host_slot = self.host.map(install_host);

        tracing::info!(
            "Main loop created on {} ({} worker(s), dispatch capacity {})",
            ThreadToken::current(),
            self.config.worker_threads,
            self.config
                .dispatch_queue_capacity
                .map_or_else(|| "unbounded".to_string(), |c| c.to_string())
        );

        Ok(EventLoop {
            shared,
            receiver,
            pool,
            config: self.config,
            host_slot,
            _main_only: PhantomData,
        })
    }
}

pub struct EventLoop {
    shared: Arc<LoopShared>,
    receiver: Receiver<LoopMessage>,
    pool: WorkerPool,
    config: BridgeConfig,
    host_slot: Option<HostSlotGuard>,
    _main_only: PhantomData<Rc<()>>,
}

impl EventLoop {
    pub fn builder() -> EventLoopBuilder {
        EventLoopBuilder::new()
    }

    /// Loop on the calling thread with default config and no host.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn handle(&self) -> BridgeHandle {
        BridgeHandle::new(Arc::clone(&self.shared))
    }

    pub fn identity(&self) -> &ThreadIdentity {
        &self.shared.identity
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn has_host(&self) -> bool {
        self.host_slot.is_some()
    }

    /// Run until [`BridgeHandle::stop`] is called.
    pub fn run(&mut self) -> Result<()> {
        self.shared.identity.ensure_main()?;
        tracing::debug!("Main loop running");

        loop {
            let outcome = self.turn_inner(true);
            if outcome.stop {
                break;
            }
        }

        tracing::debug!("Main loop stopped");
        Ok(())
    }

    /// One non-blocking iteration. Returns how many closures, completions and
    /// idle callbacks ran.
    pub fn turn(&mut self) -> Result<usize> {
        self.shared.identity.ensure_main()?;
        Ok(self.turn_inner(false).ran)
    }

    /// Run until no dispatch, idle callback or background work is outstanding.
    ///
    /// Blocks while work is still running on the pool. Returns early if a stop
    /// request arrives.
    pub fn run_until_drained(&mut self) -> Result<()> {
        self.shared.identity.ensure_main()?;

        loop {
            if self.turn_inner(false).stop {
                return Ok(());
            }
            if !self.receiver.is_empty() || !self.shared.idle.is_empty() {
                continue;
            }
            if self.shared.in_flight.load(Ordering::Acquire) == 0 {
                return Ok(());
            }

            // A completion is guaranteed to arrive for every in-flight job.
            let message = self
                .receiver
                .recv()
                .map_err(|_| BridgeError::LoopClosed("drain"))?;
            let mut outcome = TurnOutcome::default();
            self.process(message, &mut outcome);
            if outcome.stop {
                return Ok(());
            }
        }
    }

    fn turn_inner(&mut self, block: bool) -> TurnOutcome {
        let mut outcome = TurnOutcome::default();

        if block && self.shared.idle.is_empty() {
            match self.receiver.recv() {
                Ok(message) => self.process(message, &mut outcome),
                Err(_) => {
                    outcome.stop = true;
                    return outcome;
                }
            }
        }

        while !outcome.stop {
            match self.receiver.try_recv() {
                Ok(message) => self.process(message, &mut outcome),
                Err(_) => break,
            }
        }

        if !outcome.stop && self.receiver.is_empty() {
            outcome.ran += self.run_idle_phase();
        }
        outcome
    }

    fn process(&mut self, message: LoopMessage, outcome: &mut TurnOutcome) {
        match message {
            LoopMessage::Dispatch(closure) => {
                self.shared.release_dispatch();
                closure.run();
                outcome.ran += 1;
            }
            LoopMessage::Completion(work) => {
                let id = work.id();
                work.complete();
                self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
                tracing::trace!("[{}] Completed", id);
                outcome.ran += 1;
            }
            LoopMessage::Wake => {}
            LoopMessage::Stop => outcome.stop = true,
        }
    }

    fn run_idle_phase(&mut self) -> usize {
        let batch = self.shared.idle.take_batch();
        let count = batch.len();
        if count > 0 {
            tracing::trace!("Idle phase running {} callback(s)", count);
        }
        for closure in batch {
            closure.run();
        }
        count
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        // Workers first: finished work lands in the channel and is discarded below.
        self.pool.shutdown();
        self.shared.mark_closed();

        let mut discarded = 0;
        for message in self.receiver.try_iter() {
            if matches!(message, LoopMessage::Dispatch(_)) {
                self.shared.release_dispatch();
            }
            discarded += 1;
        }
        let idle = self.shared.idle.take_batch().len();
        if discarded > 0 || idle > 0 {
            tracing::debug!(
                "Main loop dropped with {} message(s) and {} idle callback(s) unrun",
                discarded,
                idle
            );
        }
        self.host_slot.take();
    }
}
