// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::core::event_loop::LoopMessage;
use crate::core::idle::IdleQueue;
use crate::core::work_queue::Job;
use crate::core::{BridgeError, Result, ThreadIdentity, ThreadToken};

/// State shared between the [`EventLoop`](crate::core::EventLoop) and every
/// [`BridgeHandle`].
pub(crate) struct LoopShared {
    pub(crate) identity: ThreadIdentity,
    pub(crate) sender: Sender<LoopMessage>,
    pub(crate) jobs: Sender<Job>,
    pub(crate) idle: IdleQueue,
    pub(crate) dispatch_capacity: Option<usize>,
    pub(crate) pending_dispatches: AtomicUsize,
    pub(crate) in_flight: AtomicUsize,
    closed: AtomicBool,
    next_id: AtomicU64,
}

impl LoopShared {
    pub(crate) fn new(
        identity: ThreadIdentity,
        sender: Sender<LoopMessage>,
        jobs: Sender<Job>,
        dispatch_capacity: Option<usize>,
    ) -> Self {
        Self {
            identity,
            sender,
            jobs,
            idle: IdleQueue::default(),
            dispatch_capacity,
            pending_dispatches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Set once the loop is dropped. Nothing registered afterwards can run.
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Claim a slot for an off-main dispatch, honoring the configured bound.
    pub(crate) fn reserve_dispatch(&self) -> Result<()> {
        let queued = self.pending_dispatches.fetch_add(1, Ordering::AcqRel);
        match self.dispatch_capacity {
            Some(capacity) if queued >= capacity => {
                self.pending_dispatches.fetch_sub(1, Ordering::AcqRel);
                Err(BridgeError::QueueFull { capacity })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn release_dispatch(&self) {
        self.pending_dispatches.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Cloneable, `Send + Sync` handle to a running main loop.
///
/// Every cross-thread operation (dispatch, idle registration, background work)
/// goes through a handle. Handles stay valid after the loop is dropped; posting
/// then fails with [`BridgeError::LoopClosed`].
#[derive(Clone)]
pub struct BridgeHandle {
    pub(crate) shared: Arc<LoopShared>,
}

impl BridgeHandle {
    pub(crate) fn new(shared: Arc<LoopShared>) -> Self {
        Self { shared }
    }

    pub fn identity(&self) -> &ThreadIdentity {
        &self.shared.identity
    }

    /// Whether the caller is the loop's main thread.
    pub fn is_main_thread(&self) -> bool {
        self.shared.identity.is_main_thread()
    }

    pub fn main_thread(&self) -> Result<ThreadToken> {
        self.shared.identity.main_thread()
    }

    /// Off-main dispatches posted but not yet run.
    pub fn pending_dispatches(&self) -> usize {
        self.shared.pending_dispatches.load(Ordering::Acquire)
    }

    /// Background work scheduled whose completion has not run yet.
    pub fn work_in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Ask the loop to return from [`EventLoop::run`](crate::core::EventLoop::run).
    pub fn stop(&self) -> Result<()> {
        self.shared
            .sender
            .send(LoopMessage::Stop)
            .map_err(|_| BridgeError::LoopClosed("stop request"))
    }
}

impl fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("identity", &self.shared.identity)
            .field("pending_dispatches", &self.pending_dispatches())
            .field("work_in_flight", &self.work_in_flight())
            .finish()
    }
}
