//! Inbound byte queue between the transport's notification callback and
//! the session's frame decoder.
//!
//! ```text
//! ┌──────────────────┐  push bytes  ┌──────────────┐  decode  ┌──────────┐
//! │ transport notify │─────────────▶│ InboundQueue │─────────▶│ session  │
//! │ (any thread)     │   signal ()  │  VecDeque<u8>│  wait()  │ (async)  │
//! └──────────────────┘              └──────────────┘          └──────────┘
//! ```
//!
//! Single producer, single consumer. The byte buffer sits behind a
//! critical-section mutex; an `embassy-sync` signal wakes the reader.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
use std::collections::VecDeque;
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Unbounded FIFO of raw inbound bytes for one connection.
pub struct InboundQueue {
    bytes: Mutex<CriticalSectionRawMutex, RefCell<VecDeque<u8>>>,
    ready: Signal<CriticalSectionRawMutex, ()>,
    disconnected: AtomicBool,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self {
            bytes: Mutex::new(RefCell::new(VecDeque::new())),
            ready: Signal::new(),
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn push(&self, data: &[u8]) {
        self.bytes.lock(|q| q.borrow_mut().extend(data));
        self.ready.signal(());
    }

    pub fn mark_disconnected(&self) {
        self.disconnected.store(true, Ordering::Release);
        self.ready.signal(());
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.bytes.lock(|q| q.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` with exclusive access to the buffered bytes.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&mut VecDeque<u8>) -> R) -> R {
        self.bytes.lock(|q| f(&mut q.borrow_mut()))
    }

    /// Suspend until new bytes or a disconnect arrive.
    ///
    /// A push that happened since the last wait completes immediately.
    pub async fn wait(&self) {
        self.ready.wait().await;
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer handle given to the transport on connect.
#[derive(Clone)]
pub struct NotificationSink {
    queue: Arc<InboundQueue>,
}

impl NotificationSink {
    pub fn new(queue: Arc<InboundQueue>) -> Self {
        Self { queue }
    }

    /// Deliver a notification payload.
    pub fn notify(&self, data: &[u8]) {
        self.queue.push(data);
    }

    /// Report that the link dropped.
    pub fn disconnected(&self) {
        self.queue.mark_disconnected();
    }
}
