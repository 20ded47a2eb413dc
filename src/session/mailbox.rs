//! Per-response-kind single-slot mailboxes.
//!
//! One `embassy-sync` signal per [`ResponseKind`]. Delivering overwrites
//! any unread value of the same kind; callers clear a slot right before
//! sending the request that fills it.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::protocol::{Response, ResponseKind};

pub struct Mailboxes {
    slots: [Signal<CriticalSectionRawMutex, Response>; ResponseKind::COUNT],
}

impl Mailboxes {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Signal::new()),
        }
    }

    /// Route a decoded response to its slot.
    pub fn deliver(&self, response: Response) -> ResponseKind {
        let kind = response.kind();
        self.slots[kind.index()].signal(response);
        kind
    }

    pub fn clear(&self, kind: ResponseKind) {
        self.slots[kind.index()].reset();
    }

    pub fn take(&self, kind: ResponseKind) -> Option<Response> {
        self.slots[kind.index()].try_take()
    }

    pub fn is_filled(&self, kind: ResponseKind) -> bool {
        self.slots[kind.index()].signaled()
    }

    pub fn clear_all(&self) {
        for slot in &self.slots {
            slot.reset();
        }
    }
}

impl Default for Mailboxes {
    fn default() -> Self {
        Self::new()
    }
}
