//! Display refresh signal.
//!
//! A refresh signal delivers at most one callback per refresh interval and
//! must be re-registered to keep delivering. The driver posts itself again at
//! the start of every tick; pausing the host removes the registration.
//!
//! Two implementations are provided:
//!
//! - [`Choreographer`] is a host-pumped, single-threaded callback slot. Headless
//!   hosts (and the tests) post to it and call [`Choreographer::take_posted`]
//!   once per refresh to decide whether a tick is due.
//! - [`WindowRefresh`] maps posting onto winit's `request_redraw`, so the next
//!   `RedrawRequested` event is the next tick.

use std::{cell::Cell, rc::Rc, sync::Arc};

use winit::window::Window;

/// Registration surface of a per-refresh callback.
pub trait RefreshSignal {
    /// Register for exactly one callback on the next refresh.
    fn post_frame_callback(&mut self);

    /// Cancel a pending registration. Safe to call when nothing is posted.
    fn remove_frame_callback(&mut self);
}

#[derive(Debug, Default)]
struct Slot {
    posted: Cell<bool>,
    posts: Cell<u64>,
    dispatched: Cell<u64>,
}

/// Host-pumped refresh signal.
///
/// Cloning shares the same callback slot, so the host keeps one handle while
/// the driver owns another.
#[derive(Debug, Clone, Default)]
pub struct Choreographer {
    slot: Rc<Slot>,
}

impl Choreographer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_posted(&self) -> bool {
        self.slot.posted.get()
    }

    /// Total number of registrations made so far.
    pub fn posts(&self) -> u64 {
        self.slot.posts.get()
    }

    /// Number of refreshes that found a registration.
    pub fn dispatched(&self) -> u64 {
        self.slot.dispatched.get()
    }

    /// Consumes the pending registration for this refresh.
    ///
    /// Returns whether a callback was registered; the host delivers a tick only
    /// when it was. The registration is one-shot, the callee has to post again.
    pub fn take_posted(&self) -> bool {
        let posted = self.slot.posted.replace(false);
        if posted {
            self.slot.dispatched.set(self.slot.dispatched.get() + 1);
        }
        posted
    }
}

impl RefreshSignal for Choreographer {
    fn post_frame_callback(&mut self) {
        self.slot.posted.set(true);
        self.slot.posts.set(self.slot.posts.get() + 1);
    }

    fn remove_frame_callback(&mut self) {
        self.slot.posted.set(false);
    }
}

/// Refresh signal backed by a winit window.
///
/// winit cannot withdraw a redraw request, so removal only stops further
/// requests. The driver ignores ticks that arrive while it is disarmed.
#[derive(Debug, Clone)]
pub struct WindowRefresh {
    window: Arc<Window>,
}

impl WindowRefresh {
    pub fn new(window: Arc<Window>) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }
}

impl RefreshSignal for WindowRefresh {
    fn post_frame_callback(&mut self) {
        self.window.request_redraw();
    }

    fn remove_frame_callback(&mut self) {}
}
