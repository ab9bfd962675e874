//! Debounce watchdog for connections kept alive by liveness signals.
//!
//! Each liveness signal re-arms the watchdog: the pending timer, if any, is
//! cancelled and a fresh one scheduled, both under one lock so there is
//! never more than one pending timer. If a timer runs out uncancelled the
//! expiry callback fires once.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {tokio::task::JoinHandle, tracing::debug};

type ExpiryFn = dyn Fn() + Send + Sync;

pub struct Watchdog {
    window: Duration,
    slot: Mutex<Option<JoinHandle<()>>>,
    on_expire: Arc<ExpiryFn>,
    expirations: Arc<AtomicU64>,
}

impl Watchdog {
    pub fn new<F>(window: Duration, on_expire: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            window,
            slot: Mutex::new(None),
            on_expire: Arc::new(on_expire),
            expirations: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Cancel the pending timer, if any, and schedule a new one.
    pub fn arm(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let window = self.window;
        let on_expire = Arc::clone(&self.on_expire);
        let expirations = Arc::clone(&self.expirations);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            expirations.fetch_add(1, Ordering::SeqCst);
            debug!(window_ms = window.as_millis() as u64, "watchdog expired");
            on_expire();
        }));
    }

    pub fn disarm(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pending) = slot.take() {
            pending.abort();
        }
    }

    /// Whether a timer is scheduled and has not fired yet.
    pub fn is_armed(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// How many times the watchdog has fired since it was created.
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::SeqCst)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
