//! Connectivity tracking.
//!
//! The monitor does not probe anything. The platform tells it when the link
//! goes up or down through [`NetworkMonitor::set_online`], and the sync engine
//! reads the current state between operations.

use crate::clock::{Clock, SystemClock};
use ferry_engine::Timestamp;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Online/offline state shared between the platform and the sync engine.
pub struct NetworkMonitor {
    state: watch::Sender<bool>,
    last_online_at: Mutex<Option<Timestamp>>,
    clock: Arc<dyn Clock>,
}

impl NetworkMonitor {
    /// Create a monitor from an initial connectivity read.
    pub fn new(online: bool) -> Self {
        Self::with_clock(online, Arc::new(SystemClock))
    }

    pub fn with_clock(online: bool, clock: Arc<dyn Clock>) -> Self {
        let last_online_at = online.then(|| clock.now());
        let (state, _) = watch::channel(online);
        Self {
            state,
            last_online_at: Mutex::new(last_online_at),
            clock,
        }
    }

    /// Create a monitor wrapped in Arc for sharing.
    pub fn new_shared(online: bool) -> Arc<Self> {
        Arc::new(Self::new(online))
    }

    /// Record a connectivity change.
    ///
    /// Returns `true` if the state actually changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });

        if changed {
            if online {
                if let Ok(mut at) = self.last_online_at.lock() {
                    *at = Some(self.clock.now());
                }
                tracing::info!("Connectivity restored");
            } else {
                tracing::warn!("Connectivity lost");
            }
        }

        changed
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// When the link last came up, if it ever did.
    pub fn last_online_at(&self) -> Option<Timestamp> {
        self.last_online_at.lock().ok().and_then(|at| *at)
    }

    /// Watch the raw online flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Listen for reconnects that survive `settle_delay`.
    pub fn reconnect_listener(&self, settle_delay: Duration) -> ReconnectListener {
        ReconnectListener::new(self.subscribe(), settle_delay)
    }
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("online", &self.is_online())
            .field("last_online_at", &self.last_online_at())
            .finish()
    }
}

/// Yields once per offline-to-online transition, after the link has stayed
/// up for the settle delay.
#[derive(Debug)]
pub struct ReconnectListener {
    rx: watch::Receiver<bool>,
    settle_delay: Duration,
    was_online: bool,
}

impl ReconnectListener {
    fn new(mut rx: watch::Receiver<bool>, settle_delay: Duration) -> Self {
        let was_online = *rx.borrow_and_update();
        Self {
            rx,
            settle_delay,
            was_online,
        }
    }

    /// Wait for the next settled reconnect.
    ///
    /// Returns `None` once the monitor is gone. A drop during the settle
    /// window cancels the pending event; the next reconnect starts a fresh
    /// window.
    pub async fn reconnected(&mut self) -> Option<()> {
        loop {
            self.wait_for_edge().await?;

            let settle = tokio::time::sleep(self.settle_delay);
            tokio::pin!(settle);

            loop {
                tokio::select! {
                    _ = &mut settle => return Some(()),
                    changed = self.rx.changed() => {
                        changed.ok()?;
                        let online = *self.rx.borrow_and_update();
                        self.was_online = online;
                        if !online {
                            tracing::debug!("Link dropped while settling");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn wait_for_edge(&mut self) -> Option<()> {
        loop {
            self.rx.changed().await.ok()?;
            let online = *self.rx.borrow_and_update();
            let edge = online && !self.was_online;
            self.was_online = online;
            if edge {
                return Some(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn set_online_reports_transitions() {
        let monitor = NetworkMonitor::new(false);

        assert!(!monitor.set_online(false));
        assert!(monitor.set_online(true));
        assert!(monitor.is_online());
        assert!(!monitor.set_online(true));
        assert!(monitor.set_online(false));
        assert!(!monitor.is_online());
    }

    #[test]
    fn last_online_at_tracks_reconnects() {
        let clock = Arc::new(ManualClock::new(1_000));
        let monitor = NetworkMonitor::with_clock(false, clock.clone());
        assert_eq!(monitor.last_online_at(), None);

        clock.set(5_000);
        monitor.set_online(true);
        assert_eq!(monitor.last_online_at(), Some(5_000));

        clock.set(9_000);
        monitor.set_online(false);
        assert_eq!(monitor.last_online_at(), Some(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_fires_after_settle() {
        let monitor = NetworkMonitor::new(false);
        let mut listener = monitor.reconnect_listener(Duration::from_secs(1));

        let started = tokio::time::Instant::now();
        monitor.set_online(true);
        listener.reconnected().await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn drop_during_settle_swallows_event() {
        let monitor = Arc::new(NetworkMonitor::new(false));
        let mut listener = monitor.reconnect_listener(Duration::from_secs(1));

        let flapper = monitor.clone();
        tokio::spawn(async move {
            flapper.set_online(true);
            tokio::time::sleep(Duration::from_millis(500)).await;
            flapper.set_online(false);
            tokio::time::sleep(Duration::from_secs(5)).await;
            flapper.set_online(true);
        });

        let started = tokio::time::Instant::now();
        listener.reconnected().await.unwrap();

        // only the second reconnect counts: 5.5s offline window + 1s settle
        assert!(started.elapsed() >= Duration::from_millis(6_500));
    }

    #[tokio::test(start_paused = true)]
    async fn listener_ends_with_monitor() {
        let monitor = NetworkMonitor::new(true);
        let mut listener = monitor.reconnect_listener(Duration::from_secs(1));
        drop(monitor);

        assert!(listener.reconnected().await.is_none());
    }
}
