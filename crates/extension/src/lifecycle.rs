//! Host application lifecycle fan-out.
//!
//! The host dispatches lifecycle transitions into a [`LifecycleSource`];
//! every active connection holds a [`LifecycleSubscription`] that forwards
//! them to its extension instance. Dispatch never waits for subscribers.

use std::{fmt, str::FromStr};

use {
    serde::{Deserialize, Serialize},
    tokio::{
        sync::broadcast::{self, error::RecvError},
        task::JoinHandle,
    },
    tracing::{debug, warn},
};

use crate::error::Error;

const LIFECYCLE_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Create,
    Start,
    Resume,
    Pause,
    Stop,
    Destroy,
}

impl LifecycleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Resume => "resume",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "start" => Ok(Self::Start),
            "resume" => Ok(Self::Resume),
            "pause" => Ok(Self::Pause),
            "stop" => Ok(Self::Stop),
            "destroy" => Ok(Self::Destroy),
            other => Err(Error::invalid_input(format!(
                "unknown lifecycle event: {other}"
            ))),
        }
    }
}

/// Broadcast source of host lifecycle events.
#[derive(Clone)]
pub struct LifecycleSource {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl Default for LifecycleSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleSource {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(LIFECYCLE_BUFFER);
        Self { tx }
    }

    /// Fan an event out to every subscriber. Returns how many were reached.
    pub fn dispatch(&self, event: LifecycleEvent) -> usize {
        let reached = self.tx.send(event).unwrap_or(0);
        debug!(event = %event, subscribers = reached, "lifecycle event dispatched");
        reached
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Register a handler. It runs on its own task until the returned
    /// subscription is dropped.
    pub fn subscribe<F>(&self, handler: F) -> LifecycleSubscription
    where
        F: Fn(LifecycleEvent) + Send + Sync + 'static,
    {
        let mut rx = self.tx.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "lifecycle subscriber lagged, events dropped");
                    },
                    Err(RecvError::Closed) => break,
                }
            }
        });
        LifecycleSubscription { task }
    }
}

/// Registration handle. Dropping it stops forwarding.
pub struct LifecycleSubscription {
    task: JoinHandle<()>,
}

impl LifecycleSubscription {
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for LifecycleSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, std::time::Duration, tokio::sync::mpsc};

    #[tokio::test]
    async fn forwards_events_in_order() {
        let source = LifecycleSource::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = source.subscribe(move |event| {
            let _ = tx.send(event);
        });

        source.dispatch(LifecycleEvent::Pause);
        source.dispatch(LifecycleEvent::Resume);

        assert_eq!(rx.recv().await, Some(LifecycleEvent::Pause));
        assert_eq!(rx.recv().await, Some(LifecycleEvent::Resume));
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters() {
        let source = LifecycleSource::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = source.subscribe(move |event| {
            let _ = tx.send(event);
        });
        assert_eq!(source.subscriber_count(), 1);

        drop(sub);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        assert_eq!(source.dispatch(LifecycleEvent::Stop), 0);
        let got = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(matches!(got, Ok(None)));
    }

    #[test]
    fn dispatch_without_subscribers_is_fine() {
        let source = LifecycleSource::new();
        assert_eq!(source.dispatch(LifecycleEvent::Create), 0);
    }

    #[rstest::rstest]
    #[case("create", LifecycleEvent::Create)]
    #[case("resume", LifecycleEvent::Resume)]
    #[case("destroy", LifecycleEvent::Destroy)]
    fn parses_event_names(#[case] raw: &str, #[case] expected: LifecycleEvent) {
        assert_eq!(raw.parse::<LifecycleEvent>().unwrap(), expected);
        assert_eq!(expected.to_string(), raw);
    }

    #[test]
    fn rejects_unknown_event() {
        assert!("sleep".parse::<LifecycleEvent>().is_err());
    }
}
