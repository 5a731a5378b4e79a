//! Stream lifecycle state shared between a consumer and its stop handles.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Lifecycle state of a [`StreamConsumer`](crate::StreamConsumer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Built but never started.
    Idle,
    /// Opening a connection, possibly waiting out a backoff delay.
    Connecting,
    /// Connected and decoding the response body.
    Running,
    /// Stop was requested; the run loop is winding down.
    Stopping,
    /// The run is over. Terminal.
    Stopped,
}

impl StreamState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamState::Idle => "idle",
            StreamState::Connecting => "connecting",
            StreamState::Running => "running",
            StreamState::Stopping => "stopping",
            StreamState::Stopped => "stopped",
        }
    }

    /// Whether a stop has been requested or completed.
    pub fn is_stopping(&self) -> bool {
        matches!(self, StreamState::Stopping | StreamState::Stopped)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State cell with guarded transitions.
///
/// Every transition names the states it may start from, so a late stop can
/// never be overwritten by a connect that was already in flight.
#[derive(Debug, Clone)]
pub(crate) struct SharedState(Arc<watch::Sender<StreamState>>);

impl SharedState {
    pub(crate) fn new() -> Self {
        Self(Arc::new(watch::channel(StreamState::Idle).0))
    }

    pub(crate) fn get(&self) -> StreamState {
        *self.0.borrow()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.get() == StreamState::Running
    }

    fn transition(&self, from: &[StreamState], to: StreamState) -> bool {
        self.0.send_if_modified(|state| {
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Idle or Running to Connecting.
    pub(crate) fn begin_connecting(&self) -> bool {
        self.transition(
            &[StreamState::Idle, StreamState::Running],
            StreamState::Connecting,
        )
    }

    /// Connecting to Running.
    pub(crate) fn mark_running(&self) -> bool {
        self.transition(&[StreamState::Connecting], StreamState::Running)
    }

    /// Any non-terminal state to Stopping.
    pub(crate) fn request_stop(&self) -> bool {
        self.transition(
            &[
                StreamState::Idle,
                StreamState::Connecting,
                StreamState::Running,
            ],
            StreamState::Stopping,
        )
    }

    pub(crate) fn finish(&self) {
        self.0.send_replace(StreamState::Stopped);
    }

    /// Resolves once stop has been requested.
    pub(crate) async fn stop_requested(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(StreamState::is_stopping).await;
    }
}

/// Cloneable handle for stopping a running consumer from another task.
///
/// ```ignore
/// let handle = consumer.stop_handle();
/// tokio::spawn(async move {
///     tokio::time::sleep(Duration::from_secs(60)).await;
///     handle.stop();
/// });
/// consumer.start(|event| println!("{event}")).await?;
/// ```
#[derive(Debug, Clone)]
pub struct StopHandle {
    state: SharedState,
}

impl StopHandle {
    pub(crate) fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Request a stop.
    ///
    /// Returns `false` if the consumer was already stopping or stopped.
    pub fn stop(&self) -> bool {
        let requested = self.state.request_stop();
        #[cfg(feature = "tracing")]
        {
            if requested {
                tracing::debug!("stream stop requested");
            }
        }
        requested
    }

    /// Current lifecycle state of the consumer.
    pub fn state(&self) -> StreamState {
        self.state.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_guarded_transitions() {
        let state = SharedState::new();
        assert_eq!(state.get(), StreamState::Idle);

        assert!(!state.mark_running());
        assert!(state.begin_connecting());
        assert!(state.mark_running());
        assert!(state.is_running());

        assert!(state.begin_connecting());
        assert!(state.request_stop());
        assert!(!state.mark_running());
        assert!(!state.begin_connecting());
        assert_eq!(state.get(), StreamState::Stopping);

        state.finish();
        assert!(!state.request_stop());
        assert_eq!(state.get(), StreamState::Stopped);
    }

    #[test]
    fn test_stop_handle_twice() {
        let state = SharedState::new();
        let handle = StopHandle::new(state.clone());
        let other = handle.clone();

        assert!(handle.stop());
        assert!(!other.stop());
        assert_eq!(other.state(), StreamState::Stopping);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_requested_wakes_waiter() {
        let state = SharedState::new();
        state.begin_connecting();

        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.stop_requested().await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!waiter.is_finished());

        StopHandle::new(state).stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_requested_resolves_immediately_when_stopped() {
        let state = SharedState::new();
        state.request_stop();
        state.stop_requested().await;
    }
}
