//! The stream consumer and its run loop.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::body::{BodyDecoder, BodyOutcome, DecodeOptions};
use crate::builder::ConsumerBuilder;
use crate::config::{defaults, BackoffPolicy, ConnectionConfig};
use crate::connect::{ConnectOutcome, Connector};
use crate::error::ConsumerError;
use crate::response::ResponseHead;
use crate::state::{SharedState, StopHandle, StreamState};
use crate::transport::{Dial, TcpDialer, Transport};

pub(crate) type StopHook = Box<dyn FnOnce(&StopReason) + Send>;

/// Why a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// [`StopHandle::stop`] was called.
    StopRequested,
    /// The server closed the stream and no reconnect was attempted.
    ConnectionDropped,
    /// The run failed with this error message.
    Failed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::StopRequested => f.write_str("Stop requested"),
            StopReason::ConnectionDropped => f.write_str("Connection dropped"),
            StopReason::Failed(message) => f.write_str(message),
        }
    }
}

/// Settings fixed at build time.
#[derive(Clone, Debug)]
pub(crate) struct ConsumerOptions {
    pub(crate) auto_reconnect: bool,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) decode: DecodeOptions,
    pub(crate) reconnect_on_decode_error: bool,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: defaults::AUTO_RECONNECT,
            backoff: BackoffPolicy::default(),
            read_timeout: None,
            decode: DecodeOptions::default(),
            reconnect_on_decode_error: defaults::RECONNECT_ON_DECODE_ERROR,
        }
    }
}

/// A long-lived consumer of one HTTP JSON stream.
///
/// Owns the connection and drives the connect, decode and reconnect cycle
/// on the task that calls [`start`](Self::start). Use a [`StopHandle`] to
/// end the run from elsewhere.
pub struct StreamConsumer<D: Dial = TcpDialer> {
    config: ConnectionConfig,
    options: ConsumerOptions,
    dialer: D,
    state: SharedState,
    transport: Transport<D::Io>,
    head: Option<ResponseHead>,
    stop_reason: Option<StopReason>,
    on_stop: Option<StopHook>,
    events: u64,
    reconnects: u64,
}

impl StreamConsumer<TcpDialer> {
    /// Start configuring a consumer for `config`.
    pub fn builder(config: ConnectionConfig) -> ConsumerBuilder<TcpDialer> {
        ConsumerBuilder::new(config)
    }

    /// A consumer with default settings.
    pub fn new(config: ConnectionConfig) -> Result<Self, ConsumerError> {
        ConsumerBuilder::new(config).build()
    }
}

impl<D: Dial> StreamConsumer<D> {
    pub(crate) fn from_parts(
        config: ConnectionConfig,
        dialer: D,
        options: ConsumerOptions,
        on_stop: Option<StopHook>,
    ) -> Self {
        Self {
            config,
            options,
            dialer,
            state: SharedState::new(),
            transport: Transport::closed(),
            head: None,
            stop_reason: None,
            on_stop,
            events: 0,
            reconnects: 0,
        }
    }

    /// Consume the stream, calling `on_event` once per JSON document in
    /// arrival order.
    ///
    /// Returns when the consumer stops. A consumer runs once; starting it
    /// again after it stopped is an error.
    pub async fn start<F>(&mut self, mut on_event: F) -> Result<StopReason, ConsumerError>
    where
        F: FnMut(Value),
    {
        self.run(Some(&mut on_event)).await
    }

    /// Consume the stream without a handler, only counting documents.
    ///
    /// Chunked responses are rejected in this mode.
    pub async fn start_detached(&mut self) -> Result<StopReason, ConsumerError> {
        self.run::<fn(Value)>(None).await
    }

    async fn run<F>(&mut self, mut on_event: Option<&mut F>) -> Result<StopReason, ConsumerError>
    where
        F: FnMut(Value) + ?Sized,
    {
        if self.state.get() == StreamState::Stopped {
            return Err(ConsumerError::Config(
                "consumer has already stopped".into(),
            ));
        }

        let result = self.supervise(&mut on_event).await;
        self.disconnect().await;

        let reason = match &result {
            Ok(()) if self.state.get() == StreamState::Stopping => StopReason::StopRequested,
            Ok(()) => StopReason::ConnectionDropped,
            Err(err) => StopReason::Failed(err.message().to_owned()),
        };
        self.state.finish();

        #[cfg(feature = "tracing")]
        tracing::info!(
            reason = %reason,
            events = self.events,
            reconnects = self.reconnects,
            "stream stopped"
        );

        self.stop_reason = Some(reason.clone());
        if let Some(on_stop) = self.on_stop.take() {
            on_stop(&reason);
        }
        result.map(|()| reason)
    }

    /// Connect, decode, and reconnect until the stream should stop.
    async fn supervise<F>(&mut self, on_event: &mut Option<&mut F>) -> Result<(), ConsumerError>
    where
        F: FnMut(Value) + ?Sized,
    {
        loop {
            if !self.transport.is_open() {
                if !self.state.begin_connecting() {
                    return Ok(());
                }
                let connector = Connector {
                    config: &self.config,
                    dialer: &self.dialer,
                    state: &self.state,
                    policy: &self.options.backoff,
                    read_timeout: self.options.read_timeout,
                };
                match connector.connect(&mut self.transport).await? {
                    ConnectOutcome::Connected(head) => self.head = Some(head),
                    ConnectOutcome::Aborted => return Ok(()),
                }
            }

            let head = self.head.clone().unwrap_or_default();
            let mut decoder = BodyDecoder::new(&self.options.decode, &self.state);
            let outcome = decoder
                .run(&mut self.transport, &head, on_event.as_deref_mut())
                .await;
            self.events += decoder.delivered();
            self.transport.close().await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(ConsumerError::Decode(_message)) if self.options.reconnect_on_decode_error => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_message, "dropping connection after decode error");
                    BodyOutcome::Ended
                }
                Err(err) => return Err(err),
            };

            match outcome {
                BodyOutcome::Stopped => return Ok(()),
                BodyOutcome::Ended | BodyOutcome::Dropped(_) => {
                    #[cfg(feature = "tracing")]
                    {
                        if let BodyOutcome::Dropped(err) = &outcome {
                            tracing::debug!(error = %err, "stream connection lost");
                        }
                    }
                    if self.options.auto_reconnect && self.state.is_running() {
                        self.reconnects += 1;
                        #[cfg(feature = "tracing")]
                        tracing::info!(reconnects = self.reconnects, "reconnecting stream");
                        continue;
                    }
                    return Ok(());
                }
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state.get()
    }

    /// A handle that can stop this consumer from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.state.clone())
    }

    /// Request a stop. Returns `false` if already stopping or stopped.
    pub fn stop(&self) -> bool {
        self.stop_handle().stop()
    }

    /// Why the last run ended, once it has.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop_reason.as_ref()
    }

    /// Head of the last successful connection.
    ///
    /// Kept after the run ends and replaced on each reconnect.
    pub fn response_head(&self) -> Option<&ResponseHead> {
        self.head.as_ref()
    }

    /// JSON documents decoded since the consumer was built.
    pub fn events_delivered(&self) -> u64 {
        self.events
    }

    /// Times a dropped stream was reopened.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Close the connection, if any. Returns `false` if none was open.
    pub async fn disconnect(&mut self) -> bool {
        self.transport.close().await
    }
}

impl<D: Dial> fmt::Debug for StreamConsumer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConsumer")
            .field("config", &self.config)
            .field("options", &self.options)
            .field("state", &self.state.get())
            .field("connected", &self.transport.is_open())
            .field("stop_reason", &self.stop_reason)
            .field("events", &self.events)
            .field("reconnects", &self.reconnects)
            .finish()
    }
}
