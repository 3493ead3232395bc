//! # Client with Receive Loop
//!
//! This module provides the `Client` abstraction for issuing requests over a
//! shared transport. A background task continuously reads from the transport
//! and routes every response to its pending request via the correlation id.
//!
//! ## Request lifecycle
//!
//! 1. Draw an id and register a waiter under it.
//! 2. Encode and send the frame.
//! 3. Await the waiter, racing the timeout.
//!
//! The waiter is registered before the frame leaves, so a response can never
//! overtake its own registration. Once the client stops or its transport fails
//! the pending table is closed, so a request racing either one is failed with
//! that error instead of being left in a table nobody reads.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chainwire::ErrorCode;
use chainwire::ParsedResponse;
use chainwire::decode_response;
use chainwire::encode_request;
use tokio::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::pending::PendingError;
use crate::pending::PendingTable;
use crate::pending::PushQueue;
use crate::pending::Waiter;
use crate::settings::ClientSettings;
use crate::transport::Transport;
use crate::transport::TransportError;

/// How many ids are drawn before giving up on a collision-free one.
pub const ID_ATTEMPTS: usize = 8;

/// Outcome of a one-shot request: the service's error code (`None` on
/// success) and the response body (`None` when no response arrived in time).
pub type Reply = (Option<ErrorCode>, Option<Vec<u8>>);

/// The push notifications of an acknowledged subscription, in arrival order.
#[derive(Debug)]
pub struct Subscription {
    id: u32,
    queue: PushQueue,
}

impl Subscription {
    /// The correlation id the subscription was registered under.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Waits for the next push. Returns `None` once the subscription is
    /// closed or the client stops.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        self.queue.recv().await
    }

    /// Takes a push that is already queued, without waiting.
    pub fn try_next(&mut self) -> Option<Vec<u8>> {
        self.queue.try_recv().ok()
    }
}

/// Request/response client over a multiplexed transport.
///
/// Creating a client spawns its receive loop on the current tokio runtime, so
/// [`Client::new`] must be called from within one. Clients can be wrapped in
/// `Arc` to share them between tasks.
pub struct Client {
    transport: Arc<dyn Transport>,
    pending: Arc<PendingTable>,
    settings: ClientSettings,
    shutdown: watch::Sender<bool>,
    running: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Creates a client and starts its receive loop.
    pub fn new(transport: impl Transport, settings: ClientSettings) -> Self {
        Self::with_shared(Arc::new(transport), settings)
    }

    /// Like [`Client::new`], for a transport that is shared elsewhere too.
    pub fn with_shared(transport: Arc<dyn Transport>, settings: ClientSettings) -> Self {
        let pending = Arc::new(PendingTable::new());
        let (shutdown, stop_signal) = watch::channel(false);
        let running = Arc::new(AtomicBool::new(true));

        let pump = tokio::spawn(Self::receive_loop(
            transport.clone(),
            pending.clone(),
            stop_signal,
            running.clone(),
        ));

        Self {
            transport,
            pending,
            settings,
            shutdown,
            running,
            pump: Mutex::new(Some(pump)),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Number of requests and subscriptions still in the table.
    pub fn pending_count(&self) -> usize {
        self.pending.drain_count()
    }

    /// Whether the receive loop is still routing responses.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Reads frames until stopped or until the transport gives out.
    async fn receive_loop(
        transport: Arc<dyn Transport>,
        pending: Arc<PendingTable>,
        mut stop_signal: watch::Receiver<bool>,
        running: Arc<AtomicBool>,
    ) {
        let failure = loop {
            let received = tokio::select! {
                biased;
                // also fires when the client is dropped
                _ = stop_signal.changed() => {
                    debug!("receive loop stopped");
                    running.store(false, Ordering::Release);
                    return;
                }
                received = transport.recv() => received,
            };

            match received {
                Ok(Some(frame)) => match decode_response(frame) {
                    Ok(response) => {
                        let verdict = pending.dispatch(response);
                        trace!(?verdict, "frame dispatched");
                    }
                    Err(e) => warn!(error = %e, "dropping malformed frame"),
                },
                Ok(None) => break TransportError::Closed,
                Err(e) => break e,
            }
        };

        running.store(false, Ordering::Release);
        let failed = pending.fail_all(&Error::Transport(failure.clone()));
        error!(error = %failure, failed, "receive loop terminated by transport failure");
    }

    /// Stops the receive loop and reports how many entries were still pending.
    ///
    /// Those requests will never see a response; their callers are woken with
    /// [`Error::Stopped`]. No frame is dispatched once this returns.
    pub async fn stop(&self) -> usize {
        self.shutdown.send_replace(true);
        if let Some(pump) = self.pump.lock().await.take() {
            if let Err(e) = pump.await {
                warn!(error = %e, "receive loop ended abnormally");
            }
        }

        let abandoned = self.pending.fail_all(&Error::Stopped);
        info!(abandoned, "client stopped");
        abandoned
    }

    fn ensure_running(&self) -> Result<()> {
        if *self.shutdown.borrow() {
            return Err(Error::Stopped);
        }
        if !self.is_running() {
            return Err(Error::Transport(TransportError::Closed));
        }
        Ok(())
    }

    /// Sends a one-shot request using the configured timeout.
    pub async fn call(&self, command: &[u8], payload: &[u8]) -> Result<Reply> {
        self.call_with_timeout(command, payload, self.settings.timeout())
            .await
    }

    /// Sends a one-shot request and waits for its response.
    ///
    /// A request that outlives `timeout` resolves to
    /// `(Some(ErrorCode::ChannelTimeout), None)`; it is not an `Err`.
    pub async fn call_with_timeout(
        &self,
        command: &[u8],
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> Result<Reply> {
        self.ensure_running()?;
        let (id, waiter) = self.register_with(|id| self.pending.register(id, command))?;
        self.send(command, id, payload).await?;

        let Some(response) = self.await_response(id, waiter, timeout).await? else {
            return Ok((Some(ErrorCode::ChannelTimeout), None));
        };
        check_correlation(command, id, &response)?;
        Ok((response.error, Some(response.data)))
    }

    /// Opens a subscription using the configured timeout.
    pub async fn subscribe(
        &self,
        command: &[u8],
        payload: &[u8],
    ) -> Result<(Option<ErrorCode>, Option<Subscription>)> {
        self.subscribe_with_timeout(command, payload, self.settings.timeout())
            .await
    }

    /// Opens a subscription and waits for the service to acknowledge it.
    ///
    /// On acknowledgment the returned [`Subscription`] starts receiving every
    /// pushed body for its id. A rejected or timed out subscription is removed
    /// from the table and yields no queue.
    pub async fn subscribe_with_timeout(
        &self,
        command: &[u8],
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> Result<(Option<ErrorCode>, Option<Subscription>)> {
        self.ensure_running()?;
        let (id, (waiter, queue)) =
            self.register_with(|id| self.pending.register_subscription(id, command))?;
        self.send(command, id, payload).await?;

        let Some(ack) = self.await_response(id, waiter, timeout).await? else {
            return Ok((Some(ErrorCode::ChannelTimeout), None));
        };
        if let Err(e) = check_correlation(command, id, &ack) {
            self.pending.close_subscription(id);
            return Err(e);
        }
        if let Some(code) = ack.error {
            debug!(id, %code, "subscription rejected");
            self.pending.close_subscription(id);
            return Ok((Some(code), None));
        }

        debug!(id, "subscription acknowledged");
        Ok((None, Some(Subscription { id, queue })))
    }

    /// Asks the service to end a subscription.
    ///
    /// This is an ordinary one-shot request. The local entry stays in the
    /// table until the service sends its terminal frame, or until
    /// [`Client::cancel_subscription`] drops it.
    pub async fn unsubscribe(&self, command: &[u8], payload: &[u8]) -> Result<Reply> {
        self.call(command, payload).await
    }

    /// Drops the local entry of a subscription, closing its queue.
    ///
    /// Returns `false` if the subscription was already gone.
    pub fn cancel_subscription(&self, id: u32) -> bool {
        self.pending.close_subscription(id)
    }

    /// Draws ids until `register` accepts one.
    fn register_with<T>(
        &self,
        register: impl Fn(u32) -> std::result::Result<T, PendingError>,
    ) -> Result<(u32, T)> {
        for _ in 0..ID_ATTEMPTS {
            let id = self.settings.ids().next_id();
            match register(id) {
                Ok(registered) => return Ok((id, registered)),
                Err(PendingError::DuplicateId(id)) => {
                    debug!(id, "request id already pending, drawing another");
                }
                Err(PendingError::Closed(reason)) => return Err(reason),
            }
        }
        Err(Error::IdSpaceExhausted(ID_ATTEMPTS))
    }

    async fn send(&self, command: &[u8], id: u32, payload: &[u8]) -> Result<()> {
        // closed after registering: the entry was already failed, don't send
        if let Some(reason) = self.pending.closed_reason() {
            self.pending.remove(id);
            return Err(reason);
        }
        debug!(id, command = %String::from_utf8_lossy(command), "sending request");
        if let Err(e) = self.transport.send(encode_request(command, id, payload)).await {
            self.pending.remove(id);
            return Err(e.into());
        }
        Ok(())
    }

    /// Waits for the first frame of `id`. `Ok(None)` means it timed out.
    async fn await_response(
        &self,
        id: u32,
        mut waiter: Waiter,
        timeout: Option<Duration>,
    ) -> Result<Option<ParsedResponse>> {
        let Some(limit) = timeout else {
            return waiter.await.map_err(|_| Error::ChannelClosed)?.map(Some);
        };

        match tokio::time::timeout(limit, &mut waiter).await {
            Ok(resolved) => resolved.map_err(|_| Error::ChannelClosed)?.map(Some),
            Err(_) => {
                if self.pending.cancel(id) {
                    warn!(id, timeout_ms = limit.as_millis() as u64, "request timed out");
                    return Ok(None);
                }
                // The receive loop took the entry first, so the slot is
                // resolved or about to be.
                waiter.await.map_err(|_| Error::ChannelClosed)?.map(Some)
            }
        }
    }
}

/// A response is only ever routed by id; a differing command means the table
/// or the codec is broken.
fn check_correlation(command: &[u8], id: u32, response: &ParsedResponse) -> Result<()> {
    if response.id == id && response.command == command {
        return Ok(());
    }
    error!(
        id,
        response_id = response.id,
        command = %String::from_utf8_lossy(command),
        response_command = %response.command_lossy(),
        "response does not match its request"
    );
    Err(Error::ProtocolViolation(format!(
        "request {} '{}' answered by {} '{}'",
        id,
        String::from_utf8_lossy(command),
        response.id,
        response.command_lossy(),
    )))
}
