//! Connection manager and session event loop.
//!
//! The manager owns the session's single WebSocket connection, its
//! [`Session`] state and the [`Dispatcher`]. It runs as one tokio task that
//! handles, one turn at a time:
//!
//! - Inbound text frames, decoded and dispatched in arrival order
//! - Outbound envelopes queued by the session
//! - Host commands sent through a [`SessionHandle`]
//!
//! When the connection closes, the [`RetryPolicy`] decides whether a new
//! connection is opened. A reconnect starts from an empty session; host
//! work queued while reconnecting is applied to that new session.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::config::SessionConfig;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::identifiers::{CallbackId, HeapHandle, ObservableId};
use crate::script::{FunctionRef, ScriptEngine};
use crate::session::{HeapObject, Session};

use super::retry::{ABNORMAL_CLOSURE, NO_STATUS_RECEIVED};
use super::state::{ConnectionState, LifecycleEvent};
use super::url::websocket_url;
use super::RetryPolicy;

// ============================================================================
// Types
// ============================================================================

/// Client WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Work run against the session inside one turn.
type Job = Box<dyn FnOnce(&mut Session) + Send>;

/// Shared lifecycle state cell.
type StateCell = Arc<RwLock<ConnectionState>>;

// ============================================================================
// SessionCommand
// ============================================================================

/// Internal commands for the event loop.
enum SessionCommand {
    /// Run a job against the session.
    Run(Job),
    /// Close the connection and stop the session.
    Close,
}

// ============================================================================
// SessionHandle
// ============================================================================

/// Host-side handle to a running session.
///
/// Cloneable and `Send + Sync`. Every operation is queued as one turn on
/// the session task, so it never races with inbound envelopes. Between
/// connections, operations act on the session the next connection serves.
///
/// # Example
///
/// ```ignore
/// let handle = jscall::start(config, engine).await?;
/// handle.register_observable("volume", 3).await?;
/// let applied = handle.update("volume", 4).await?;
/// ```
#[derive(Clone)]
pub struct SessionHandle {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    /// Lifecycle state (shared with event loop).
    state: StateCell,
    /// Connection target.
    url: Url,
}

impl SessionHandle {
    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Returns the connection target.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns `true` once the session task has stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Runs `job` against the session as one turn and returns its result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the session task has stopped.
    pub async fn with_session<F, R>(&self, job: F) -> Result<R>
    where
        F: FnOnce(&mut Session) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();

        self.command_tx
            .send(SessionCommand::Run(Box::new(move |session: &mut Session| {
                let _ = result_tx.send(job(session));
            })))
            .map_err(|_| Error::ConnectionClosed)?;

        result_rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Applies a local update, see [`Session::update_local`].
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the session task has stopped
    /// - [`Error::NotConnected`] if the session is between connections
    pub async fn update(&self, id: impl Into<ObservableId>, value: impl Into<Value>) -> Result<bool> {
        let id = id.into();
        let value = value.into();
        self.with_session(move |session| session.update_local(id, value))
            .await?
    }

    /// Registers an observable locally with an initial value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the session task has stopped.
    pub async fn register_observable(
        &self,
        id: impl Into<ObservableId>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let id = id.into();
        let value = value.into();
        self.with_session(move |session| session.register_observable(id, value))
            .await
    }

    /// Returns the current value of an observable.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the session task has stopped
    /// - [`Error::ObservableNotFound`] if `id` is unknown
    pub async fn get_observable(&self, id: impl Into<ObservableId>) -> Result<Value> {
        let id = id.into();
        self.with_session(move |session| session.get(&id).cloned())
            .await?
    }

    /// Registers a local listener on an observable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the session task has stopped.
    pub async fn on_update(
        &self,
        id: impl Into<ObservableId>,
        function: FunctionRef,
    ) -> Result<CallbackId> {
        let id = id.into();
        self.with_session(move |session| session.register_callback(id, function))
            .await
    }

    /// Stores an object on the heap so the remote side can call or index it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the session task has stopped.
    pub async fn put_on_heap(
        &self,
        handle: impl Into<HeapHandle>,
        object: impl Into<HeapObject>,
    ) -> Result<()> {
        let handle = handle.into();
        let object = object.into();
        self.with_session(move |session| {
            session.heap_mut().put(handle, object);
        })
        .await
    }

    /// Returns a copy of a heap entry.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the session task has stopped
    /// - [`Error::HeapObjectNotFound`] if `handle` is unknown
    pub async fn heap_object(&self, handle: impl Into<HeapHandle>) -> Result<HeapObject> {
        let handle = handle.into();
        self.with_session(move |session| session.heap().get(&handle).cloned())
            .await?
    }

    /// Closes the connection and stops the session. No reconnect follows.
    pub fn close(&self) {
        let _ = self.command_tx.send(SessionCommand::Close);
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("url", &self.url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Owner of the session's connection and state.
pub struct ConnectionManager {
    /// Connection target.
    url: Url,
    /// Reconnect policy.
    retry: RetryPolicy,
    /// Lifecycle state (shared with handles).
    state: StateCell,
    /// Protocol state.
    session: Session,
    /// Inbound envelope router.
    dispatcher: Dispatcher,
    /// Commands from handles.
    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
}

impl ConnectionManager {
    /// Starts a session: connects once, then serves it on a spawned task.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] / [`Error::Url`] if no connection URL can be derived
    /// - [`Error::Connection`] if the first connection attempt fails
    pub async fn start(
        config: SessionConfig,
        engine: impl ScriptEngine + 'static,
    ) -> Result<SessionHandle> {
        let url = websocket_url(&config)?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state: StateCell = Arc::new(RwLock::new(ConnectionState::Disconnected));

        let mut manager = Self {
            url: url.clone(),
            retry: config.retry().clone(),
            state: Arc::clone(&state),
            session: Session::new(),
            dispatcher: Dispatcher::new(engine),
            command_rx,
        };

        let stream = manager.open().await?;
        tokio::spawn(manager.run(stream));

        Ok(SessionHandle {
            command_tx,
            state,
            url,
        })
    }

    /// Opens the connection.
    async fn open(&mut self) -> Result<WsStream> {
        transition(&self.state, LifecycleEvent::Start)?;
        debug!(url = %self.url, "Connecting");

        match connect_async(self.url.as_str()).await {
            Ok((stream, response)) => {
                debug!(status = %response.status(), "WebSocket handshake completed");
                transition(&self.state, LifecycleEvent::Handshake)?;
                Ok(stream)
            }
            Err(e) => {
                transition(&self.state, LifecycleEvent::TransportClosed)?;
                Err(Error::connection(format!("{}: {e}", self.url)))
            }
        }
    }

    /// Serves connections until the host closes or the policy gives up.
    async fn run(mut self, mut stream: WsStream) {
        loop {
            let Some(code) = self.serve(stream).await else {
                break;
            };
            match self.reconnect(code).await {
                Some(next) => stream = next,
                None => break,
            }
        }

        debug!("Session task terminated");
    }

    /// Reopens the connection after a close with `code`.
    ///
    /// `code` alone decides whether the sequence starts; failed attempts
    /// inside it only count against the policy's attempt limit. The session
    /// is reset before the first wait so host work queued meanwhile lands
    /// in the state the next connection serves.
    async fn reconnect(&mut self, code: u16) -> Option<WsStream> {
        if !self.retry.should_retry(code, 0) {
            debug!(code, "Not reconnecting");
            return None;
        }

        self.session = Session::new();
        let mut schedule = self.retry.schedule();
        let mut attempt: u32 = 0;

        while self.retry.should_retry(code, attempt) {
            let delay = schedule.next_backoff()?;
            attempt += 1;

            info!(code, attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
            if !self.idle(delay).await {
                return None;
            }

            match self.open().await {
                Ok(stream) => return Some(stream),
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Reconnect aborted");
                    return None;
                }
                Err(e) => warn!(error = %e, attempt, "Reconnect failed"),
            }
        }

        debug!(code, attempt, "Reconnect attempts exhausted");
        None
    }

    /// Runs the event loop on one open connection.
    ///
    /// Returns the close code, or `None` when the session must stop.
    async fn serve(&mut self, stream: WsStream) -> Option<u16> {
        let (mut ws_write, mut ws_read) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        self.session.attach(outbound_tx);

        info!(url = %self.url, "Session connected");

        let outcome = loop {
            tokio::select! {
                // Inbound envelopes
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.dispatcher.dispatch_text(&mut self.session, &text) {
                                error!(error = %e, "Fatal error while dispatching");
                                break None;
                            }
                        }

                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.map_or(NO_STATUS_RECEIVED, |f| u16::from(f.code));
                            debug!(code, "WebSocket closed by remote");
                            break Some(code);
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            let _ = transition(&self.state, LifecycleEvent::TransportError);
                            break Some(ABNORMAL_CLOSURE);
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break Some(ABNORMAL_CLOSURE);
                        }

                        // Ignore Binary, Ping, Pong
                        Some(Ok(_)) => {}
                    }
                }

                // Outbound envelopes
                Some(text) = outbound_rx.recv() => {
                    trace!(len = text.len(), "Sending envelope");
                    if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                        warn!(error = %e, "Failed to send envelope");
                    }
                }

                // Host commands
                command = self.command_rx.recv() => {
                    match command {
                        Some(SessionCommand::Run(job)) => job(&mut self.session),
                        Some(SessionCommand::Close) | None => {
                            debug!("Close requested by host");
                            break None;
                        }
                    }
                }
            }
        };

        self.session.detach();

        if outcome.is_none() {
            while let Ok(text) = outbound_rx.try_recv() {
                if ws_write.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_write.close().await;
        }

        if let Err(e) = transition(&self.state, LifecycleEvent::TransportClosed) {
            error!(error = %e, "Inconsistent lifecycle state on close");
        }
        info!(code = ?outcome, "Session disconnected");
        outcome
    }

    /// Waits out a backoff delay while still serving host commands.
    ///
    /// Returns `false` if the host closed the session meanwhile.
    async fn idle(&mut self, delay: Duration) -> bool {
        let timer = sleep(delay);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                () = &mut timer => return true,
                command = self.command_rx.recv() => {
                    match command {
                        Some(SessionCommand::Run(job)) => job(&mut self.session),
                        Some(SessionCommand::Close) | None => return false,
                    }
                }
            }
        }
    }
}

/// Applies a lifecycle event to the shared state cell.
fn transition(state: &RwLock<ConnectionState>, event: LifecycleEvent) -> Result<ConnectionState> {
    let mut state = state.write();
    let next = state.on(event)?;
    if next != *state {
        debug!(from = %*state, to = %next, ?event, "Connection state changed");
    }
    *state = next;
    Ok(next)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use crate::script::NativeEngine;

    fn handle(command_tx: mpsc::UnboundedSender<SessionCommand>) -> SessionHandle {
        SessionHandle {
            command_tx,
            state: Arc::new(RwLock::new(ConnectionState::Open)),
            url: Url::parse("ws://127.0.0.1:8081/s/").expect("url"),
        }
    }

    /// Serves jobs against a detached session until the channel closes.
    fn spawn_loop(mut command_rx: mpsc::UnboundedReceiver<SessionCommand>) {
        tokio::spawn(async move {
            let mut session = Session::new();
            while let Some(SessionCommand::Run(job)) = command_rx.recv().await {
                job(&mut session);
            }
        });
    }

    #[tokio::test]
    async fn test_handle_runs_jobs_in_order() {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        spawn_loop(command_rx);
        let handle = handle(command_tx);

        assert_ok!(handle.register_observable("x", 1).await);
        assert_eq!(assert_ok!(handle.get_observable("x").await), json!(1));
        assert_ok!(handle.put_on_heap(7_i64, json!([1, 2])).await);
        let object = assert_ok!(handle.heap_object(7_i64).await);
        assert_eq!(object.as_value(), Some(&json!([1, 2])));
    }

    #[tokio::test]
    async fn test_handle_update_while_detached() {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        spawn_loop(command_rx);
        let handle = handle(command_tx);

        assert_ok!(handle.register_observable("x", 1).await);
        let err = assert_err!(handle.update("x", 2).await);
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_handle_after_task_exit() {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        drop(command_rx);
        let handle = handle(command_tx);

        assert!(handle.is_closed());
        let err = assert_err!(handle.update("x", 1).await);
        assert!(matches!(err, Error::ConnectionClosed));
        handle.close();
    }

    #[test]
    fn test_transition_updates_cell() {
        let cell = RwLock::new(ConnectionState::Disconnected);
        assert_eq!(
            transition(&cell, LifecycleEvent::Start).expect("start"),
            ConnectionState::Connecting
        );
        assert_eq!(*cell.read(), ConnectionState::Connecting);
    }

    #[test]
    fn test_transition_rejects_second_connection() {
        let cell = RwLock::new(ConnectionState::Open);
        let err = transition(&cell, LifecycleEvent::Start).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation { .. }));
        assert_eq!(*cell.read(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_start_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let config = SessionConfig::new("s").with_page_url(format!("http://127.0.0.1:{port}/"));
        let err = ConnectionManager::start(config, NativeEngine::new())
            .await
            .unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_start_invalid_config() {
        let config = SessionConfig::new("a/b");
        let err = ConnectionManager::start(config, NativeEngine::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
