//! Automatic client reconnection.
//!
//! ```text
//!   enter ──initial_delay──→ tick ──→ ask directory ──Ready──→ start_client ──ok──→ await connect
//!                             ↑            │                       │                    │
//!                             │          Retry                   error        timeout / unexplained drop
//!                             └─retry_delay┴───────────────────────┴────────────────────┘
//! ```
//!
//! Each tick is one attempt. Once `max_attempts` have failed, or the
//! directory says the session is gone for good, the client publishes
//! `GenericDisconnect` and goes offline.

use std::sync::Arc;

use tether_protocol::{ConnectStatus, ReconnectProgress};
use tether_session::SessionDirectory;
use tether_timer::RetryTimer;
use tether_transport::{PeerId, Transport};
use tracing::{debug, info, warn};

use super::{ClientConnected, ConnectionState, Flow, StateHooks, StateKind, online};
use crate::context::{Context, InternalEvent};
use crate::{ConnectionMethod, Reconnection};

/// Where the current attempt is. Completions that don't match the phase
/// belong to an attempt that was already written off and are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Delay timer running before the next attempt.
    Waiting,
    /// Directory lookup in flight.
    Resolving,
    /// `start_client` in flight.
    Starting,
    /// Started; connect timeout running.
    AwaitingConnect,
}

pub(crate) struct ClientReconnecting {
    method: ConnectionMethod,
    /// Attempts made so far (1-based once the first tick fires).
    attempt: u32,
    phase: Phase,
    delay: RetryTimer,
    timeout: RetryTimer,
}

impl ClientReconnecting {
    pub(crate) fn new(method: ConnectionMethod) -> Self {
        Self {
            method,
            attempt: 0,
            phase: Phase::Waiting,
            delay: RetryTimer::new(),
            timeout: RetryTimer::new(),
        }
    }

    /// Counts the current attempt as failed and schedules the next one, or
    /// gives up if none are left.
    fn retry<T, D>(&mut self, cx: &mut Context<T, D>) -> Flow {
        let next = self.attempt + 1;
        if !cx.config.reconnect.allows(next) {
            return self.give_up(cx);
        }
        self.phase = Phase::Waiting;
        let after = cx.config.reconnect.delay_for(next);
        debug!(next, ?after, "reconnect attempt failed, waiting");
        cx.schedule(&mut self.delay, after, InternalEvent::ReconnectTick);
        Flow::Stay
    }

    fn give_up<T, D>(&self, cx: &mut Context<T, D>) -> Flow {
        warn!(attempts = self.attempt, "giving up reconnecting");
        online::fail(cx, ConnectStatus::GenericDisconnect)
    }

    fn attempting(&self) -> bool {
        matches!(self.phase, Phase::Starting | Phase::AwaitingConnect)
    }
}

impl StateHooks for ClientReconnecting {
    const KIND: StateKind = StateKind::ClientReconnecting;

    fn enter<T: Transport, D: SessionDirectory>(&mut self, cx: &mut Context<T, D>) -> Flow {
        self.retry(cx)
    }

    fn exit<T: Transport, D: SessionDirectory>(&mut self, _cx: &mut Context<T, D>) {
        self.delay.cancel();
        self.timeout.cancel();
    }

    fn on_internal<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        event: InternalEvent,
    ) -> Flow {
        match (self.phase, event) {
            (Phase::Waiting, InternalEvent::ReconnectTick) => {
                self.attempt += 1;
                let max = cx.config.reconnect.max_attempts;
                if !cx.config.reconnect.allows(self.attempt) {
                    return self.give_up(cx);
                }
                info!(attempt = self.attempt, max, "reconnect attempt");
                cx.publish_progress(ReconnectProgress {
                    attempt: self.attempt,
                    max,
                });

                self.phase = Phase::Resolving;
                let method = self.method.clone();
                let directory = Arc::clone(&cx.directory);
                cx.spawn(async move {
                    InternalEvent::Reconnection(method.resolve_reconnection(&*directory).await)
                });
                Flow::Stay
            }
            (Phase::Resolving, InternalEvent::Reconnection(outcome)) => match outcome {
                Reconnection::Ready(coordinates) => {
                    debug!(%coordinates, "session located, connecting");
                    self.method.set_coordinates(coordinates);
                    self.phase = Phase::Starting;
                    let method = self.method.clone();
                    let transport = Arc::clone(&cx.transport);
                    cx.spawn(async move {
                        InternalEvent::ClientStarted(method.setup_client(&*transport).await)
                    });
                    Flow::Stay
                }
                Reconnection::Retry => self.retry(cx),
                Reconnection::Abandon => self.give_up(cx),
            },
            (Phase::Starting, InternalEvent::ClientStarted(Ok(()))) => {
                self.phase = Phase::AwaitingConnect;
                let after = cx.config.connect_timeout;
                cx.schedule(&mut self.timeout, after, InternalEvent::ConnectTimeout);
                Flow::Stay
            }
            (Phase::Starting, InternalEvent::ClientStarted(Err(e))) => {
                warn!(attempt = self.attempt, error = %e, "reconnect start failed");
                self.retry(cx)
            }
            (Phase::AwaitingConnect, InternalEvent::ConnectTimeout) => {
                warn!(attempt = self.attempt, "reconnect timed out");
                // Drop the half-open connection before the next attempt.
                cx.begin_teardown();
                self.retry(cx)
            }
            (phase, event) => {
                debug!(?phase, ?event, "stale reconnect event ignored");
                Flow::Stay
            }
        }
    }

    fn on_peer_connected<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        peer: PeerId,
    ) -> Flow {
        if !self.attempting() || !cx.is_local(peer) {
            return Flow::Stay;
        }
        info!(attempt = self.attempt, "reconnected");
        cx.publish(ConnectStatus::Success);
        Flow::Goto(ConnectionState::ClientConnected(ClientConnected::new(
            self.method.clone(),
        )))
    }

    fn on_peer_disconnected<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
        peer: PeerId,
        reason: &str,
    ) -> Flow {
        if !self.attempting() || !cx.is_local(peer) {
            debug!(%peer, "disconnect outside an attempt ignored");
            return Flow::Stay;
        }
        match ConnectStatus::from_reason(reason) {
            Some(status) => {
                info!(%status, "host refused reconnect");
                online::fail(cx, status)
            }
            None => {
                self.timeout.cancel();
                self.retry(cx)
            }
        }
    }

    fn on_transport_failure<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
    ) -> Flow {
        online::on_transport_failure(cx)
    }

    fn on_user_requested_shutdown<T: Transport, D: SessionDirectory>(
        &mut self,
        cx: &mut Context<T, D>,
    ) -> Flow {
        online::on_user_requested_shutdown(cx)
    }
}
