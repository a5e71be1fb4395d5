//! ConnectionManager: one lazily established, shared remote session.
//!
//! All session access goes through a single async mutex. [`ensure`]
//! returns a [`SessionGuard`] that holds the mutex for the whole
//! acquire-execute-release cycle, so two callers never exchange bytes on
//! the same session and [`close`] cannot race an in-flight command.
//!
//! A failed dial (or a session lost mid-command) arms a reconnect backoff
//! window; until it expires `ensure` fails fast with
//! [`ChannelError::BackingOff`] instead of dialing again.
//!
//! [`ensure`]: ConnectionManager::ensure
//! [`close`]: ConnectionManager::close

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::{RemoteChannel, RemoteSession};
use crate::error::{ChannelError, ChannelResult};

struct Slot<S> {
    session: Option<S>,
    /// Earliest time the next dial may be attempted.
    retry_at: Option<Instant>,
}

/// Owner of the shared remote session.
pub struct ConnectionManager<C: RemoteChannel> {
    channel: C,
    connect_timeout: Duration,
    reconnect_backoff: Duration,
    slot: Mutex<Slot<C::Session>>,
}

/// Exclusive access to the live session, released on drop.
pub struct SessionGuard<'a, C: RemoteChannel> {
    slot: MutexGuard<'a, Slot<C::Session>>,
    reconnect_backoff: Duration,
}

impl<C: RemoteChannel> ConnectionManager<C> {
    pub fn new(channel: C, connect_timeout: Duration, reconnect_backoff: Duration) -> Self {
        Self {
            channel,
            connect_timeout,
            reconnect_backoff,
            slot: Mutex::new(Slot {
                session: None,
                retry_at: None,
            }),
        }
    }

    pub fn reconnect_backoff(&self) -> Duration {
        self.reconnect_backoff
    }

    /// Description of the remote end, for logs.
    pub fn describe(&self) -> String {
        self.channel.describe()
    }

    /// Return the active session, dialing one if needed.
    pub async fn ensure(&self) -> ChannelResult<SessionGuard<'_, C>> {
        let mut slot = self.slot.lock().await;
        if slot.session.is_none() {
            if let Some(retry_at) = slot.retry_at {
                let now = Instant::now();
                if now < retry_at {
                    return Err(ChannelError::BackingOff(retry_at - now));
                }
            }

            let dial = tokio::time::timeout(
                self.connect_timeout,
                self.channel.connect(self.connect_timeout),
            )
            .await
            .unwrap_or(Err(ChannelError::ConnectTimeout(self.connect_timeout)));

            match dial {
                Ok(session) => {
                    info!(target = %self.channel.describe(), "remote session established");
                    slot.session = Some(session);
                    slot.retry_at = None;
                }
                Err(e) => {
                    warn!(
                        target = %self.channel.describe(),
                        error = %e,
                        backoff = ?self.reconnect_backoff,
                        "remote session unavailable"
                    );
                    slot.retry_at = Some(Instant::now() + self.reconnect_backoff);
                    return Err(e);
                }
            }
        }
        Ok(SessionGuard {
            slot,
            reconnect_backoff: self.reconnect_backoff,
        })
    }

    /// Release the session. Waits for any in-flight command first.
    pub async fn close(&self) {
        let session = self.slot.lock().await.session.take();
        if let Some(session) = session {
            session.close().await;
            info!(target = %self.channel.describe(), "remote session closed");
        }
    }

    /// Whether a session is currently cached. Waits for in-flight commands.
    pub async fn is_connected(&self) -> bool {
        self.slot.lock().await.session.is_some()
    }
}

impl<C: RemoteChannel> SessionGuard<'_, C> {
    /// Run one command on the shared session.
    ///
    /// A fatal session error discards the session and arms the reconnect
    /// backoff; a timeout leaves the session in place.
    pub async fn execute(&mut self, command: &str, timeout: Duration) -> ChannelResult<i32> {
        let session = self
            .slot
            .session
            .as_mut()
            .ok_or_else(|| ChannelError::Disconnected("session already discarded".to_string()))?;

        let result = session.exec(command, timeout).await;
        if let Err(e) = &result {
            if e.is_session_fatal() {
                debug!(error = %e, "discarding broken session");
                self.slot.retry_at = Some(Instant::now() + self.reconnect_backoff);
                if let Some(broken) = self.slot.session.take() {
                    broken.close().await;
                }
            }
        }
        result
    }

    /// Whether the guarded session is still usable.
    pub fn is_live(&self) -> bool {
        self.slot.session.is_some()
    }
}
