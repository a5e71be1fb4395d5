//! Remote execution channel contract.
//!
//! A [`RemoteChannel`] dials sessions; a [`RemoteSession`] runs one shell
//! command at a time and reports its exit status. The scheduler only ever
//! talks to a session through the
//! [`ConnectionManager`](crate::ConnectionManager).

use std::future::Future;
use std::time::Duration;

use crate::error::ChannelResult;

/// Factory for remote execution sessions (network dial + credential handshake).
pub trait RemoteChannel: Send + Sync + 'static {
    type Session: RemoteSession;

    /// Establish a new session. Implementations should give up after `timeout`.
    fn connect(&self, timeout: Duration) -> impl Future<Output = ChannelResult<Self::Session>> + Send;

    /// Short description of the remote end, for logs.
    fn describe(&self) -> String;
}

/// One live remote execution session.
pub trait RemoteSession: Send + 'static {
    /// Run `command` to completion and return its exit status.
    ///
    /// Fails with [`ChannelError::CommandTimeout`](crate::ChannelError::CommandTimeout)
    /// when the command does not finish within `timeout`; the session stays
    /// usable afterwards.
    fn exec(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> impl Future<Output = ChannelResult<i32>> + Send;

    /// Tear the session down.
    fn close(self) -> impl Future<Output = ()> + Send;
}
