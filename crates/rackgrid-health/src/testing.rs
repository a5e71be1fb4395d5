//! Scripted [`RemoteChannel`] for tests.
//!
//! Commands are matched to a device by their last whitespace-separated
//! token, so a probe template such as `probe {ip}` lets tests script exit
//! statuses per address.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::channel::{RemoteChannel, RemoteSession};
use crate::error::{ChannelError, ChannelResult};

#[derive(Default)]
struct Script {
    unreachable: bool,
    connect_delay: Duration,
    exec_delay: Duration,
    queued: HashMap<String, VecDeque<i32>>,
    fallback: HashMap<String, i32>,
    hung: HashSet<String>,
    commands: Vec<String>,
}

#[derive(Default)]
struct Inner {
    script: Mutex<Script>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    generation: AtomicU64,
}

/// In-memory channel whose sessions answer from a script.
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    inner: Arc<Inner>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.inner
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make new dials succeed or fail.
    pub fn set_reachable(&self, reachable: bool) {
        self.script().unreachable = !reachable;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.script().connect_delay = delay;
    }

    pub fn set_exec_delay(&self, delay: Duration) {
        self.script().exec_delay = delay;
    }

    /// Queue exit statuses for `address`, consumed one per probe.
    pub fn script_statuses(&self, address: &str, statuses: impl IntoIterator<Item = i32>) {
        self.script()
            .queued
            .entry(address.to_string())
            .or_default()
            .extend(statuses);
    }

    /// Exit status used for `address` once its queue is empty (default 0).
    pub fn set_status(&self, address: &str, status: i32) {
        self.script().fallback.insert(address.to_string(), status);
    }

    /// Probes of `address` never finish and hit their timeout.
    pub fn hang(&self, address: &str) {
        self.script().hung.insert(address.to_string());
    }

    /// Break every session handed out so far.
    pub fn drop_sessions(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every command sent, in order, including ones sent to dropped sessions.
    pub fn commands(&self) -> Vec<String> {
        self.script().commands.clone()
    }

    /// Number of commands aimed at `address`.
    pub fn probes_of(&self, address: &str) -> usize {
        self.script()
            .commands
            .iter()
            .filter(|c| target_of(c) == address)
            .count()
    }
}

fn target_of(command: &str) -> &str {
    command.split_whitespace().last().unwrap_or_default()
}

impl RemoteChannel for ScriptedChannel {
    type Session = ScriptedSession;

    async fn connect(&self, _timeout: Duration) -> ChannelResult<ScriptedSession> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        let (delay, unreachable) = {
            let script = self.script();
            (script.connect_delay, script.unreachable)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if unreachable {
            return Err(ChannelError::Connect("scripted host unreachable".to_string()));
        }
        Ok(ScriptedSession {
            channel: self.clone(),
            generation: self.inner.generation.load(Ordering::SeqCst),
        })
    }

    fn describe(&self) -> String {
        "scripted channel".to_string()
    }
}

/// Session handed out by [`ScriptedChannel`].
pub struct ScriptedSession {
    channel: ScriptedChannel,
    generation: u64,
}

impl RemoteSession for ScriptedSession {
    async fn exec(&mut self, command: &str, timeout: Duration) -> ChannelResult<i32> {
        let inner = &self.channel.inner;
        self.channel.script().commands.push(command.to_string());
        if inner.generation.load(Ordering::SeqCst) != self.generation {
            return Err(ChannelError::Disconnected("scripted session dropped".to_string()));
        }

        let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let address = target_of(command).to_string();
        let (hung, delay, status) = {
            let mut script = self.channel.script();
            let queued = script.queued.get_mut(&address).and_then(VecDeque::pop_front);
            let status =
                queued.unwrap_or_else(|| script.fallback.get(&address).copied().unwrap_or(0));
            (script.hung.contains(&address), script.exec_delay, status)
        };

        let result = if hung {
            tokio::time::sleep(timeout).await;
            Err(ChannelError::CommandTimeout(timeout))
        } else {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(status)
        };
        inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn close(self) {
        self.channel.inner.closes.fetch_add(1, Ordering::SeqCst);
    }
}
