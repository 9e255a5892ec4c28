//! Scripted feed transport with fault injection.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;
use tradefall_env::{EnvError, FeedTransport};

/// How the current connection is doing.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkState {
    Disconnected,
    Open,
    /// Deliver what is queued, then report a peer close
    Closing,
    /// Deliver what is queued, then report a read error
    Failing(String),
}

#[derive(Debug)]
struct FeedState {
    link: LinkState,
    frames: VecDeque<String>,
    refuse_remaining: u32,
    connect_attempts: u32,
    connections: u32,
    sent: Vec<String>,
    accepted: u64,
    rejected: u64,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            link: LinkState::Disconnected,
            frames: VecDeque::new(),
            refuse_remaining: 0,
            connect_attempts: 0,
            connections: 0,
            sent: Vec::new(),
            accepted: 0,
            rejected: 0,
        }
    }
}

/// Harness-side handle driving a [`ScriptedTransport`].
///
/// Frames pushed while no connection is open are rejected, as a real
/// exchange would not buffer them for a disconnected client.
#[derive(Clone)]
pub struct FeedController {
    state: Arc<Mutex<FeedState>>,
    wake: Arc<Notify>,
}

impl FeedController {
    /// Creates a controller and the transport it drives.
    pub fn new() -> (Self, ScriptedTransport) {
        let controller = Self {
            state: Arc::new(Mutex::new(FeedState::default())),
            wake: Arc::new(Notify::new()),
        };
        let transport = ScriptedTransport {
            controller: controller.clone(),
        };
        (controller, transport)
    }

    /// Offers a frame to the open connection. Returns false if nobody is listening.
    pub fn push(&self, frame: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        if state.link != LinkState::Open {
            state.rejected += 1;
            return false;
        }
        state.frames.push_back(frame.into());
        state.accepted += 1;
        drop(state);
        self.wake.notify_one();
        true
    }

    /// Peer closes the connection once queued frames are delivered.
    pub fn drop_connection(&self) {
        self.end_link(LinkState::Closing);
    }

    /// Connection errors out once queued frames are delivered.
    pub fn fail_connection(&self, reason: impl Into<String>) {
        self.end_link(LinkState::Failing(reason.into()));
    }

    fn end_link(&self, next: LinkState) {
        let mut state = self.state.lock();
        if state.link == LinkState::Open {
            state.link = next;
        }
        drop(state);
        self.wake.notify_one();
    }

    /// Refuses the next `count` connect attempts.
    pub fn refuse_connections(&self, count: u32) {
        self.state.lock().refuse_remaining += count;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().link == LinkState::Open
    }

    /// Frames queued but not yet read by the listener.
    pub fn pending(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().connect_attempts
    }

    pub fn connections(&self) -> u32 {
        self.state.lock().connections
    }

    /// Every text frame the listener sent (subscribe directives).
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Frames accepted and rejected by [`FeedController::push`].
    pub fn push_counts(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.accepted, state.rejected)
    }
}

/// Listener-side end of the scripted feed.
pub struct ScriptedTransport {
    controller: FeedController,
}

#[async_trait]
impl FeedTransport for ScriptedTransport {
    async fn connect(&mut self) -> Result<(), EnvError> {
        let mut state = self.controller.state.lock();
        state.connect_attempts += 1;
        if state.refuse_remaining > 0 {
            state.refuse_remaining -= 1;
            return Err(EnvError::connection("connection refused (scripted)"));
        }
        state.link = LinkState::Open;
        state.frames.clear();
        state.connections += 1;
        Ok(())
    }

    async fn send_text(&mut self, text: String) -> Result<(), EnvError> {
        let mut state = self.controller.state.lock();
        if state.link != LinkState::Open {
            return Err(EnvError::NotConnected);
        }
        state.sent.push(text);
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String, EnvError>> {
        loop {
            let woken = self.controller.wake.notified();
            {
                let mut state = self.controller.state.lock();
                if state.link == LinkState::Disconnected {
                    return None;
                }
                if let Some(frame) = state.frames.pop_front() {
                    return Some(Ok(frame));
                }
                match state.link.clone() {
                    LinkState::Closing => {
                        state.link = LinkState::Disconnected;
                        return None;
                    }
                    LinkState::Failing(reason) => {
                        state.link = LinkState::Disconnected;
                        return Some(Err(EnvError::receive(reason)));
                    }
                    LinkState::Open | LinkState::Disconnected => {}
                }
            }
            woken.await;
        }
    }

    async fn close(&mut self) {
        let mut state = self.controller.state.lock();
        state.link = LinkState::Disconnected;
        state.frames.clear();
    }

    fn describe(&self) -> String {
        "scripted://trade-feed".to_string()
    }
}
