//! Chat widget channel controller
//!
//! Owns the widget's connection lifecycle: connect when the widget opens,
//! disconnect when it closes, reconnect once per drop while it stays open,
//! and answer locally when no channel is available.

use std::sync::Arc;
use std::time::Duration;

use brick_core::{ChatMessage, Envelope, Language, NewChatMessage, AI_CONTEXT_OFFLINE};
use brick_responder::KeywordResponder;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::origin::channel_url;
use crate::transport::{Connector, TransportEvent, TransportPair};

/// Controller timings and identity
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Channel URL, usually from [`channel_url`]
    pub url: String,
    /// Identifier sent with `join` and every `chat`
    pub user_id: String,
    pub reconnect_delay: Duration,
    pub typing_timeout: Duration,
    /// Delay before the local reply while disconnected
    pub fallback_delay: Duration,
}

impl ControllerSettings {
    pub fn new(url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_id: user_id.into(),
            reconnect_delay: Duration::from_secs(3),
            typing_timeout: Duration::from_secs(3),
            fallback_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    Closed,
    Connecting,
    Open,
}

/// Observable widget state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatView {
    pub connected: bool,
    pub messages: Vec<ChatMessage>,
    pub typing: bool,
}

struct State {
    phase: ChannelPhase,
    widget_open: bool,
    /// Bumped on every connect attempt and on close; events from older
    /// attempts are ignored
    generation: u64,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    channel_task: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    typing_expiry: Option<JoinHandle<()>>,
    fallbacks: Vec<JoinHandle<()>>,
}

struct Inner {
    settings: ControllerSettings,
    connector: Arc<dyn Connector>,
    keyword: KeywordResponder,
    state: Mutex<State>,
    view: watch::Sender<ChatView>,
}

/// Handle to the widget's channel; clones share state
#[derive(Clone)]
pub struct ChannelController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChannelController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ChannelController")
            .field("url", &self.inner.settings.url)
            .field("user_id", &self.inner.settings.user_id)
            .field("phase", &state.phase)
            .field("widget_open", &state.widget_open)
            .finish()
    }
}

impl ChannelController {
    pub fn new(settings: ControllerSettings, connector: Arc<dyn Connector>) -> Self {
        let (view, _) = watch::channel(ChatView::default());
        Self {
            inner: Arc::new(Inner {
                settings,
                connector,
                keyword: KeywordResponder::new(),
                state: Mutex::new(State {
                    phase: ChannelPhase::Closed,
                    widget_open: false,
                    generation: 0,
                    outgoing: None,
                    channel_task: None,
                    reconnect: None,
                    typing_expiry: None,
                    fallbacks: Vec::new(),
                }),
                view,
            }),
        }
    }

    /// Build a controller for the page at `origin`
    pub fn for_origin(
        origin: &str,
        user_id: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let url = channel_url(origin)?;
        Ok(Self::new(ControllerSettings::new(url, user_id), connector))
    }

    /// Widget opened: connect unless already connecting or open
    pub fn open(&self) {
        let mut state = self.inner.state.lock();
        state.widget_open = true;
        if state.phase != ChannelPhase::Closed {
            return;
        }
        if let Some(pending) = state.reconnect.take() {
            pending.abort();
        }
        self.inner.start_connect(&mut state);
    }

    /// Widget closed: drop the channel and cancel every pending timer
    pub fn close(&self) {
        {
            let mut state = self.inner.state.lock();
            state.widget_open = false;
            state.generation += 1;
            state.phase = ChannelPhase::Closed;
            state.outgoing = None;
            for task in [
                state.channel_task.take(),
                state.reconnect.take(),
                state.typing_expiry.take(),
            ]
            .into_iter()
            .flatten()
            {
                task.abort();
            }
            for task in state.fallbacks.drain(..) {
                task.abort();
            }
        }
        self.inner.view.send_if_modified(|view| {
            let changed = view.connected || view.typing;
            view.connected = false;
            view.typing = false;
            changed
        });
        debug!(url = %self.inner.settings.url, "Chat channel closed");
    }

    /// Send a chat turn.
    ///
    /// While connected the server echo is the only record of the turn.
    /// Otherwise, or when the transport refuses the frame, the turn is
    /// appended locally and followed by a keyword reply after the fallback
    /// delay.
    pub fn send_chat(&self, text: &str, language: Language) -> Result<()> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let user_id = self.inner.settings.user_id.clone();

        let outgoing = {
            let state = self.inner.state.lock();
            match state.phase {
                ChannelPhase::Open if self.inner.view.borrow().connected => {
                    state.outgoing.clone()
                }
                _ => None,
            }
        };
        if let Some(outgoing) = outgoing {
            let frame = Envelope::chat(text, Some(user_id.clone()), Some(language)).encode()?;
            if outgoing.send(frame).is_ok() {
                return Ok(());
            }
            debug!("Transport already closed, answering locally");
        }

        let user_turn = ChatMessage::local(NewChatMessage::user(Some(user_id.clone()), text));
        self.inner
            .view
            .send_modify(|view| view.messages.push(user_turn));

        let reply = self.inner.keyword.reply_for(text, language);
        let delay = self.inner.settings.fallback_delay;
        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let ai_turn = ChatMessage::local(NewChatMessage::ai(
                Some(user_id),
                reply,
                AI_CONTEXT_OFFLINE,
            ));
            inner.view.send_modify(|view| view.messages.push(ai_turn));
        });

        let mut state = self.inner.state.lock();
        state.fallbacks.retain(|task| !task.is_finished());
        state.fallbacks.push(task);
        Ok(())
    }

    /// Current observable state
    pub fn view(&self) -> ChatView {
        self.inner.view.borrow().clone()
    }

    /// Receive a notification on every state change
    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.inner.view.subscribe()
    }

    pub fn phase(&self) -> ChannelPhase {
        self.inner.state.lock().phase
    }

    pub fn is_widget_open(&self) -> bool {
        self.inner.state.lock().widget_open
    }

    pub fn url(&self) -> &str {
        &self.inner.settings.url
    }
}

impl Inner {
    fn start_connect(self: &Arc<Self>, state: &mut State) {
        if let Some(stale) = state.channel_task.take() {
            stale.abort();
        }
        state.phase = ChannelPhase::Connecting;
        state.generation += 1;
        let generation = state.generation;
        let inner = self.clone();
        state.channel_task = Some(tokio::spawn(async move {
            inner.run_channel(generation).await;
        }));
    }

    async fn run_channel(self: Arc<Self>, generation: u64) {
        debug!(url = %self.settings.url, generation, "Connecting chat channel");
        let pair = match self.connector.connect(&self.settings.url).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(url = %self.settings.url, "Chat channel connect failed: {}", e);
                self.on_closed(generation);
                return;
            }
        };

        let TransportPair {
            outgoing,
            mut incoming,
        } = pair;
        if !self.on_open(generation, outgoing) {
            return;
        }

        while let Some(event) = incoming.recv().await {
            match event {
                TransportEvent::Frame(text) => self.handle_frame(&text),
                TransportEvent::Error(e) => {
                    warn!(url = %self.settings.url, "Chat channel error: {}", e);
                    self.on_error(generation);
                }
                TransportEvent::Closed => break,
            }
        }
        self.on_closed(generation);
    }

    fn on_open(&self, generation: u64, outgoing: mpsc::UnboundedSender<String>) -> bool {
        {
            let mut state = self.state.lock();
            if state.generation != generation || !state.widget_open {
                return false;
            }
            match Envelope::join(self.settings.user_id.clone()).encode() {
                Ok(frame) => {
                    let _ = outgoing.send(frame);
                }
                Err(e) => warn!("Failed to encode join: {}", e),
            }
            state.phase = ChannelPhase::Open;
            state.outgoing = Some(outgoing);
        }
        self.set_connected(true);
        info!(url = %self.settings.url, user_id = %self.settings.user_id, "Chat channel open");
        true
    }

    /// Stop using the channel; reconnecting waits for its `Closed`
    fn on_error(&self, generation: u64) {
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.phase = ChannelPhase::Closed;
            state.outgoing = None;
        }
        self.set_connected(false);
    }

    fn on_closed(self: &Arc<Self>, generation: u64) {
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.phase = ChannelPhase::Closed;
            state.outgoing = None;
            state.channel_task = None;
            if state.widget_open && state.reconnect.is_none() {
                self.schedule_reconnect(&mut state);
            }
        }
        self.set_connected(false);
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut State) {
        let delay = self.settings.reconnect_delay;
        debug!(url = %self.settings.url, "Reconnecting in {:?}", delay);
        let inner = self.clone();
        state.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = inner.state.lock();
            state.reconnect = None;
            if state.widget_open && state.phase == ChannelPhase::Closed {
                inner.start_connect(&mut state);
            }
        }));
    }

    fn handle_frame(self: &Arc<Self>, text: &str) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.on_error_envelope(&format!("malformed frame: {}", e));
                return;
            }
        };

        match envelope {
            Envelope::Message(message) => {
                self.cancel_typing();
                self.view.send_modify(|view| {
                    view.messages.push(message);
                    view.typing = false;
                });
            }
            Envelope::History(history) => {
                self.view.send_modify(|view| {
                    for message in history.messages {
                        if !view.messages.iter().any(|seen| seen.id == message.id) {
                            view.messages.push(message);
                        }
                    }
                });
            }
            Envelope::Typing => self.show_typing(),
            Envelope::Error(error) => self.on_error_envelope(&error.message),
            Envelope::Pong => debug!("Pong received"),
            other @ (Envelope::Join(_) | Envelope::Chat(_) | Envelope::Ping) => {
                debug!("Ignoring unexpected '{}' envelope", other.kind());
            }
        }
    }

    /// Error reported by the server or a frame that failed to decode
    fn on_error_envelope(&self, message: &str) {
        warn!("Chat channel error: {}", message);
        self.cancel_typing();
        self.view.send_if_modified(|view| {
            let changed = view.typing;
            view.typing = false;
            changed
        });
    }

    fn show_typing(self: &Arc<Self>) {
        let timeout = self.settings.typing_timeout;
        let inner = self.clone();
        let expiry = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            inner.view.send_if_modified(|view| {
                let changed = view.typing;
                view.typing = false;
                changed
            });
        });
        if let Some(previous) = self.state.lock().typing_expiry.replace(expiry) {
            previous.abort();
        }
        self.view.send_if_modified(|view| {
            let changed = !view.typing;
            view.typing = true;
            changed
        });
    }

    fn cancel_typing(&self) {
        if let Some(expiry) = self.state.lock().typing_expiry.take() {
            expiry.abort();
        }
    }

    fn set_connected(&self, connected: bool) {
        self.view.send_if_modified(|view| {
            let changed = view.connected != connected;
            view.connected = connected;
            changed
        });
    }
}
