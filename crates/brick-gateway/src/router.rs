//! Envelope routing
//!
//! Dispatches decoded envelopes for one connection, keeps the session
//! registry consistent and runs the liveness sweep.

use std::sync::Arc;
use std::time::Duration;

use brick_core::{ChatData, Envelope, JoinData, NewChatMessage, AI_CONTEXT_RESPONSE};
use brick_responder::{GuardedResponder, ResponseGenerator};
use brick_session::MessageLog;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionHandle, ConnectionPool};
use crate::session::SessionRegistry;

/// Tunables for envelope handling
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Turns sent back on `join`
    pub history_limit: usize,
    /// Lower bound of the AI reply delay
    pub reply_delay_min: Duration,
    /// Upper bound (exclusive) of the AI reply delay
    pub reply_delay_max: Duration,
    /// Budget for one response generation
    pub responder_timeout: Duration,
    /// Close the old channel when a user joins elsewhere
    pub close_superseded: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            history_limit: 20,
            reply_delay_min: Duration::from_millis(1000),
            reply_delay_max: Duration::from_millis(3000),
            responder_timeout: Duration::from_secs(5),
            close_superseded: false,
        }
    }
}

impl RouterSettings {
    fn reply_delay(&self) -> Duration {
        if self.reply_delay_max <= self.reply_delay_min {
            return self.reply_delay_min;
        }
        rand::thread_rng().gen_range(self.reply_delay_min..self.reply_delay_max)
    }
}

/// Result of one liveness sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub evicted: usize,
}

/// Routes inbound envelopes and owns the shared chat state
pub struct ChatRouter {
    settings: RouterSettings,
    registry: Arc<SessionRegistry>,
    pool: Arc<ConnectionPool>,
    log: Arc<dyn MessageLog>,
    responder: GuardedResponder,
}

impl std::fmt::Debug for ChatRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRouter")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("pool", &self.pool)
            .field("responder", &self.responder)
            .finish()
    }
}

impl ChatRouter {
    pub fn new(
        settings: RouterSettings,
        pool: Arc<ConnectionPool>,
        log: Arc<dyn MessageLog>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Self {
        let responder = GuardedResponder::new(generator, settings.responder_timeout);
        Self {
            settings,
            registry: Arc::new(SessionRegistry::new()),
            pool,
            log,
            responder,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn log(&self) -> &Arc<dyn MessageLog> {
        &self.log
    }

    /// Register a freshly accepted, still anonymous connection
    pub fn accept(&self, conn: &ConnectionHandle) {
        conn.mark_alive();
        self.pool.add(conn.clone());
        metrics::counter!("brick_connections_accepted_total").increment(1);
        metrics::gauge!("brick_connections_active").set(self.pool.count() as f64);
        debug!(connection_id = %conn.id, addr = %conn.addr, "Connection accepted");
    }

    /// Decode one text frame and dispatch it.
    ///
    /// Frames that fail to decode are answered with a single `error`
    /// envelope; the connection stays open.
    pub async fn handle_frame(&self, conn: &ConnectionHandle, text: &str) {
        match Envelope::decode(text) {
            Ok(envelope) => self.handle_envelope(conn, envelope).await,
            Err(e) => {
                warn!(connection_id = %conn.id, "Invalid frame: {}", e);
                self.reject(conn, e.to_string());
            }
        }
    }

    pub async fn handle_envelope(&self, conn: &ConnectionHandle, envelope: Envelope) {
        match envelope {
            Envelope::Join(data) => self.handle_join(conn, data).await,
            Envelope::Chat(data) => self.handle_chat(conn, data).await,
            Envelope::Typing => self.handle_typing(conn),
            Envelope::Ping => self.deliver(conn, Envelope::Pong),
            Envelope::Error(data) => {
                warn!(connection_id = %conn.id, "Client reported error: {}", data.message);
            }
            other @ (Envelope::Pong | Envelope::Message(_) | Envelope::History(_)) => {
                self.reject(
                    conn,
                    format!(
                        "Envelope type '{}' cannot be sent by clients",
                        other.kind()
                    ),
                );
            }
        }
    }

    /// Send an `error` envelope back to the originator
    pub fn reject(&self, conn: &ConnectionHandle, message: impl Into<String>) {
        metrics::counter!("brick_envelopes_rejected_total").increment(1);
        self.deliver(conn, Envelope::error(message));
    }

    fn deliver(&self, conn: &ConnectionHandle, envelope: Envelope) {
        if let Err(e) = conn.send(envelope) {
            debug!(connection_id = %conn.id, "Dropped outbound envelope: {}", e);
        }
    }

    async fn handle_join(&self, conn: &ConnectionHandle, data: JoinData) {
        let user_id = data.user_id;

        if let Some(previous_user) = conn.bind_user(user_id.clone()) {
            if previous_user != user_id {
                self.registry.remove_if_current(&previous_user, &conn.id);
            }
        }

        if let Some(previous) = self.registry.insert_or_replace(&user_id, conn.clone()) {
            if previous.connection.id != conn.id {
                info!(
                    user_id = %user_id,
                    old_connection = %previous.connection.id,
                    new_connection = %conn.id,
                    "Session superseded"
                );
                if self.settings.close_superseded {
                    if let Err(e) = previous.connection.close() {
                        debug!(
                            connection_id = %previous.connection.id,
                            "Superseded channel already gone: {}",
                            e
                        );
                    }
                }
            }
        }
        info!(connection_id = %conn.id, user_id = %user_id, "User joined");

        match self
            .log
            .recent_by_user(&user_id, self.settings.history_limit)
            .await
        {
            Ok(messages) => self.deliver(conn, Envelope::history(messages)),
            Err(e) => {
                error!(user_id = %user_id, "Failed to load history: {}", e);
                self.reject(conn, "Failed to load chat history");
            }
        }
    }

    async fn handle_chat(&self, conn: &ConnectionHandle, data: ChatData) {
        if data.message.trim().is_empty() {
            self.reject(conn, "Message must not be empty");
            return;
        }

        let user_id = data.user_id.or_else(|| conn.user_id());
        let language = data.language.unwrap_or_default();

        let user_turn = match self
            .log
            .append(NewChatMessage::user(user_id.clone(), data.message.clone()))
            .await
        {
            Ok(message) => message,
            Err(e) => {
                error!(connection_id = %conn.id, "Failed to store chat message: {}", e);
                self.reject(conn, "Failed to store message");
                return;
            }
        };
        self.deliver(conn, Envelope::Message(user_turn));

        let reply = self.responder.respond(&data.message, language).await;
        if reply.fallback {
            metrics::counter!("brick_responder_fallbacks_total").increment(1);
        }

        let ai_turn = match self
            .log
            .append(NewChatMessage::ai(user_id, reply.text, AI_CONTEXT_RESPONSE))
            .await
        {
            Ok(message) => message,
            Err(e) => {
                error!(connection_id = %conn.id, "Failed to store reply: {}", e);
                self.reject(conn, "Failed to store reply");
                return;
            }
        };

        let delay = self.settings.reply_delay();
        let conn = conn.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = conn.send(Envelope::Message(ai_turn)) {
                        debug!(connection_id = %conn.id, "Reply not delivered: {}", e);
                    }
                }
                _ = conn.terminated() => {
                    debug!(connection_id = %conn.id, "Connection gone before reply delivery");
                }
            }
        });
    }

    fn handle_typing(&self, conn: &ConnectionHandle) {
        let Some(user_id) = conn.user_id() else {
            return;
        };
        for peer in self.pool.bound_to(&user_id) {
            if peer.id != conn.id {
                self.deliver(&peer, Envelope::Typing);
            }
        }
    }

    /// Forget a connection: guarded registry removal plus pool removal.
    /// Also cancels any reply still scheduled for it.
    pub fn on_close(&self, conn: &ConnectionHandle) {
        if let Some(user_id) = conn.user_id() {
            if self.registry.remove_if_current(&user_id, &conn.id) {
                debug!(connection_id = %conn.id, user_id = %user_id, "Session removed");
            }
        }
        if self.pool.remove(&conn.id).is_some() {
            metrics::gauge!("brick_connections_active").set(self.pool.count() as f64);
        }
        conn.terminate();
    }

    /// Terminate connections that missed the previous probe and probe the
    /// rest
    pub fn liveness_sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for conn in self.pool.snapshot() {
            let acknowledged = conn.clear_alive();
            if acknowledged && conn.probe().is_ok() {
                report.probed += 1;
                continue;
            }

            warn!(
                connection_id = %conn.id,
                user_id = ?conn.user_id(),
                "Liveness probe unanswered, terminating"
            );
            self.on_close(&conn);
            metrics::counter!("brick_liveness_evictions_total").increment(1);
            report.evicted += 1;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbound;
    use async_trait::async_trait;
    use brick_core::{Language, Sender};
    use brick_responder::{fallback_reply, KeywordResponder, ResponderError};
    use brick_session::MemoryStorage;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct FailingResponder;

    #[async_trait]
    impl ResponseGenerator for FailingResponder {
        fn responder_id(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _input: &str, _language: Language) -> brick_responder::Result<String> {
            Err(ResponderError::Failed("boom".into()))
        }
    }

    fn router_with(
        generator: Arc<dyn ResponseGenerator>,
        settings: RouterSettings,
    ) -> (ChatRouter, Arc<MemoryStorage>) {
        let log = Arc::new(MemoryStorage::new());
        let router = ChatRouter::new(
            settings,
            Arc::new(ConnectionPool::new()),
            log.clone(),
            generator,
        );
        (router, log)
    }

    fn router() -> (ChatRouter, Arc<MemoryStorage>) {
        router_with(Arc::new(KeywordResponder::new()), RouterSettings::default())
    }

    fn connect(router: &ChatRouter) -> (ConnectionHandle, UnboundedReceiver<Outbound>) {
        let (conn, rx) = ConnectionHandle::channel("127.0.0.1:40002".parse().unwrap());
        router.accept(&conn);
        (conn, rx)
    }

    fn next_envelope(rx: &mut UnboundedReceiver<Outbound>) -> Envelope {
        match rx.try_recv() {
            Ok(Outbound::Envelope(envelope)) => envelope,
            other => panic!("expected envelope, got {:?}", other),
        }
    }

    async fn wait_envelope(rx: &mut UnboundedReceiver<Outbound>) -> Envelope {
        match tokio::time::timeout(Duration::from_secs(10), rx.recv()).await {
            Ok(Some(Outbound::Envelope(envelope))) => envelope,
            other => panic!("expected envelope, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_on_empty_log_returns_empty_history() {
        let (router, _log) = router();
        let (conn, mut rx) = connect(&router);

        router
            .handle_frame(&conn, r#"{"type":"join","data":{"userId":"u1"}}"#)
            .await;

        assert_eq!(next_envelope(&mut rx), Envelope::history(vec![]));
        assert_eq!(conn.user_id().as_deref(), Some("u1"));
        assert_eq!(router.registry().current_connection_id("u1"), Some(conn.id.clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_echo_precedes_reply() {
        let (router, log) = router();
        let (conn, mut rx) = connect(&router);
        router.handle_envelope(&conn, Envelope::join("u1")).await;
        next_envelope(&mut rx);

        let started = tokio::time::Instant::now();
        router
            .handle_envelope(
                &conn,
                Envelope::chat("Tell me about properties", Some("u1".into()), Some(Language::En)),
            )
            .await;

        match next_envelope(&mut rx) {
            Envelope::Message(m) => {
                assert_eq!(m.sender, Sender::User);
                assert_eq!(m.message, "Tell me about properties");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());

        match wait_envelope(&mut rx).await {
            Envelope::Message(m) => {
                assert_eq!(m.sender, Sender::Ai);
                assert_eq!(m.ai_context.as_deref(), Some("response"));
                assert!(!m.message.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(3));
        assert_eq!(log.list_by_user(Some("u1")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_chat_without_user_id_uses_bound_identity() {
        let settings = RouterSettings {
            reply_delay_min: Duration::ZERO,
            reply_delay_max: Duration::ZERO,
            ..RouterSettings::default()
        };
        let (router, log) = router_with(Arc::new(KeywordResponder::new()), settings);
        let (conn, mut rx) = connect(&router);
        router.handle_envelope(&conn, Envelope::join("u9")).await;
        next_envelope(&mut rx);

        router
            .handle_envelope(&conn, Envelope::chat("hello", None, None))
            .await;

        let stored = log.list_by_user(Some("u9")).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|m| m.user_id.as_deref() == Some("u9")));
    }

    #[tokio::test]
    async fn test_empty_chat_is_rejected_without_append() {
        let (router, log) = router();
        let (conn, mut rx) = connect(&router);

        router
            .handle_frame(&conn, r#"{"type":"chat","data":{"message":"","userId":"u1"}}"#)
            .await;

        assert!(matches!(next_envelope(&mut rx), Envelope::Error(_)));
        assert!(rx.try_recv().is_err());
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frame_yields_one_error_and_channel_keeps_working() {
        let (router, _log) = router();
        let (conn, mut rx) = connect(&router);

        router.handle_frame(&conn, "{\"type\": \"chat\", oops").await;
        assert!(matches!(next_envelope(&mut rx), Envelope::Error(_)));
        assert!(rx.try_recv().is_err());

        router.handle_frame(&conn, r#"{"type":"ping","data":{}}"#).await;
        assert_eq!(next_envelope(&mut rx), Envelope::Pong);
        assert!(!conn.is_terminated());
    }

    #[tokio::test]
    async fn test_unknown_and_server_only_types_are_rejected() {
        let (router, _log) = router();
        let (conn, mut rx) = connect(&router);

        router.handle_frame(&conn, r#"{"type":"subscribe","data":{}}"#).await;
        match next_envelope(&mut rx) {
            Envelope::Error(e) => assert!(e.message.contains("subscribe")),
            other => panic!("unexpected {:?}", other),
        }

        router.handle_envelope(&conn, Envelope::history(vec![])).await;
        match next_envelope(&mut rx) {
            Envelope::Error(e) => assert!(e.message.contains("history")),
            other => panic!("unexpected {:?}", other),
        }

        router.handle_envelope(&conn, Envelope::error("client side")).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_join_supersedes_and_stale_close_keeps_new_session() {
        let (router, _log) = router();
        let (a, mut rx_a) = connect(&router);
        let (b, _rx_b) = connect(&router);

        router.handle_envelope(&a, Envelope::join("u1")).await;
        router.handle_envelope(&b, Envelope::join("u1")).await;
        assert_eq!(router.registry().current_connection_id("u1"), Some(b.id.clone()));

        router.on_close(&a);
        assert_eq!(router.registry().current_connection_id("u1"), Some(b.id.clone()));
        assert_eq!(router.pool().count(), 1);

        // abandoned, not closed
        next_envelope(&mut rx_a);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_superseded_sends_close() {
        let settings = RouterSettings {
            close_superseded: true,
            ..RouterSettings::default()
        };
        let (router, _log) = router_with(Arc::new(KeywordResponder::new()), settings);
        let (a, mut rx_a) = connect(&router);
        let (b, _rx_b) = connect(&router);

        router.handle_envelope(&a, Envelope::join("u1")).await;
        next_envelope(&mut rx_a);
        router.handle_envelope(&b, Envelope::join("u1")).await;

        assert_eq!(rx_a.try_recv().unwrap(), Outbound::Close);
    }

    #[tokio::test]
    async fn test_superseding_a_vanished_channel_still_joins() {
        let settings = RouterSettings {
            close_superseded: true,
            ..RouterSettings::default()
        };
        let (router, _log) = router_with(Arc::new(KeywordResponder::new()), settings);
        let (a, rx_a) = connect(&router);
        let (b, mut rx_b) = connect(&router);

        router.handle_envelope(&a, Envelope::join("u1")).await;
        drop(rx_a);
        router.handle_envelope(&b, Envelope::join("u1")).await;

        assert_eq!(next_envelope(&mut rx_b), Envelope::history(vec![]));
        assert_eq!(router.registry().current_connection_id("u1"), Some(b.id.clone()));
    }

    #[tokio::test]
    async fn test_rejoin_with_new_identity_releases_old_binding() {
        let (router, _log) = router();
        let (conn, _rx) = connect(&router);

        router.handle_envelope(&conn, Envelope::join("old")).await;
        router.handle_envelope(&conn, Envelope::join("new")).await;

        assert!(router.registry().get("old").is_none());
        assert!(router.registry().get("new").is_some());
    }

    #[tokio::test]
    async fn test_typing_is_forwarded_to_other_channels_of_same_user() {
        let (router, _log) = router();
        let (a, mut rx_a) = connect(&router);
        let (b, mut rx_b) = connect(&router);
        let (c, mut rx_c) = connect(&router);
        router.handle_envelope(&a, Envelope::join("u1")).await;
        router.handle_envelope(&b, Envelope::join("u1")).await;
        router.handle_envelope(&c, Envelope::join("u2")).await;
        next_envelope(&mut rx_a);
        next_envelope(&mut rx_b);
        next_envelope(&mut rx_c);

        router.handle_envelope(&b, Envelope::Typing).await;

        assert_eq!(next_envelope(&mut rx_a), Envelope::Typing);
        assert!(rx_b.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_typing_from_anonymous_channel_is_ignored() {
        let (router, _log) = router();
        let (a, mut rx_a) = connect(&router);
        router.handle_envelope(&a, Envelope::Typing).await;
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generator_failure_delivers_fallback() {
        let (router, log) =
            router_with(Arc::new(FailingResponder), RouterSettings::default());
        let (conn, mut rx) = connect(&router);

        router
            .handle_envelope(&conn, Envelope::chat("hi", Some("u1".into()), Some(Language::Ar)))
            .await;
        next_envelope(&mut rx);

        match wait_envelope(&mut rx).await {
            Envelope::Message(m) => {
                assert_eq!(m.sender, Sender::Ai);
                assert_eq!(m.message, fallback_reply(Language::Ar));
            }
            other => panic!("unexpected {:?}", other),
        }
        let stored = log.list_by_user(Some("u1")).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].message, fallback_reply(Language::Ar));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_after_disconnect_is_dropped_quietly() {
        let (router, log) = router();
        let (conn, rx) = connect(&router);

        router
            .handle_envelope(&conn, Envelope::chat("hello", Some("u1".into()), None))
            .await;
        drop(rx);
        router.on_close(&conn);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_two_missed_probes_evict_connection() {
        let (router, _log) = router();
        let (conn, mut rx) = connect(&router);
        router.handle_envelope(&conn, Envelope::join("u1")).await;
        next_envelope(&mut rx);

        let first = router.liveness_sweep();
        assert_eq!(first, SweepReport { probed: 1, evicted: 0 });
        assert_eq!(rx.try_recv().unwrap(), Outbound::Probe);

        let second = router.liveness_sweep();
        assert_eq!(second, SweepReport { probed: 0, evicted: 1 });
        assert!(conn.is_terminated());
        assert!(router.registry().get("u1").is_none());
        assert_eq!(router.pool().count(), 0);
    }

    #[tokio::test]
    async fn test_acknowledged_probe_keeps_connection() {
        let (router, _log) = router();
        let (conn, _rx) = connect(&router);

        for _ in 0..3 {
            router.liveness_sweep();
            conn.mark_alive();
        }

        assert!(!conn.is_terminated());
        assert_eq!(router.pool().count(), 1);
    }

    #[tokio::test]
    async fn test_fresh_join_after_eviction_gets_full_history() {
        let settings = RouterSettings {
            reply_delay_min: Duration::ZERO,
            reply_delay_max: Duration::ZERO,
            ..RouterSettings::default()
        };
        let (router, _log) = router_with(Arc::new(KeywordResponder::new()), settings);
        let (old, _old_rx) = connect(&router);
        router.handle_envelope(&old, Envelope::join("u1")).await;
        router
            .handle_envelope(&old, Envelope::chat("hello", Some("u1".into()), None))
            .await;

        router.liveness_sweep();
        router.liveness_sweep();
        assert!(old.is_terminated());

        let (fresh, mut rx) = connect(&router);
        router.handle_envelope(&fresh, Envelope::join("u1")).await;
        match next_envelope(&mut rx) {
            Envelope::History(history) => {
                assert_eq!(history.messages.len(), 2);
                assert_eq!(history.messages[0].sender, Sender::User);
                assert_eq!(history.messages[1].sender, Sender::Ai);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(router.registry().current_connection_id("u1"), Some(fresh.id.clone()));
    }

    #[tokio::test]
    async fn test_history_is_limited_to_latest_turns() {
        let settings = RouterSettings {
            history_limit: 3,
            ..RouterSettings::default()
        };
        let (router, log) = router_with(Arc::new(KeywordResponder::new()), settings);
        for i in 0..5 {
            log.append(NewChatMessage::user(Some("u1".into()), format!("m{}", i)))
                .await
                .unwrap();
        }
        let (conn, mut rx) = connect(&router);
        router.handle_envelope(&conn, Envelope::join("u1")).await;

        match next_envelope(&mut rx) {
            Envelope::History(history) => {
                let texts: Vec<_> = history.messages.iter().map(|m| m.message.as_str()).collect();
                assert_eq!(texts, vec!["m2", "m3", "m4"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
