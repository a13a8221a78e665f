//! Conversation session: owns the message log, picks how replies are produced
//! and keeps the persisted copy in sync.
//!
//! A submission is split into three steps so a front end can keep drawing while
//! the reply is produced elsewhere:
//!
//! 1. [`Session::begin`] records the user message and marks the session busy.
//! 2. [`Responder::reply`] produces the reply from an owned [`Exchange`].
//! 3. [`Session::finish`] records the reply and clears the busy flag.
//!
//! [`Session::submit`] runs all three in sequence.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::ai::{Completer, HISTORY_WINDOW};
use crate::error::PersistenceError;
use crate::message::{IdGenerator, Message};
use crate::resolver::Resolver;
use crate::store::{Store, MESSAGES_KEY};

pub const WELCOME_MESSAGE: &str = "Olá! Eu sou sua assistente de IA. Como posso ajudá-lo hoje?";
pub const CLEARED_MESSAGE: &str = "Chat limpo! Como posso ajudá-lo?";

/// A pending user turn, detached from the session.
#[derive(Debug, Clone)]
#[must_use = "the session stays busy until the exchange is answered with `finish`"]
pub struct Exchange {
    pub prompt: String,
    /// Messages preceding the prompt, at most [`HISTORY_WINDOW`] of them.
    pub history: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Remote,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

/// The reply capabilities: an optional remote completer and the local resolver.
#[derive(Clone)]
pub struct Responder {
    completer: Option<Arc<dyn Completer>>,
    resolver: Arc<dyn Resolver>,
}

impl Responder {
    pub fn new(completer: Option<Arc<dyn Completer>>, resolver: Arc<dyn Resolver>) -> Self {
        Self { completer, resolver }
    }

    /// Replies from the local resolver only.
    pub fn offline(resolver: Arc<dyn Resolver>) -> Self {
        Self::new(None, resolver)
    }

    pub fn has_remote(&self) -> bool {
        self.completer.is_some()
    }

    /// Ask the completer once; any failure falls back to the resolver.
    pub async fn reply(&self, exchange: &Exchange) -> Reply {
        if let Some(completer) = &self.completer {
            match completer.complete(&exchange.prompt, &exchange.history).await {
                Ok(text) => {
                    return Reply {
                        text,
                        source: ReplySource::Remote,
                    }
                }
                Err(e) => warn!(error = %e, "completion failed, using offline reply"),
            }
        }

        self.fallback(&exchange.prompt)
    }

    /// Answer from the local resolver alone.
    pub fn fallback(&self, prompt: &str) -> Reply {
        Reply {
            text: self.resolver.resolve(prompt),
            source: ReplySource::Fallback,
        }
    }
}

pub struct Session {
    store: Arc<dyn Store>,
    responder: Responder,
    log: Vec<Message>,
    ids: IdGenerator,
    busy: bool,
    clear_pending: bool,
}

impl Session {
    /// Rehydrate the persisted log, or start with a welcome message.
    pub async fn load(store: Arc<dyn Store>, responder: Responder) -> Self {
        let log = match store.get(MESSAGES_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Message>>(&raw) {
                Ok(messages) if !messages.is_empty() => Some(messages),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "stored conversation is unreadable, starting fresh");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "could not load conversation, starting fresh");
                None
            }
        };

        let mut session = Self {
            store,
            responder,
            log: Vec::new(),
            ids: IdGenerator::default(),
            busy: false,
            clear_pending: false,
        };

        match log {
            Some(messages) => {
                debug!(count = messages.len(), "restored conversation");
                session.ids = IdGenerator::after(&messages);
                session.log = messages;
            }
            None => session.reset_log(WELCOME_MESSAGE),
        }
        session
    }

    pub fn messages(&self) -> &[Message] {
        &self.log
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn clear_pending(&self) -> bool {
        self.clear_pending
    }

    pub fn responder(&self) -> Responder {
        self.responder.clone()
    }

    /// Replace the remote completer, e.g. after the API key changed.
    pub fn reconfigure(&mut self, completer: Option<Arc<dyn Completer>>) {
        self.responder.completer = completer;
    }

    /// Record a user message and return the exchange to answer.
    ///
    /// Returns `None` without touching the log when `text` is blank or a reply
    /// is still outstanding.
    pub async fn begin(&mut self, text: &str) -> Option<Exchange> {
        if text.trim().is_empty() || self.busy {
            return None;
        }

        let start = self.log.len().saturating_sub(HISTORY_WINDOW);
        let history = self.log[start..].to_vec();

        let message = self.ids.message(text, true);
        self.log.push(message);
        self.busy = true;
        self.persist().await;

        Some(Exchange {
            prompt: text.to_string(),
            history,
        })
    }

    /// Record the assistant reply and clear the busy flag.
    ///
    /// Returns `None` and leaves the log alone when no exchange is outstanding.
    pub async fn finish(&mut self, reply: Reply) -> Option<&Message> {
        if !self.busy {
            warn!("reply arrived with no outstanding exchange, dropping it");
            return None;
        }

        let message = self.ids.message(reply.text, false);
        self.log.push(message);
        self.busy = false;
        self.persist().await;
        self.log.last()
    }

    /// Send `text` and wait for the reply. Returns the reply message.
    pub async fn submit(&mut self, text: &str) -> Option<&Message> {
        let exchange = self.begin(text).await?;
        let reply = self.responder.reply(&exchange).await;
        self.finish(reply).await
    }

    /// First step of clearing. Refused while a reply is outstanding.
    pub fn request_clear(&mut self) -> bool {
        if self.busy {
            return false;
        }
        self.clear_pending = true;
        true
    }

    pub fn cancel_clear(&mut self) {
        self.clear_pending = false;
    }

    /// Reset the log and delete the persisted copy, if a clear was requested.
    pub async fn confirm_clear(&mut self) -> bool {
        if !self.clear_pending {
            return false;
        }
        self.clear_pending = false;
        self.reset_log(CLEARED_MESSAGE);

        if let Err(e) = self.store.remove(MESSAGES_KEY).await {
            warn!(error = %e, "could not delete stored conversation");
        }
        true
    }

    /// Start over with a welcome message after the store was wiped elsewhere.
    pub fn start_fresh(&mut self) {
        self.clear_pending = false;
        self.reset_log(WELCOME_MESSAGE);
    }

    fn reset_log(&mut self, text: &str) {
        let message = self.ids.message(text, false);
        self.log = vec![message];
    }

    async fn persist(&self) {
        if let Err(e) = self.write_log().await {
            warn!(error = %e, "could not save conversation");
        }
    }

    async fn write_log(&self) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(&self.log).map_err(|source| PersistenceError::Encode {
            key: MESSAGES_KEY.to_string(),
            source,
        })?;
        self.store.set(MESSAGES_KEY, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::resolver::{PatternResolver, RULES};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Completer double that replays a fixed outcome and records its inputs.
    struct ScriptedCompleter {
        outcome: Result<String, u16>,
        calls: Mutex<Vec<(String, Vec<Message>)>>,
    }

    impl ScriptedCompleter {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(text.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                outcome: Err(status),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Completer for ScriptedCompleter {
        async fn complete(&self, prompt: &str, history: &[Message]) -> Result<String, RemoteError> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), history.to_vec()));
            match &self.outcome {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(RemoteError::Status(*status)),
            }
        }
    }

    #[derive(Default)]
    struct CountingResolver {
        calls: AtomicUsize,
    }

    impl Resolver for CountingResolver {
        fn resolve(&self, text: &str) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            format!("offline: {}", text)
        }
    }

    async fn offline_session(store: Arc<MemoryStore>) -> Session {
        Session::load(store, Responder::offline(Arc::new(PatternResolver::new()))).await
    }

    fn stored_log(raw: Option<String>) -> Vec<Message> {
        serde_json::from_str(&raw.expect("log persisted")).unwrap()
    }

    #[tokio::test]
    async fn test_first_launch_has_welcome_message() {
        let session = offline_session(Arc::new(MemoryStore::new())).await;
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].text, WELCOME_MESSAGE);
        assert!(!session.messages()[0].is_user);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let mut session = offline_session(store.clone()).await;

        assert!(session.submit("").await.is_none());
        assert!(session.submit("   \n\t").await.is_none());
        assert_eq!(session.messages().len(), 1);
        assert_eq!(store.get(MESSAGES_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_offline_greeting_scenario() {
        let mut session = offline_session(Arc::new(MemoryStore::new())).await;
        let reply = session.submit("Olá").await.unwrap().clone();

        assert!(!reply.is_user);
        assert!(RULES[0].responses.contains(&reply.text.as_str()));

        let log = session.messages();
        assert_eq!(log.len(), 3);
        assert!(log[1].is_user);
        assert_eq!(log[1].text, "Olá");
        assert!(log.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_remote_reply_used_verbatim() {
        let completer = ScriptedCompleter::ok("  Resposta *remota*\n");
        let resolver = Arc::new(CountingResolver::default());
        let responder = Responder::new(Some(completer.clone()), resolver.clone());
        let mut session = Session::load(Arc::new(MemoryStore::new()), responder).await;

        let reply = session.submit("Olá").await.unwrap();
        assert_eq!(reply.text, "  Resposta *remota*\n");
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back() {
        let completer = ScriptedCompleter::failing(401);
        let resolver = Arc::new(CountingResolver::default());
        let responder = Responder::new(Some(completer.clone()), resolver.clone());
        let mut session = Session::load(Arc::new(MemoryStore::new()), responder).await;

        let reply = session.submit("Qualquer coisa").await.unwrap();
        assert_eq!(reply.text, "offline: Qualquer coisa");
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(completer.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_history_excludes_prompt_and_is_windowed() {
        let completer = ScriptedCompleter::ok("ok");
        let responder = Responder::new(Some(completer.clone()), Arc::new(CountingResolver::default()));
        let mut session = Session::load(Arc::new(MemoryStore::new()), responder).await;

        for i in 0..8 {
            session.submit(&format!("pergunta {}", i)).await.unwrap();
        }

        let calls = completer.calls.lock().unwrap();
        // first call: only the welcome message precedes the prompt
        assert_eq!(calls[0].1.len(), 1);
        assert_eq!(calls[0].1[0].text, WELCOME_MESSAGE);

        let (prompt, history) = calls.last().unwrap();
        assert_eq!(prompt, "pergunta 7");
        assert_eq!(history.len(), HISTORY_WINDOW);
        assert_eq!(history.last().unwrap().text, "ok");
        assert!(history.iter().all(|m| m.text != "pergunta 7"));
    }

    #[tokio::test]
    async fn test_every_append_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let mut session = offline_session(store.clone()).await;

        let exchange = session.begin("oi").await.unwrap();
        assert!(session.is_busy());
        assert_eq!(stored_log(store.get(MESSAGES_KEY).await.unwrap()).len(), 2);

        let reply = session.responder().reply(&exchange).await;
        assert_eq!(reply.source, ReplySource::Fallback);
        assert!(session.finish(reply).await.is_some());
        assert!(!session.is_busy());
        assert_eq!(stored_log(store.get(MESSAGES_KEY).await.unwrap()), session.messages());
    }

    #[tokio::test]
    async fn test_busy_session_rejects_new_input() {
        let mut session = offline_session(Arc::new(MemoryStore::new())).await;
        let _pending = session.begin("primeira").await.unwrap();

        assert!(session.begin("segunda").await.is_none());
        assert_eq!(session.messages().len(), 2);
        assert!(!session.request_clear());
    }

    #[tokio::test]
    async fn test_roundtrip_through_store() {
        let store = Arc::new(MemoryStore::new());
        let mut session = offline_session(store.clone()).await;
        session.submit("oi").await;
        session.submit("valeu").await;
        let before = session.messages().to_vec();

        let reloaded = offline_session(store).await;
        assert_eq!(reloaded.messages(), before.as_slice());
    }

    #[tokio::test]
    async fn test_ids_continue_after_reload() {
        let store = Arc::new(MemoryStore::new());
        let mut session = offline_session(store.clone()).await;
        session.submit("oi").await;
        let last_id = session.messages().last().unwrap().id;

        let mut reloaded = offline_session(store).await;
        let reply = reloaded.submit("tchau").await.unwrap();
        assert!(reply.id > last_id);
    }

    #[tokio::test]
    async fn test_unreadable_log_starts_fresh() {
        let store = Arc::new(MemoryStore::new());
        store.set(MESSAGES_KEY, "{garbage").await.unwrap();

        let session = offline_session(store).await;
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].text, WELCOME_MESSAGE);
    }

    #[tokio::test]
    async fn test_empty_stored_log_starts_fresh() {
        let store = Arc::new(MemoryStore::new());
        store.set(MESSAGES_KEY, "[]").await.unwrap();
        let session = offline_session(store).await;
        assert_eq!(session.messages()[0].text, WELCOME_MESSAGE);
    }

    #[tokio::test]
    async fn test_clear_requires_confirmation() {
        let store = Arc::new(MemoryStore::new());
        let mut session = offline_session(store.clone()).await;
        session.submit("oi").await;

        // confirm without a request does nothing
        assert!(!session.confirm_clear().await);
        assert_eq!(session.messages().len(), 3);

        assert!(session.request_clear());
        session.cancel_clear();
        assert!(!session.confirm_clear().await);
        assert_eq!(session.messages().len(), 3);
        assert!(store.get(MESSAGES_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let mut session = offline_session(store.clone()).await;
        session.submit("oi").await;

        for _ in 0..2 {
            assert!(session.request_clear());
            assert!(session.confirm_clear().await);

            let log = session.messages();
            assert_eq!(log.len(), 1);
            assert_eq!(log[0].text, CLEARED_MESSAGE);
            assert!(!log[0].is_user);
            assert_eq!(store.get(MESSAGES_KEY).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_memory_log() {
        let store = Arc::new(MemoryStore::new());
        let mut session = offline_session(store.clone()).await;
        store.set_failing(true);

        let reply = session.submit("oi").await;
        assert!(reply.is_some());
        assert_eq!(session.messages().len(), 3);

        // clear still resets the in-memory log even though the delete fails
        assert!(session.request_clear());
        assert!(session.confirm_clear().await);
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_reconfigure_switches_to_remote() {
        let resolver = Arc::new(CountingResolver::default());
        let mut session =
            Session::load(Arc::new(MemoryStore::new()), Responder::offline(resolver.clone())).await;
        assert!(!session.responder().has_remote());

        session.submit("antes").await;
        session.reconfigure(Some(ScriptedCompleter::ok("remoto")));
        let reply = session.submit("depois").await.unwrap();

        assert_eq!(reply.text, "remoto");
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finish_without_begin_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let mut session = offline_session(store.clone()).await;
        let stray = session.responder().fallback("oi");

        assert!(session.finish(stray.clone()).await.is_none());
        assert_eq!(session.messages().len(), 1);
        assert_eq!(store.get(MESSAGES_KEY).await.unwrap(), None);

        // a second reply for the same exchange is dropped too
        let exchange = session.begin("oi").await.unwrap();
        let reply = session.responder().reply(&exchange).await;
        assert!(session.finish(reply).await.is_some());
        assert!(session.finish(stray).await.is_none());
        assert_eq!(session.messages().len(), 3);
    }

    #[test]
    fn test_fallback_uses_injected_resolver() {
        let resolver = Arc::new(CountingResolver::default());
        let responder = Responder::new(Some(ScriptedCompleter::ok("remoto")), resolver.clone());

        let reply = responder.fallback("sem rede");
        assert_eq!(reply.text, "offline: sem rede");
        assert_eq!(reply.source, ReplySource::Fallback);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_fresh_after_wipe() {
        let mut session = offline_session(Arc::new(MemoryStore::new())).await;
        session.submit("oi").await;
        session.start_fresh();
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].text, WELCOME_MESSAGE);
    }
}
