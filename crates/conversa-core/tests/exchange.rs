//! End-to-end exchanges against a local fake completion endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use conversa_core::resolver::{classify, Branch, OFFLINE_QUESTION_REPLY, RULES};
use conversa_core::store::MESSAGES_KEY;
use conversa_core::{
    CompletionConfig, FileStore, Message, OpenAIClient, PatternResolver, ReplySource, Responder,
    Session, Store,
};
use tempfile::TempDir;

async fn serve(status: StatusCode, body: &'static str) -> String {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move || async move { (status, body) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v1", addr)
}

async fn session_against(base_url: &str, dir: &TempDir) -> (Session, Arc<FileStore>) {
    let store = Arc::new(FileStore::new(dir.path()));
    let client = OpenAIClient::new(CompletionConfig::new("sk-test").with_base_url(base_url)).unwrap();
    let responder = Responder::new(Some(Arc::new(client)), Arc::new(PatternResolver::new()));
    (Session::load(store.clone(), responder).await, store)
}

#[tokio::test]
async fn remote_completion_is_appended_and_persisted() {
    let base = serve(
        StatusCode::OK,
        r#"{"choices":[{"message":{"role":"assistant","content":"Paris é a capital."}}]}"#,
    )
    .await;
    let dir = TempDir::new().unwrap();
    let (mut session, store) = session_against(&base, &dir).await;

    let reply = session.submit("Qual é a capital da França?").await.unwrap();
    assert_eq!(reply.text, "Paris é a capital.");

    let raw = store.get(MESSAGES_KEY).await.unwrap().unwrap();
    let stored: Vec<Message> = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored, session.messages());
    assert_eq!(stored.len(), 3);
}

#[tokio::test]
async fn unauthorized_falls_back_to_offline_reply() {
    let base = serve(StatusCode::UNAUTHORIZED, r#"{"error":{"message":"invalid key"}}"#).await;
    let dir = TempDir::new().unwrap();
    let (mut session, _) = session_against(&base, &dir).await;

    let question = "Qual é a capital da França?";
    let reply = session.submit(question).await.unwrap();
    assert_eq!(reply.text, OFFLINE_QUESTION_REPLY);

    let greeting = session.submit("Olá").await.unwrap().text.clone();
    assert!(classify("Olá").candidates("Olá").contains(&greeting));
    assert_eq!(classify("Olá"), Branch::Rule(0));
}

#[tokio::test]
async fn conversation_survives_restart() {
    let base = serve(StatusCode::INTERNAL_SERVER_ERROR, "").await;
    let dir = TempDir::new().unwrap();

    let before = {
        let (mut session, _) = session_against(&base, &dir).await;
        session.submit("oi").await.unwrap();
        session.submit("tchau").await.unwrap();
        session.messages().to_vec()
    };

    let (session, _) = session_against(&base, &dir).await;
    assert_eq!(session.messages(), before.as_slice());
}

#[tokio::test]
async fn timed_out_completion_falls_back_to_offline_reply() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (StatusCode::OK, r#"{"choices":[{"message":{"content":"tarde demais"}}]}"#)
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dir = TempDir::new().unwrap();
    let config = CompletionConfig::new("sk-test")
        .with_base_url(&format!("http://{}/v1", addr))
        .with_timeout(Duration::from_millis(300));
    let client = OpenAIClient::new(config).unwrap();
    let responder = Responder::new(Some(Arc::new(client)), Arc::new(PatternResolver::new()));
    let mut session = Session::load(Arc::new(FileStore::new(dir.path())), responder.clone()).await;

    let exchange = session.begin("Olá").await.unwrap();
    let reply = responder.reply(&exchange).await;
    assert_eq!(reply.source, ReplySource::Fallback);
    assert!(RULES[0].responses.contains(&reply.text.as_str()));

    session.finish(reply).await.unwrap();
    assert!(!session.is_busy());
    assert_eq!(session.messages().len(), 3);
}
