//! HTTP channels against a local server, delivered through the dispatcher.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Form, Json, Router};
use serde_json::Value;
use smartcam_core::config::{DiscordConfig, PushoverConfig, WebhookConfig};
use smartcam_core::ThreatState;
use smartcam_notify::discord::DiscordNotifier;
use smartcam_notify::pushover::PushoverNotifier;
use smartcam_notify::webhook::WebhookNotifier;
use smartcam_notify::{Dispatcher, DispatcherOptions, NotificationEvent, Notifier, NotifyError, TemplateRenderer};

#[derive(Clone, Default)]
struct Captured {
    json: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
    forms: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn spawn(captured: Captured) -> SocketAddr {
    let app = Router::new()
        .route(
            "/hook",
            post(|State(c): State<Captured>, headers: HeaderMap, Json(body): Json<Value>| async move {
                c.json.lock().unwrap().push((headers, body));
                StatusCode::OK
            }),
        )
        .route(
            "/discord",
            post(|State(c): State<Captured>, headers: HeaderMap, Json(body): Json<Value>| async move {
                c.json.lock().unwrap().push((headers, body));
                StatusCode::NO_CONTENT
            }),
        )
        .route(
            "/discord-broken",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/pushover",
            post(|State(c): State<Captured>, Form(form): Form<HashMap<String, String>>| async move {
                c.forms.lock().unwrap().push(form);
                Json(serde_json::json!({ "status": 1 }))
            }),
        )
        .with_state(captured);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn renderer() -> Arc<TemplateRenderer> {
    Arc::new(TemplateRenderer::new())
}

fn options() -> DispatcherOptions {
    DispatcherOptions {
        cooldown: Duration::from_secs(30),
        queue_capacity: 16,
        workers: 2,
        send_timeout: Duration::from_secs(5),
    }
}

struct CountingEmail {
    sent: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Notifier for CountingEmail {
    async fn send(&self, _event: &NotificationEvent) -> Result<(), NotifyError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}

#[tokio::test]
async fn webhook_posts_event_json_with_headers() {
    let captured = Captured::default();
    let addr = spawn(captured.clone()).await;

    let webhook = WebhookNotifier::from_config(&WebhookConfig {
        enabled: true,
        url: format!("http://{addr}/hook"),
        headers: HashMap::from([("X-Api-Key".to_string(), "k-123".to_string())]),
    })
    .unwrap();

    let event = NotificationEvent::unknown_person(91.5, "Front Camera", Some("snapshots/u.jpg".into()));
    webhook.send(&event).await.unwrap();

    let requests = captured.json.lock().unwrap();
    let (headers, body) = &requests[0];
    assert_eq!(headers["x-api-key"], "k-123");
    assert_eq!(body["event_type"], "unknown_person");
    assert_eq!(body["data"]["confidence"], 91.5);
    assert_eq!(body["data"]["location"], "Front Camera");
    assert_eq!(body["data"]["snapshot"], "snapshots/u.jpg");
}

#[tokio::test]
async fn discord_accepts_no_content() {
    let captured = Captured::default();
    let addr = spawn(captured.clone()).await;

    let discord = DiscordNotifier::from_config(
        &DiscordConfig {
            enabled: true,
            webhook_url: format!("http://{addr}/discord"),
        },
        renderer(),
    )
    .unwrap();

    discord
        .send(&NotificationEvent::alarm(ThreatState::On, "Unknown person detected", "Front Camera"))
        .await
        .unwrap();

    let requests = captured.json.lock().unwrap();
    assert_eq!(requests[0].1["embeds"][0]["title"], "Alarm ON");
}

#[tokio::test]
async fn pushover_posts_form() {
    let captured = Captured::default();
    let addr = spawn(captured.clone()).await;

    let pushover = PushoverNotifier::from_config(
        &PushoverConfig {
            enabled: true,
            user_key: "user-1".into(),
            api_token: "token-1".into(),
            api_url: format!("http://{addr}/pushover"),
        },
        renderer(),
    )
    .unwrap();

    pushover
        .send(&NotificationEvent::unknown_person(77.0, "Front Camera", None))
        .await
        .unwrap();

    let forms = captured.forms.lock().unwrap();
    assert_eq!(forms[0]["token"], "token-1");
    assert_eq!(forms[0]["user"], "user-1");
    assert_eq!(forms[0]["priority"], "1");
    assert!(forms[0]["message"].contains("confidence: 77.0"));
}

#[tokio::test]
async fn failing_discord_does_not_block_email() {
    let captured = Captured::default();
    let addr = spawn(captured).await;

    let sent = Arc::new(AtomicUsize::new(0));
    let broken_discord = DiscordNotifier::from_config(
        &DiscordConfig {
            enabled: true,
            webhook_url: format!("http://{addr}/discord-broken"),
        },
        renderer(),
    )
    .unwrap();
    let channels: Vec<Box<dyn Notifier>> = vec![
        Box::new(broken_discord),
        Box::new(CountingEmail { sent: sent.clone() }),
    ];

    let dispatcher = Dispatcher::start(channels, options());
    assert!(dispatcher.notify(NotificationEvent::unknown_person(85.0, "Front Camera", None)));
    let stats = dispatcher.shutdown(Duration::from_secs(5)).await;

    assert_eq!(sent.load(Ordering::SeqCst), 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn deliver_now_reports_rejection_status() {
    let captured = Captured::default();
    let addr = spawn(captured).await;

    let broken_discord = DiscordNotifier::from_config(
        &DiscordConfig {
            enabled: true,
            webhook_url: format!("http://{addr}/discord-broken"),
        },
        renderer(),
    )
    .unwrap();
    let dispatcher = Dispatcher::start(vec![Box::new(broken_discord)], options());

    let results = dispatcher.deliver_now(&NotificationEvent::test("Front Camera")).await;
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    let error = results[0].error.as_deref().unwrap();
    assert!(error.contains("500"), "got: {error}");
    dispatcher.shutdown(Duration::from_secs(1)).await;
}
