//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure. Every test app runs on
//! the in-process bus, bound to an ephemeral port.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use tinychat::application::dto::{VerificationRequest, VerificationResponse};
use tinychat::application::services::{GatewayPublisher, TokenCodec, VerificationService};
use tinychat::config::Settings;
use tinychat::domain::{User, UserRepository};
use tinychat::infrastructure::bus::{publish_json, Bus, InMemoryBus};
use tinychat::presentation::websocket::Gateway;
use tinychat::shared::AppError;
use tinychat::startup::Application;

/// Secret alice's tokens are signed with
pub const ALICE_SECRET: &str = "alice-password-hash";

pub fn alice() -> User {
    User {
        id: "42".into(),
        username: "alice".into(),
        discriminator: "0001".into(),
        email: "alice@example.com".into(),
        hash: ALICE_SECRET.into(),
    }
}

/// Token signed for `id` with `secret`
pub fn token_for(id: &str, secret: &str) -> String {
    TokenCodec::new().issue(id, secret, None).unwrap()
}

/// Fixed set of users
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: HashMap<String, User>,
}

impl InMemoryUserRepository {
    pub fn with(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(id).cloned())
    }
}

/// Test settings: loopback, ephemeral port, short timeouts
pub fn test_settings() -> Settings {
    let mut settings = Settings::defaults().unwrap();
    settings.server.host = "127.0.0.1".into();
    settings.server.port = 0;
    settings.auth.reply_timeout_ms = 2000;
    settings
}

/// Wait until `channel` has `count` subscribers.
pub async fn wait_for_subscribers(bus: &InMemoryBus, channel: &str, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while bus.subscriber_count(channel) != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscriber count never reached");
}

/// Run the real verification service over `bus`.
pub async fn spawn_auth_service(bus: &InMemoryBus, users: InMemoryUserRepository) -> JoinHandle<()> {
    let settings = test_settings();
    let service = VerificationService::new(Arc::new(bus.clone()), Arc::new(users), &settings.auth);
    let task = tokio::spawn(async move {
        let _ = service.run().await;
    });
    wait_for_subscribers(bus, &settings.auth.request_channel, 1).await;
    task
}

/// Answer verification requests by lookup in a token table, the way a
/// stand-in auth service would.
pub async fn spawn_stub_auth(bus: &InMemoryBus, tokens: Vec<(&'static str, User)>) -> JoinHandle<()> {
    let settings = test_settings();
    let mut requests = bus.subscribe(&settings.auth.request_channel).await.unwrap();
    let bus = bus.clone();

    tokio::spawn(async move {
        while let Some(raw) = requests.next().await {
            let request: VerificationRequest = serde_json::from_str(&raw).unwrap();
            let response = tokens
                .iter()
                .find(|(token, _)| *token == request.token)
                .map(|(_, user)| VerificationResponse::valid(user.to_public()))
                .unwrap_or_else(VerificationResponse::invalid);
            publish_json(&bus, &request.reply_channel(), &response)
                .await
                .unwrap();
        }
    })
}

/// Test application: the gateway bound to a loopback port
pub struct TestApp {
    pub addr: SocketAddr,
    pub bus: InMemoryBus,
    pub gateway: Arc<Gateway>,
    pub settings: Settings,
    _auth: JoinHandle<()>,
    _server: JoinHandle<()>,
}

impl TestApp {
    /// Gateway plus the real verification service knowing alice
    pub async fn spawn() -> Self {
        let bus = InMemoryBus::new();
        let auth = spawn_auth_service(&bus, InMemoryUserRepository::with([alice()])).await;
        Self::start(bus, auth).await
    }

    /// Gateway plus a stand-in auth service accepting `good-token` for alice
    pub async fn spawn_with_stub_auth() -> Self {
        let bus = InMemoryBus::new();
        let auth = spawn_stub_auth(&bus, vec![("good-token", alice())]).await;
        Self::start(bus, auth).await
    }

    async fn start(bus: InMemoryBus, auth: JoinHandle<()>) -> Self {
        let settings = test_settings();
        let app = Application::build_with_bus(settings.clone(), Arc::new(bus.clone()))
            .await
            .unwrap();
        let addr = app.local_addr().unwrap();
        let gateway = app.gateway();

        let server = tokio::spawn(async move {
            let _ = app.run_until_stopped().await;
        });

        Self {
            addr,
            bus,
            gateway,
            settings,
            _auth: auth,
            _server: server,
        }
    }

    pub async fn connect(&self) -> GatewayClient {
        let url = format!("ws://{}/gateway", self.addr);
        let (stream, _) = connect_async(url).await.unwrap();
        GatewayClient { stream }
    }

    pub fn publisher(&self) -> GatewayPublisher {
        GatewayPublisher::new(Arc::new(self.bus.clone()), &self.settings.gateway)
    }

    /// Wait until every connection task has finished.
    pub async fn wait_connections_closed(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.gateway.open_connections() != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connection task never finished");
    }

    /// Wait until `user_id` has (or no longer has) a live listener.
    pub async fn wait_online(&self, user_id: &str, online: bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.gateway.registry().is_online(user_id) != online {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("listener state never changed");
    }
}

/// WebSocket client speaking the gateway protocol
pub struct GatewayClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl GatewayClient {
    pub async fn send_json(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    pub async fn send_text(&mut self, text: &str) {
        self.stream.send(Message::text(text)).await.unwrap();
    }

    pub async fn init(&mut self, token: &str) {
        self.send_json(json!({ "op": "init", "data": { "token": token } }))
            .await;
    }

    /// Next application frame as JSON
    pub async fn recv_json(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.stream.next())
                .await
                .expect("no frame from gateway")
                .expect("gateway hung up")
                .unwrap();
            match frame {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("expected text frame, got {other:?}"),
            }
        }
    }

    /// Assert the gateway closes the socket next.
    pub async fn expect_closed(&mut self) {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.stream.next())
            .await
            .expect("gateway did not close the socket");
        match frame {
            None | Some(Ok(Message::Close(_))) | Some(Err(_)) => {}
            Some(Ok(other)) => panic!("expected close, got {other:?}"),
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
