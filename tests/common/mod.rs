//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use switchyard::config::{EndpointConfig, ListenerKind, SwitchyardConfig, TlsConfig, TlsProtocol};
use switchyard::context::{ConnectionContext, ContextError, ContextType};
use switchyard::lifecycle::Shutdown;
use switchyard::net::listener::{ContextHandler, Listener, ListenerHandle};

/// Mail captured by [`TestHandler`]: (sender, recipients, body).
pub type Mail = (Option<String>, Vec<String>, Vec<u8>);

/// Echoes HTTP paths, upgrades WebSocket requests and records mail.
#[derive(Default)]
pub struct TestHandler {
    pub mail: Mutex<Vec<Mail>>,
}

#[async_trait]
impl ContextHandler for TestHandler {
    async fn handle(&self, context: &mut ConnectionContext) {
        match context.kind() {
            ContextType::Http => {
                let exchanges = context.request().exchanges();
                let path = context.http_request().unwrap().path().to_string();
                let response = context.response_mut();
                response
                    .headers_mut()
                    .add("X-Exchange", exchanges.to_string());
                response.set_body(path);
            }
            ContextType::WebSocket => {
                match context.upgrade_websocket(Some("test-client".into())).await {
                    Ok(socket) => {
                        let listener = context.listener().clone();
                        tokio::spawn(async move {
                            let _ = socket.drain_inbound().await;
                            listener.release_websocket(&socket).await;
                        });
                    }
                    Err(ContextError::DuplicateClient { .. }) => {
                        context.response_mut().set_status_code(409);
                    }
                    Err(e) => panic!("upgrade failed: {e}"),
                }
            }
            ContextType::Smtp => {
                let request = context.smtp_request().unwrap();
                self.mail.lock().unwrap().push((
                    request.sender().map(str::to_string),
                    request.recipients().to_vec(),
                    request.body().to_vec(),
                ));
            }
            ContextType::Unknown => {}
        }
    }
}

/// A listener running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: ListenerHandle,
    pub handler: Arc<TestHandler>,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("listener did not stop")
            .unwrap();
    }
}

pub fn local_config(kind: ListenerKind) -> SwitchyardConfig {
    let mut config = SwitchyardConfig::default();
    config.listener.kind = kind;
    config.listener.endpoints = vec![EndpointConfig {
        name: "test".into(),
        bind_address: "127.0.0.1:0".into(),
        tls: None,
    }];
    config.timeouts.receive_secs = 5;
    config.timeouts.shutdown_secs = 1;
    config.smtp.server_name = "mail.test".into();
    config
}

#[allow(dead_code)]
pub fn with_tls(mut config: SwitchyardConfig) -> SwitchyardConfig {
    let fixtures = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");
    config.listener.endpoints[0].tls = Some(TlsConfig {
        cert_path: format!("{fixtures}/cert.pem"),
        key_path: format!("{fixtures}/key.pem"),
        protocols: vec![TlsProtocol::Tls13],
    });
    config
}

pub async fn start(config: SwitchyardConfig) -> TestServer {
    let listener = Listener::bind(&config).await.unwrap();
    let addr = listener.local_addrs()[0];
    let handle = listener.handle().clone();
    let handler = Arc::new(TestHandler::default());
    let shutdown = Shutdown::new();
    let task = tokio::spawn(listener.run(Arc::clone(&handler), shutdown.subscribe()));

    TestServer {
        addr,
        handle,
        handler,
        shutdown,
        task,
    }
}

/// Poll `check` until it holds or a second passes.
#[allow(dead_code)]
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
