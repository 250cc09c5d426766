//! SMTP contexts over a real TCP listener.

use switchyard::config::ListenerKind;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

mod common;

struct Session {
    stream: BufReader<TcpStream>,
}

impl Session {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        Self {
            stream: BufReader::new(TcpStream::connect(addr).await.unwrap()),
        }
    }

    async fn line(&mut self) -> String {
        let mut line = String::new();
        self.stream.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    async fn send(&mut self, command: &str) -> String {
        self.stream
            .get_mut()
            .write_all(format!("{command}\r\n").as_bytes())
            .await
            .unwrap();
        self.line().await
    }
}

#[tokio::test]
async fn delivers_messages_and_resets_between_them() {
    let server = common::start(common::local_config(ListenerKind::Smtp)).await;
    let mut session = Session::connect(server.addr).await;

    assert_eq!(session.line().await, "220 mail.test ESMTP ready");
    assert_eq!(session.send("EHLO client.test").await, "250 mail.test");

    for n in 1..=2 {
        assert_eq!(session.send("MAIL FROM:<alice@example.com>").await, "250 OK");
        assert_eq!(session.send("RCPT TO:<bob@example.com>").await, "250 OK");
        assert!(session.send("DATA").await.starts_with("354"));
        assert_eq!(
            session.send(&format!("message {n}\r\n..dotted\r\n.")).await,
            "250 OK: message queued"
        );
    }

    assert_eq!(session.send("QUIT").await, "221 Bye");

    let mail = server.handler.mail.lock().unwrap().clone();
    assert_eq!(mail.len(), 2);
    assert_eq!(mail[0].0.as_deref(), Some("alice@example.com"));
    assert_eq!(mail[0].1, vec!["bob@example.com".to_string()]);
    assert_eq!(mail[0].2, b"message 1\r\n.dotted");
    assert_eq!(mail[1].2, b"message 2\r\n.dotted");

    server.stop().await;
}

#[tokio::test]
async fn data_without_envelope_is_refused() {
    let server = common::start(common::local_config(ListenerKind::Smtp)).await;
    let mut session = Session::connect(server.addr).await;

    session.line().await;
    assert_eq!(session.send("DATA").await, "503 Bad sequence of commands");
    assert_eq!(session.send("BOGUS").await, "500 Command unrecognised");
    assert!(server.handler.mail.lock().unwrap().is_empty());

    server.stop().await;
}
