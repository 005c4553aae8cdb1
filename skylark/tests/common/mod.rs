//! Shared plumbing for the scripted-server integration tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A fake XMPP server on localhost speaking a scripted dialogue.
pub struct FakeServer {
    pub stream: TcpStream,
    buffer: Vec<u8>,
}

/// Bind a listener for a fake server and return its port.
pub async fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

impl FakeServer {
    pub async fn accept(listener: &TcpListener) -> FakeServer {
        let (stream, _) = listener.accept().await.unwrap();
        FakeServer {
            stream,
            buffer: Vec::new(),
        }
    }

    /// Read until the accumulated input contains `marker`; returns and
    /// consumes everything up to and including it.
    pub async fn read_until(&mut self, marker: &str) -> String {
        let needle = marker.as_bytes();
        loop {
            if let Some(pos) = self
                .buffer
                .windows(needle.len().max(1))
                .position(|window| window == needle)
            {
                let end = pos + needle.len();
                let head: Vec<u8> = self.buffer.drain(..end).collect();
                return String::from_utf8_lossy(&head).into_owned();
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client hung up while waiting for {:?}", marker);
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Consume the client's stream header (prolog plus opening tag).
    pub async fn read_stream_header(&mut self) -> String {
        let prolog = self.read_until(">").await;
        assert!(prolog.contains("<?xml"), "expected prolog, got {:?}", prolog);
        let header = self.read_until(">").await;
        assert!(
            header.contains("<stream:stream"),
            "expected stream header, got {:?}",
            header
        );
        header
    }

    pub async fn send(&mut self, data: &str) {
        self.stream.write_all(data.as_bytes()).await.unwrap();
    }

    /// Answer the client's header with ours.
    pub async fn send_stream_header(&mut self, id: &str) {
        self.send(&format!(
            "<?xml version='1.0'?><stream:stream xmlns='jabber:client' \
             xmlns:stream='http://etherx.jabber.org/streams' from='127.0.0.1' \
             id='{}' version='1.0' xml:lang='en'>",
            id
        ))
        .await;
    }
}
