//! Control channel to the rendezvous server.
//!
//! The WebSocket is split into a writer task draining a queue of outgoing [Message]s and a
//! reader task decoding incoming frames. Neither task reconnects: once the socket is gone the
//! receiver ends and further sends fail with [Error::ChannelClosed].

use crate::error::Error;
use crate::message::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as Frame;

pub type SignalingSender = UnboundedSender<Message>;
pub type SignalingReceiver = UnboundedReceiver<Message>;

/// Opens the control channel to the rendezvous server at `url`.
pub async fn connect(url: &str) -> Result<(SignalingSender, SignalingReceiver), Error> {
    let (ws, _) = connect_async(url).await?;
    log::info!("connected to signaling server {}", url);
    Ok(attach(ws))
}

/// Spawns reader and writer tasks over an established WebSocket.
pub fn attach<S>(ws: S) -> (SignalingSender, SignalingReceiver)
where
    S: Stream<Item = Result<Frame, tokio_tungstenite::tungstenite::Error>>
        + Sink<Frame, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + 'static,
{
    let (mut write, mut read) = ws.split();
    let (outbound_tx, mut outbound_rx) = unbounded_channel::<Message>();
    let (inbound_tx, inbound_rx) = unbounded_channel::<Message>();

    tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let text = match msg.encode() {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("failed to encode {} message: {}", msg.kind(), e);
                    continue;
                }
            };
            log::debug!("sending message: {}", text);
            if let Err(e) = write.send(Frame::Text(text)).await {
                log::warn!("signaling connection error: {}", e);
                return;
            }
        }
        let _ = write.close().await;
    });

    tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            let msg = match frame {
                Ok(Frame::Text(text)) => {
                    log::debug!("got message: {}", text);
                    Message::decode(&text)
                }
                Ok(Frame::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => {
                        log::debug!("got message: {}", text);
                        Message::decode(&text)
                    }
                    Err(e) => {
                        log::warn!("got non UTF-8 binary message: {}", e);
                        continue;
                    }
                },
                Ok(Frame::Close(frame)) => {
                    log::info!("signaling connection closed: {:?}", frame);
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("signaling connection error: {}", e);
                    break;
                }
            };
            if inbound_tx.send(msg).is_err() {
                break;
            }
        }
    });

    (outbound_tx, inbound_rx)
}

#[cfg(test)]
mod test {
    use crate::error::Error;
    use crate::message::Message;
    use crate::signaling::connect;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message as Frame;

    #[tokio::test]
    async fn exchange_with_rendezvous_server() -> Result<(), Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let login = match ws.next().await {
                Some(Ok(Frame::Text(text))) => text,
                other => panic!("unexpected frame {:?}", other),
            };
            ws.send(Frame::Text("{ definitely not json".to_owned()))
                .await
                .unwrap();
            ws.send(Frame::Text(r#"{"type":"login","success":true}"#.to_owned()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
            login
        });

        let (tx, mut rx) = connect(&format!("ws://{}", addr)).await?;
        tx.send(Message::login("alice"))?;

        assert!(matches!(rx.recv().await, Some(Message::Unknown)));
        match rx.recv().await {
            Some(Message::Login { success, .. }) => assert_eq!(success, Some(true)),
            other => panic!("unexpected {:?}", other),
        }
        // connection loss ends the inbound queue
        assert!(rx.recv().await.is_none());

        let login: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(login, json!({ "type": "login", "name": "alice" }));
        Ok(())
    }
}
