//! # WebSocket End-to-End
//!
//! Real sockets on both sides:
//!
//! ```text
//! relay client (tungstenite server) ◄── WsConnector ── relay ◄── primary (tungstenite client)
//! ```

#[cfg(test)]
mod tests {
    use crate::fixtures::{service_config, WAIT};
    use futures::{SinkExt, StreamExt};
    use relay_gateway::RelayService;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    fn text_json(message: Message) -> Value {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_relay_client_to_primary_over_websockets() {
        // Relay client side: a WebSocket server the relay connects out to
        let relay_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay_addr = relay_listener.local_addr().unwrap();
        let relay_client = tokio::spawn(async move {
            let (stream, _) = relay_listener.accept().await.unwrap();
            tokio_tungstenite::accept_async(stream).await.unwrap()
        });

        let relay_address = relay_addr.to_string();
        let mut service =
            RelayService::with_default_connector(service_config(&[relay_address.as_str()])).unwrap();
        let listen_addr = service.start().await.unwrap();
        let mut relay_ws = tokio::time::timeout(WAIT, relay_client).await.unwrap().unwrap();

        // Primary side: connect to the relay's listener and answer requests
        let (mut primary_ws, _) = tokio_tungstenite::connect_async(format!("ws://{listen_addr}/"))
            .await
            .unwrap();
        tokio::time::timeout(WAIT, service.primary().await_connection())
            .await
            .unwrap();

        relay_ws
            .send(Message::Text(
                json!({"jsonrpc": "2.0", "id": 42, "method": "getFileNames", "params": {"server": "home"}})
                    .to_string()
                    .into(),
            ))
            .await
            .unwrap();

        let request = text_json(primary_ws.next().await.unwrap().unwrap());
        assert_eq!(request["method"], "getFileNames");
        assert_ne!(request["id"], json!(null));
        primary_ws
            .send(Message::Text(
                json!({"jsonrpc": "2.0", "id": request["id"], "result": ["hack.js"]})
                    .to_string()
                    .into(),
            ))
            .await
            .unwrap();

        let answer = text_json(tokio::time::timeout(WAIT, relay_ws.next()).await.unwrap().unwrap().unwrap());
        assert_eq!(answer, json!({"jsonrpc": "2.0", "id": 42, "result": ["hack.js"]}));

        let status = service.status();
        assert!(status.primary_connected);
        assert_eq!(status.active_relays, vec![format!("ws://{relay_addr}")]);
        assert_eq!(status.relay_stats.delivered, 1);

        service.shutdown().await;

        // Shutdown closes the primary socket
        let closed = tokio::time::timeout(WAIT, async {
            loop {
                match primary_ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok());
    }

    #[tokio::test]
    async fn test_facade_call_over_a_real_primary_socket() {
        let mut service = RelayService::with_default_connector(service_config(&[])).unwrap();
        let listen_addr = service.start().await.unwrap();

        let (mut primary_ws, _) = tokio_tungstenite::connect_async(format!("ws://{listen_addr}/"))
            .await
            .unwrap();
        tokio::time::timeout(WAIT, service.primary().await_connection())
            .await
            .unwrap();

        let api = service.api().clone();
        let call = tokio::spawn(async move { api.push_file("hack.js", "ns.hack()", "home").await });

        let request = text_json(primary_ws.next().await.unwrap().unwrap());
        assert_eq!(request["method"], "pushFile");
        assert_eq!(request["params"], json!({"filename": "hack.js", "content": "ns.hack()", "server": "home"}));
        primary_ws
            .send(Message::Text(
                json!({"jsonrpc": "2.0", "id": request["id"], "result": "OK"}).to_string().into(),
            ))
            .await
            .unwrap();

        assert_eq!(call.await.unwrap(), Ok(true));

        // The primary going away is noticed
        primary_ws.close(None).await.unwrap();
        let primary = std::sync::Arc::clone(service.primary());
        crate::fixtures::eventually("primary disconnected", move || !primary.is_connected()).await;

        service.shutdown().await;
    }
}
