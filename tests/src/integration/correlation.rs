//! # Request Correlation
//!
//! Relay clients pick their own ids, often the same ones. The relay rewrites
//! every request under a process-wide id and answers each client under the
//! id it sent, exactly once.

#[cfg(test)]
mod tests {
    use crate::fixtures::{eventually, start_service, FakePrimary, FakeRelayClient};
    use relay_gateway::rpc::RAM_NOT_CALCULATED;
    use relay_gateway::{MemoryConnector, RpcErrorKind};
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ids_are_unique_across_facade_and_relays() {
        let connector = Arc::new(MemoryConnector::default());
        let mut a_incoming = connector.listen("ws://a:1");
        let mut b_incoming = connector.listen("ws://b:1");
        let mut service = start_service(&connector, &["a:1", "b:1"]).await;
        let mut a = FakeRelayClient::accept(&mut a_incoming).await;
        let mut b = FakeRelayClient::accept(&mut b_incoming).await;
        let mut primary = FakePrimary::connect(service.primary());

        // Both relay clients reuse id 1
        a.send_request(1, "getFile", json!({"from": "a"})).await;
        b.send_request(1, "getFile", json!({"from": "b"})).await;
        let api = service.api().clone();
        let facade = tokio::spawn(async move { api.get_file("local.js", "home").await });

        let mut seen = HashSet::new();
        for _ in 0..3 {
            let request = primary.next_request().await;
            assert!(seen.insert(request["id"].as_u64().unwrap()), "duplicate id");
            let origin = request["params"]["from"].as_str().unwrap_or("facade").to_owned();
            primary.reply_result(&request, json!(origin)).await;
        }

        assert_eq!(a.next_frame().await, json!({"jsonrpc": "2.0", "id": 1, "result": "a"}));
        assert_eq!(b.next_frame().await, json!({"jsonrpc": "2.0", "id": 1, "result": "b"}));
        assert_eq!(facade.await.unwrap(), Ok(Some("facade".to_string())));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_queued_requests_are_delivered_exactly_once() {
        let connector = Arc::new(MemoryConnector::default());
        let mut incoming = connector.listen("ws://relay:1");
        let mut service = start_service(&connector, &["relay:1"]).await;
        let mut relay = FakeRelayClient::accept(&mut incoming).await;

        for id in 100..105 {
            relay.send_request(id, "calculateRam", json!({"n": id})).await;
        }
        let queue = Arc::clone(service.relays().queue());
        eventually("all requests queued", || queue.len() == 5).await;

        let mut primary = FakePrimary::connect(service.primary());
        let mut forwarded = Vec::new();
        for _ in 0..5 {
            let request = primary.next_request().await;
            forwarded.push(request["params"]["n"].as_u64().unwrap());
            let n = request["params"]["n"].clone();
            primary.reply_result(&request, n).await;
        }
        // Drained in arrival order
        assert_eq!(forwarded, vec![100, 101, 102, 103, 104]);

        let mut answered = Vec::new();
        for _ in 0..5 {
            let answer = relay.next_frame().await;
            assert_eq!(answer["id"], answer["result"]);
            answered.push(answer["id"].as_u64().unwrap());
        }
        answered.sort();
        assert_eq!(answered, vec![100, 101, 102, 103, 104]);

        // Several more ticks: nothing is sent or answered twice
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(primary.is_idle());
        assert!(relay.is_idle());
        assert!(service.relays().queue().is_empty());

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_remote_errors_reach_relay_clients() {
        let connector = Arc::new(MemoryConnector::default());
        let mut incoming = connector.listen("ws://relay:1");
        let mut service = start_service(&connector, &["relay:1"]).await;
        let mut relay = FakeRelayClient::accept(&mut incoming).await;
        let mut primary = FakePrimary::connect(service.primary());

        relay.send_request(5, "getFile", json!({"filename": "nope.js"})).await;
        let request = primary.next_request().await;
        primary.reply_error(&request, "File doesn't exist").await;

        let answer = relay.next_frame().await;
        assert_eq!(answer, json!({"jsonrpc": "2.0", "id": 5, "error": "File doesn't exist"}));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_relay_frames_get_no_reply() {
        let connector = Arc::new(MemoryConnector::default());
        let mut incoming = connector.listen("ws://relay:1");
        let mut service = start_service(&connector, &["relay:1"]).await;
        let mut relay = FakeRelayClient::accept(&mut incoming).await;
        let mut primary = FakePrimary::connect(service.primary());

        relay.send_raw("not json at all").await;
        relay
            .send_raw(r#"{"id": 1, "method": "getFile", "params": {}}"#)
            .await;
        relay
            .send_raw(r#"{"jsonrpc": "2.0", "id": "1", "method": "getFile", "params": {}}"#)
            .await;
        relay
            .send_raw(r#"{"jsonrpc": "2.0", "id": 1, "method": 7, "params": {}}"#)
            .await;
        relay.send_request(2, "getFile", json!({})).await;

        // Only the well-formed request reaches the primary
        let request = primary.next_request().await;
        assert_eq!(request["method"], "getFile");
        primary.reply_result(&request, json!("ok")).await;
        assert_eq!(relay.next_frame().await, json!({"jsonrpc": "2.0", "id": 2, "result": "ok"}));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(primary.is_idle());
        assert!(relay.is_idle());
        assert_eq!(service.relays().stats().snapshot().received, 1);

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_calculate_ram_sentinel_through_service() {
        let connector = Arc::new(MemoryConnector::default());
        let mut service = start_service(&connector, &[]).await;
        let mut primary = FakePrimary::connect(service.primary());

        let api = service.api().clone();
        let call = tokio::spawn(async move { api.calculate_ram("weird.js", "home").await });
        let request = primary.next_request().await;
        assert_eq!(request["method"], "calculateRam");
        primary
            .reply_error(&request, "Ram cost could not be calculated")
            .await;
        assert_eq!(call.await.unwrap(), Ok(Some(RAM_NOT_CALCULATED)));

        let api = service.api().clone();
        let call = tokio::spawn(async move { api.get_file("a.js", "nowhere").await });
        let request = primary.next_request().await;
        primary.reply_error(&request, "Invalid hostname").await;
        assert_eq!(call.await.unwrap().unwrap_err().kind, RpcErrorKind::InvalidHostname);

        let api = service.api().clone();
        let call = tokio::spawn(async move { api.get_definition_file().await });
        let request = primary.next_request().await;
        primary.reply_result(&request, Value::Null).await;
        assert_eq!(call.await.unwrap().unwrap_err().kind, RpcErrorKind::Failed);

        service.shutdown().await;
    }
}
