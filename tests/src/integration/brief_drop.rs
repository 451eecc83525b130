//! # Brief Primary Drop
//!
//! ```text
//! relay client ──{id:1, getFileNames}──→ relay ──✗ primary gone
//!                                          │
//!                                       queued
//!                                          │
//! primary reconnects ←── requeue tick ─────┘
//!          │
//!          └──result──→ relay ──{id:1, result}──→ relay client
//! ```

#[cfg(test)]
mod tests {
    use crate::fixtures::{eventually, start_service, FakePrimary, FakeRelayClient};
    use relay_gateway::{MemoryConnector, PrimaryEvent};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_request_during_brief_drop_is_answered_after_reconnect() {
        let connector = Arc::new(MemoryConnector::default());
        let mut incoming = connector.listen("ws://relay:1");
        let mut service = start_service(&connector, &["relay:1"]).await;
        let mut relay = FakeRelayClient::accept(&mut incoming).await;
        let mut events = service.primary().subscribe();

        let first = FakePrimary::connect(service.primary());
        assert_eq!(events.recv().await.unwrap(), PrimaryEvent::Connected { generation: 1 });

        first.disconnect();
        assert_eq!(events.recv().await.unwrap(), PrimaryEvent::Disconnected { generation: 1 });

        relay
            .send_request(1, "getFileNames", json!({"server": "home"}))
            .await;
        let queue = Arc::clone(service.relays().queue());
        eventually("request queued", || queue.len() == 1).await;

        let mut second = FakePrimary::connect(service.primary());
        let request = second.next_request().await;
        assert_eq!(request["method"], "getFileNames");
        assert_eq!(request["params"]["server"], "home");
        second.reply_result(&request, json!(["hack.js", "grow.js"])).await;

        let answer = relay.next_frame().await;
        assert_eq!(
            answer,
            json!({"jsonrpc": "2.0", "id": 1, "result": ["hack.js", "grow.js"]})
        );
        assert!(service.relays().queue().is_empty());

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_queue_survives_several_reconnect_cycles() {
        let connector = Arc::new(MemoryConnector::default());
        let mut incoming = connector.listen("ws://relay:1");
        let mut service = start_service(&connector, &["relay:1"]).await;
        let mut relay = FakeRelayClient::accept(&mut incoming).await;

        relay.send_request(9, "getAllServers", json!({})).await;
        let queue = Arc::clone(service.relays().queue());
        eventually("request queued", || queue.len() == 1).await;

        // Primaries that drop before answering hand the entry back to the queue
        for _ in 0..3 {
            let mut flaky = FakePrimary::connect(service.primary());
            flaky.next_request().await;
            flaky.disconnect();
            eventually("request requeued", || queue.len() == 1).await;
        }

        let mut stable = FakePrimary::connect(service.primary());
        let request = stable.next_request().await;
        stable.reply_result(&request, json!([])).await;

        let answer = relay.next_frame().await;
        assert_eq!(answer["id"], 9);
        assert_eq!(answer["result"], json!([]));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_unavailable_sentinel_is_immediate() {
        let connector = Arc::new(MemoryConnector::default());
        let mut service = start_service(&connector, &[]).await;

        let started = Instant::now();
        let outcome = service.primary().send("getFileNames", json!({"server": "home"})).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, Ok(None));
        // Nowhere near the 10 s response timeout
        assert!(elapsed < Duration::from_millis(100), "took {elapsed:?}");
        assert_eq!(service.primary().pending().pending_count(), 0);
        assert_eq!(service.primary().pending().stats().snapshot().registered, 0);

        service.shutdown().await;
    }
}
