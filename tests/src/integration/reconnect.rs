//! # Connection Churn
//!
//! Primary replacement and relay reconciliation.

#[cfg(test)]
mod tests {
    use crate::fixtures::{eventually, service_config, start_service, FakePrimary, FakeRelayClient, WAIT};
    use relay_gateway::{MemoryConnector, PrimaryEvent, RpcErrorKind};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reconnect_rejects_pending_and_new_requests_succeed() {
        let connector = Arc::new(MemoryConnector::default());
        let mut service = start_service(&connector, &[]).await;
        let mut events = service.primary().subscribe();

        let mut old = FakePrimary::connect(service.primary());
        let api = service.api().clone();
        let stuck = tokio::spawn(async move { api.get_file_names("home").await });
        old.next_request().await;

        let new = FakePrimary::connect(service.primary());
        let err = stuck.await.unwrap().unwrap_err();
        assert_eq!(err.kind, RpcErrorKind::Disconnected);

        new.serve(|method, _| match method {
            "getFileNames" => json!(["fresh.js"]),
            _ => json!(null),
        });
        assert_eq!(
            service.api().get_file_names("home").await,
            Ok(Some(vec!["fresh.js".to_string()]))
        );

        // One notification per accepted primary, none for the replaced socket
        assert_eq!(events.recv().await.unwrap(), PrimaryEvent::Connected { generation: 1 });
        assert_eq!(events.recv().await.unwrap(), PrimaryEvent::Connected { generation: 2 });
        drop(old);
        assert!(service.primary().is_connected());
        assert!(events.try_recv().is_err());

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_await_connection_wakes_every_waiter() {
        let connector = Arc::new(MemoryConnector::default());
        let mut service = start_service(&connector, &[]).await;

        let waiters: Vec<_> = (0..5)
            .map(|_| {
                let primary = Arc::clone(service.primary());
                tokio::spawn(async move { primary.await_connection().await })
            })
            .collect();

        let _primary = FakePrimary::connect(service.primary());
        for waiter in waiters {
            tokio::time::timeout(WAIT, waiter).await.unwrap().unwrap();
        }

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_rejects_in_flight_requests() {
        let connector = Arc::new(MemoryConnector::default());
        let mut service = start_service(&connector, &[]).await;
        let mut primary = FakePrimary::connect(service.primary());

        let api = service.api().clone();
        let call = tokio::spawn(async move { api.get_all_servers().await });
        primary.next_request().await;

        service.shutdown().await;
        assert_eq!(call.await.unwrap().unwrap_err().kind, RpcErrorKind::Disconnected);
        assert_eq!(service.primary().pending().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reapplying_the_same_relays_is_a_no_op() {
        let connector = Arc::new(MemoryConnector::default());
        let _a = connector.listen("ws://a:1");
        let _b = connector.listen("ws://b:1");
        let mut service = start_service(&connector, &["a:1", "ws://b:1", "down:1"]).await;

        let config = service_config(&["a:1", "ws://b:1", "down:1"]);
        service.apply_config(config.clone()).await.unwrap();
        service.apply_config(config).await.unwrap();

        let status = service.status();
        assert_eq!(status.active_relays, vec!["ws://a:1", "ws://b:1"]);
        assert_eq!(status.failed_relays, vec!["ws://down:1"]);
        assert_eq!(connector.attempts("ws://a:1"), 1);
        assert_eq!(connector.attempts("ws://b:1"), 1);

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_relay_reconnects_on_a_later_tick() {
        let connector = Arc::new(MemoryConnector::default());
        let mut service = start_service(&connector, &["late:1"]).await;
        assert_eq!(service.status().failed_relays, vec!["ws://late:1"]);

        let mut incoming = connector.listen("ws://late:1");
        let mut relay = FakeRelayClient::accept(&mut incoming).await;
        let relays = Arc::clone(service.relays());
        eventually("relay active", || relays.active_addresses() == vec!["ws://late:1"]).await;

        // The reconnected relay is fully wired
        let mut primary = FakePrimary::connect(service.primary());
        relay.send_request(3, "getDefinitionFile", json!({})).await;
        let request = primary.next_request().await;
        primary.reply_result(&request, json!("defs")).await;
        assert_eq!(relay.next_frame().await["id"], 3);

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_removed_relay_is_closed_and_forgotten() {
        let connector = Arc::new(MemoryConnector::default());
        let mut incoming = connector.listen("ws://a:1");
        let mut service = start_service(&connector, &["a:1", "gone:1"]).await;
        let _relay = FakeRelayClient::accept(&mut incoming).await;

        service.apply_config(service_config(&[])).await.unwrap();

        let status = service.status();
        assert!(status.active_relays.is_empty());
        assert!(status.failed_relays.is_empty());

        service.shutdown().await;
    }
}
