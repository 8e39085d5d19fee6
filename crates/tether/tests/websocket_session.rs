//! A host and a client manager talking over real WebSocket transports on
//! loopback.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use tether::prelude::*;
    use tokio::sync::broadcast;

    async fn next(rx: &mut broadcast::Receiver<ConnectStatus>) -> ConnectStatus {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("status should arrive in time")
            .expect("channel should stay open")
    }

    async fn peer_event(rx: &mut broadcast::Receiver<PeerEvent>) -> PeerEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("peer event should arrive in time")
            .expect("channel should stay open")
    }

    #[tokio::test]
    async fn test_client_joins_host_and_sees_session_end() {
        // Host on an ephemeral port.
        let (host_tx, host_rx) = event_channel();
        let host_transport = Arc::new(WebSocketTransport::new(host_tx));
        let host = ConnectionManagerBuilder::new()
            .session_name("loopback")
            .max_players(4)
            .build(
                Arc::clone(&host_transport),
                Arc::new(DirectAddressDirectory::new("127.0.0.1:0")),
                host_rx,
            )
            .spawn();
        let mut host_status = host.subscribe_status();
        let mut host_peers = host.subscribe_peers();

        host.start_as_host("Host").await.unwrap();
        assert_eq!(next(&mut host_status).await, ConnectStatus::Connecting);
        assert_eq!(next(&mut host_status).await, ConnectStatus::Success);
        let addr = host_transport.local_addr().expect("host is bound").to_string();

        // Client straight at the bound address.
        let (client_tx, client_rx) = event_channel();
        let client = ConnectionManagerBuilder::new()
            .build(
                Arc::new(WebSocketTransport::new(client_tx)),
                Arc::new(DirectAddressDirectory::new(addr.clone())),
                client_rx,
            )
            .spawn();
        let mut client_status = client.subscribe_status();

        client
            .connect_direct(Coordinates::Address(addr), "Alice")
            .await
            .unwrap();
        assert_eq!(next(&mut client_status).await, ConnectStatus::Connecting);
        assert_eq!(next(&mut client_status).await, ConnectStatus::Success);
        assert_eq!(client.state().await.unwrap(), StateKind::ClientConnected);

        let joined = peer_event(&mut host_peers).await;
        assert_eq!(joined.display_name.as_deref(), Some("Alice"));
        assert_eq!(joined.status, ConnectStatus::Success);
        assert_eq!(host.connected_players().await.unwrap().len(), 2);

        // Host leaves; the client is told why.
        host.request_shutdown().await.unwrap();
        assert_eq!(
            next(&mut host_status).await,
            ConnectStatus::UserRequestedDisconnect
        );
        assert_eq!(
            next(&mut client_status).await,
            ConnectStatus::HostEndedSession
        );
        assert_eq!(client.state().await.unwrap(), StateKind::Offline);
    }

    #[tokio::test]
    async fn test_client_rejected_when_host_full() {
        let (host_tx, host_rx) = event_channel();
        let host_transport = Arc::new(WebSocketTransport::new(host_tx));
        // Room for the host alone.
        let host = ConnectionManagerBuilder::new()
            .max_players(1)
            .build(
                Arc::clone(&host_transport),
                Arc::new(DirectAddressDirectory::new("127.0.0.1:0")),
                host_rx,
            )
            .spawn();
        let mut host_status = host.subscribe_status();
        host.start_as_host("Host").await.unwrap();
        assert_eq!(next(&mut host_status).await, ConnectStatus::Connecting);
        assert_eq!(next(&mut host_status).await, ConnectStatus::Success);
        let addr = host_transport.local_addr().expect("host is bound").to_string();

        let (client_tx, client_rx) = event_channel();
        let client = ConnectionManagerBuilder::new()
            .build(
                Arc::new(WebSocketTransport::new(client_tx)),
                Arc::new(DirectAddressDirectory::new(addr.clone())),
                client_rx,
            )
            .spawn();
        let mut client_status = client.subscribe_status();

        client
            .connect_direct(Coordinates::Address(addr), "Alice")
            .await
            .unwrap();

        assert_eq!(next(&mut client_status).await, ConnectStatus::Connecting);
        assert_eq!(next(&mut client_status).await, ConnectStatus::ServerFull);
        host.request_shutdown().await.unwrap();
    }
}
