//! # Connection Setup
//!
//! Handler construction against brokers with and without credentials.

#[cfg(test)]
mod tests {
    use crate::fixtures::{spawn_echo, SERVICE_TOPIC};
    use rpc_core::{ConnectionError, RequestHandler, RpcConfig, RpcError};
    use shared_bus::InMemoryBroker;
    use std::sync::Arc;

    fn config(toml: &str) -> RpcConfig {
        let config = RpcConfig::from_toml_str(toml).unwrap();
        config.validate().unwrap();
        config
    }

    #[tokio::test]
    async fn test_authenticated_handler() {
        let broker = Arc::new(
            InMemoryBroker::new()
                .with_address("memory://secure")
                .with_credentials("svc", "s3cret"),
        );
        let config = config(
            r#"
            [transport]
            address = "memory://secure"
            username = "svc"
            password = "s3cret"
            client_id = "node-a"

            [requests]
            timeout = "1s"
            "#,
        );

        let handler = RequestHandler::connect(&broker, &config).await.unwrap();
        assert_eq!(handler.reply_topic(), "node-a/responses");
        assert!(broker.is_connected("node-a"));
    }

    #[tokio::test]
    async fn test_bad_password_reports_reason_code() {
        let broker = Arc::new(
            InMemoryBroker::new()
                .with_address("memory://secure")
                .with_credentials("svc", "s3cret"),
        );
        let config = config(
            r#"
            [transport]
            username = "svc"
            password = "guess"
            "#,
        );

        let err = RequestHandler::connect(&broker, &config).await.err().unwrap();
        let RpcError::Connection(ConnectionError::Refused(reason)) = &err else {
            panic!("expected a refused connection");
        };
        assert_eq!(
            reason,
            "failed to connect to memory://secure : 0x86 - bad user name or password"
        );
        assert_eq!(broker.client_count(), 0);
    }

    #[tokio::test]
    async fn test_client_id_in_use() {
        let broker = Arc::new(InMemoryBroker::new());
        let config = config(
            r#"
            [transport]
            client_id = "dup"
            "#,
        );

        let _first = RequestHandler::connect(&broker, &config).await.unwrap();
        let err = RequestHandler::connect(&broker, &config).await.err().unwrap();
        assert!(err.to_string().contains("0x85"));
    }

    #[tokio::test]
    async fn test_random_client_id() {
        let broker = Arc::new(InMemoryBroker::new());
        let _echo = spawn_echo(&broker, "echo").await;

        let handler = RequestHandler::connect(&broker, &RpcConfig::default())
            .await
            .unwrap();
        assert_eq!(handler.client_id().len(), 36);
        assert_eq!(
            handler.reply_topic(),
            format!("{}/responses", handler.client_id())
        );

        let reply = handler.request_payload(SERVICE_TOPIC, "hi").await.unwrap();
        assert_eq!(reply.payload.as_ref(), b"hi");
    }

    #[tokio::test]
    async fn test_dropping_handler_releases_client() {
        let broker = Arc::new(InMemoryBroker::new());
        let config = config(
            r#"
            [transport]
            client_id = "short-lived"
            "#,
        );

        let handler = RequestHandler::connect(&broker, &config).await.unwrap();
        assert!(broker.is_connected("short-lived"));

        drop(handler);
        assert!(!broker.is_connected("short-lived"));
    }
}
