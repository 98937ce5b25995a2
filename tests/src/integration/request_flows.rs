//! # Request Flows
//!
//! A handler and one or more services on the same broker:
//!
//! 1. **Happy path**: reply arrives before the timeout
//! 2. **Timeout**: no reply, entry removed
//! 3. **Concurrency**: replies out of order reach their own callers
//! 4. **Noise**: replies without or with unknown correlation ids are ignored

#[cfg(test)]
mod tests {
    use crate::fixtures::{handler, spawn_echo, RequestTap, SERVICE_TOPIC};
    use futures::future::join_all;
    use rpc_core::{CorrelationId, Message, MessageProperties, RpcError};
    use shared_bus::InMemoryBroker;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_ping_pong_within_timeout() {
        let broker = Arc::new(InMemoryBroker::new());
        let caller = handler(&broker, "caller", Duration::from_secs(2)).await;
        let mut tap = RequestTap::attach(&broker, "service", SERVICE_TOPIC).await;

        let service = tokio::spawn(async move {
            let request = tap.next_request().await;
            assert_eq!(request.payload.as_ref(), b"ping");
            tokio::time::sleep(Duration::from_millis(100)).await;
            tap.reply(&request, "pong").await;
        });

        let started = Instant::now();
        let reply = caller.request_payload(SERVICE_TOPIC, "ping").await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(reply.payload.as_ref(), b"pong");
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
        assert_eq!(caller.pending_count(), 0);
        service.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reply_times_out() {
        let broker = Arc::new(InMemoryBroker::new());
        let caller = handler(&broker, "caller", Duration::from_millis(200)).await;
        let mut tap = RequestTap::attach(&broker, "service", SERVICE_TOPIC).await;

        let started = Instant::now();
        let err = caller.request_payload(SERVICE_TOPIC, "ping").await.unwrap_err();
        let elapsed = started.elapsed();

        let RpcError::RequestTimeout { correlation_id, timeout } = err else {
            panic!("expected a request timeout");
        };
        assert_eq!(timeout, Duration::from_millis(200));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(250));
        assert!(!caller.registry().contains(&correlation_id));
        assert_eq!(caller.pending_count(), 0);

        // The request did go out with the id the error names.
        let request = tap.next_request().await;
        assert_eq!(
            request.correlation_data().map(|d| d.as_ref()),
            Some(correlation_id.to_string().as_bytes())
        );
    }

    #[tokio::test]
    async fn test_fifty_concurrent_replies_in_reverse() {
        let broker = Arc::new(InMemoryBroker::new());
        let caller = handler(&broker, "caller", Duration::from_secs(5)).await;
        let mut tap = RequestTap::attach(&broker, "service", SERVICE_TOPIC).await;

        let service = tokio::spawn(async move {
            let mut requests = Vec::with_capacity(50);
            for _ in 0..50 {
                requests.push(tap.next_request().await);
            }
            for request in requests.iter().rev() {
                let payload = String::from_utf8_lossy(&request.payload).to_string();
                tap.reply(request, format!("reply-to-{payload}")).await;
            }
        });

        let calls = (0..50).map(|i| caller.request_payload(SERVICE_TOPIC, format!("req-{i}")));
        let results = join_all(calls).await;

        for (i, result) in results.into_iter().enumerate() {
            let reply = result.unwrap();
            assert_eq!(reply.payload.as_ref(), format!("reply-to-req-{i}").as_bytes());
        }
        assert_eq!(caller.pending_count(), 0);
        assert_eq!(caller.stats().delivered, 50);
        service.await.unwrap();
    }

    #[tokio::test]
    async fn test_two_handlers_share_a_service() {
        let broker = Arc::new(InMemoryBroker::new());
        let _echo = spawn_echo(&broker, "echo").await;
        let a = handler(&broker, "node-a", Duration::from_secs(1)).await;
        let b = handler(&broker, "node-b", Duration::from_secs(1)).await;

        let (ra, rb) = tokio::join!(
            a.request_payload(SERVICE_TOPIC, "from-a"),
            b.request_payload(SERVICE_TOPIC, "from-b"),
        );

        assert_eq!(ra.unwrap().payload.as_ref(), b"from-a");
        assert_eq!(rb.unwrap().payload.as_ref(), b"from-b");
        // Each reply went to its own reply topic only.
        assert_eq!(a.stats().dropped_replies, 0);
        assert_eq!(b.stats().dropped_replies, 0);
    }

    #[tokio::test]
    async fn test_noise_on_reply_topic_is_ignored() {
        let broker = Arc::new(InMemoryBroker::new());
        let caller = handler(&broker, "caller", Duration::from_secs(1)).await;
        let mut tap = RequestTap::attach(&broker, "service", SERVICE_TOPIC).await;

        let service = tokio::spawn(async move {
            let request = tap.next_request().await;

            tap.publish(Message::new("caller/responses", "no id")).await;
            tap.publish(Message::new("caller/responses", "stranger").with_properties(
                MessageProperties {
                    correlation_data: Some(CorrelationId::new().to_correlation_data()),
                    ..Default::default()
                },
            ))
            .await;
            tap.reply(&request, "real").await;
        });

        let reply = caller.request_payload(SERVICE_TOPIC, "ping").await.unwrap();
        assert_eq!(reply.payload.as_ref(), b"real");
        service.await.unwrap();

        assert_eq!(caller.stats().delivered, 1);
        assert_eq!(caller.stats().dropped_replies, 2);
    }

    #[tokio::test]
    async fn test_request_properties_preserved() {
        let broker = Arc::new(InMemoryBroker::new());
        let caller = handler(&broker, "caller", Duration::from_secs(1)).await;
        let mut tap = RequestTap::attach(&broker, "service", SERVICE_TOPIC).await;

        let service = tokio::spawn(async move {
            let request = tap.next_request().await;
            let properties = request.properties.clone().unwrap();
            assert_eq!(properties.content_type.as_deref(), Some("application/json"));
            assert_eq!(properties.response_topic.as_deref(), Some("caller/responses"));
            assert!(!request.retain);
            tap.reply(&request, "{}").await;
        });

        let mut message = Message::new(SERVICE_TOPIC, "{}").with_properties(MessageProperties {
            content_type: Some("application/json".into()),
            ..Default::default()
        });
        message.retain = true;

        caller.request(message).await.unwrap();
        service.await.unwrap();
    }
}
