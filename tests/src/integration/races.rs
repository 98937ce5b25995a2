//! # Resolution Races
//!
//! Exactly one of reply, timeout and cancellation resolves each request, and
//! every path leaves the registry empty.

#[cfg(test)]
mod tests {
    use crate::fixtures::{handler, RequestTap, SERVICE_TOPIC};
    use futures::future::join_all;
    use rpc_core::{cancel_pair, CancelCause, Message, RequestOptions};
    use shared_bus::InMemoryBroker;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_is_dropped() {
        let broker = Arc::new(InMemoryBroker::new());
        let caller = handler(&broker, "caller", Duration::from_millis(200)).await;
        let mut tap = RequestTap::attach(&broker, "service", SERVICE_TOPIC).await;

        let err = caller.request_payload(SERVICE_TOPIC, "slow").await.unwrap_err();
        assert!(err.is_timeout());

        let request = tap.next_request().await;
        tap.reply(&request, "too late").await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let stats = caller.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.dropped_replies, 1);

        // The router is still healthy.
        let service = tokio::spawn(async move {
            let request = tap.next_request().await;
            tap.reply(&request, "on time").await;
        });
        let reply = caller.request_payload(SERVICE_TOPIC, "fast").await.unwrap();
        assert_eq!(reply.payload.as_ref(), b"on time");
        service.await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_reply_delivered_once() {
        let broker = Arc::new(InMemoryBroker::new());
        let caller = handler(&broker, "caller", Duration::from_secs(1)).await;
        let mut tap = RequestTap::attach(&broker, "service", SERVICE_TOPIC).await;

        let service = tokio::spawn(async move {
            let request = tap.next_request().await;
            tap.reply(&request, "first").await;
            tap.reply(&request, "second").await;
            tap
        });

        let reply = caller.request_payload(SERVICE_TOPIC, "ping").await.unwrap();
        assert_eq!(reply.payload.as_ref(), b"first");

        let _tap = service.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(caller.stats().delivered, 1);
        assert_eq!(caller.stats().dropped_replies, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_then_reply() {
        let broker = Arc::new(InMemoryBroker::new());
        let caller = handler(&broker, "caller", Duration::from_secs(30)).await;
        let mut tap = RequestTap::attach(&broker, "service", SERVICE_TOPIC).await;
        let (source, signal) = cancel_pair();

        let service = tokio::spawn(async move {
            let request = tap.next_request().await;
            source.cancel("operator abort");
            tokio::time::sleep(Duration::from_millis(50)).await;
            tap.reply(&request, "ignored").await;
        });

        let err = caller
            .request_with(
                Message::new(SERVICE_TOPIC, "ping"),
                RequestOptions::new().with_cancel(signal),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.cancel_cause(),
            Some(&CancelCause::Cancelled("operator abort".into()))
        );
        assert_eq!(caller.pending_count(), 0);

        service.await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(caller.stats().cancelled, 1);
        assert_eq!(caller.stats().delivered, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_outcomes_leave_registry_empty() {
        let broker = Arc::new(InMemoryBroker::new());
        let caller = handler(&broker, "caller", Duration::from_millis(300)).await;
        let mut tap = RequestTap::attach(&broker, "service", SERVICE_TOPIC).await;
        let (source, signal) = cancel_pair();

        // Answer even-numbered requests; odd ones time out or get cancelled.
        let service = tokio::spawn(async move {
            for _ in 0..30 {
                let request = tap.next_request().await;
                let payload = String::from_utf8_lossy(&request.payload).to_string();
                let n: usize = payload.trim_start_matches("req-").parse().unwrap();
                if n % 2 == 0 {
                    tap.reply(&request, payload).await;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            source.cancel("enough");
        });

        let calls = (0..30).map(|i| {
            let message = Message::new(SERVICE_TOPIC, format!("req-{i}"));
            let options = if i % 4 == 1 {
                RequestOptions::new()
                    .with_timeout(Duration::from_secs(60))
                    .with_cancel(signal.clone())
            } else {
                RequestOptions::new()
            };
            caller.request_with(message, options)
        });
        let results = join_all(calls).await;

        let mut ok = 0;
        let mut timed_out = 0;
        let mut cancelled = 0;
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(reply) => {
                    assert_eq!(reply.payload.as_ref(), format!("req-{i}").as_bytes());
                    ok += 1;
                }
                Err(e) if e.is_timeout() => timed_out += 1,
                Err(e) if e.is_cancelled() => cancelled += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        // 15 even answered; odd: i % 4 == 1 cancelled (8), i % 4 == 3 time out (7).
        assert_eq!(ok, 15);
        assert_eq!(cancelled, 8);
        assert_eq!(timed_out, 7);
        assert_eq!(caller.pending_count(), 0);
        service.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_request_future() {
        let broker = Arc::new(InMemoryBroker::new());
        let caller = handler(&broker, "caller", Duration::from_secs(30)).await;
        let mut tap = RequestTap::attach(&broker, "service", SERVICE_TOPIC).await;

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            caller.request_payload(SERVICE_TOPIC, "ping"),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(caller.pending_count(), 0);
        assert_eq!(caller.stats().abandoned, 1);

        // A reply to the abandoned request goes nowhere.
        let request = tap.next_request().await;
        tap.reply(&request, "orphan").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(caller.stats().dropped_replies, 1);
    }
}
