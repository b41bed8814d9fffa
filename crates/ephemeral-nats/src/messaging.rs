//! Message publishing, subscription and request helpers

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use async_nats::Client;
use futures::StreamExt;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Publishing seam.
/// Implemented by `MessagePublisher` (real NATS) and `MockPublisher` (in-memory, tests).
pub trait Publish: Send + Sync {
    fn prefix(&self) -> &str;

    fn publish<T: Serialize + Sync>(
        &self,
        subject: &str,
        message: &T,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// NATS-backed publisher
#[derive(Clone)]
pub struct MessagePublisher {
    client: Client,
    prefix: String,
}

impl MessagePublisher {
    pub fn new(client: Client, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }
}

impl Publish for MessagePublisher {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn publish<T: Serialize + Sync>(&self, subject: &str, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        trace!(subject, bytes = payload.len(), "Publishing");

        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| Error::Publish(format!("Failed to publish to {}: {}", subject, e)))
    }
}

/// NATS-backed subscriber and requester
#[derive(Clone)]
pub struct MessageSubscriber {
    client: Client,
    prefix: String,
}

impl MessageSubscriber {
    pub fn new(client: Client, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Subscribe to a subject and deserialize messages
    pub async fn subscribe<T: DeserializeOwned>(&self, subject: &str) -> Result<MessageStream<T>> {
        debug!(subject, "Subscribing");

        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| Error::Subscribe(format!("Failed to subscribe to {}: {}", subject, e)))?;

        Ok(MessageStream {
            subscriber,
            _phantom: PhantomData,
        })
    }

    /// Send a request and deserialize the reply.
    pub async fn request<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        subject: &str,
        message: &Req,
        timeout: Duration,
    ) -> Result<Resp> {
        let payload = serde_json::to_vec(message)?;
        let reply = tokio::time::timeout(timeout, self.client.request(subject.to_string(), payload.into()))
            .await
            .map_err(|_| Error::Timeout {
                subject: subject.to_string(),
                timeout,
            })?
            .map_err(|e| Error::Request(format!("Request to {} failed: {}", subject, e)))?;
        Ok(serde_json::from_slice(&reply.payload)?)
    }

    /// Answer a request message. Messages without a reply subject are ignored.
    pub async fn reply<T: Serialize>(&self, request: &async_nats::Message, message: &T) -> Result<()> {
        let Some(reply_to) = request.reply.clone() else {
            warn!(subject = %request.subject, "Request has no reply subject");
            return Ok(());
        };
        let payload = serde_json::to_vec(message)?;
        self.client
            .publish(reply_to, payload.into())
            .await
            .map_err(|e| Error::Publish(format!("Failed to reply on {}: {}", request.subject, e)))
    }
}

/// Stream of deserialized messages
pub struct MessageStream<T> {
    subscriber: async_nats::Subscriber,
    _phantom: PhantomData<T>,
}

impl<T: DeserializeOwned> MessageStream<T> {
    /// Next message, deserialized. `None` once the subscription closes.
    pub async fn next(&mut self) -> Option<Result<T>> {
        let msg = self.subscriber.next().await?;
        trace!(subject = %msg.subject, "Received message");
        Some(serde_json::from_slice(&msg.payload).map_err(Error::from))
    }

    /// Next message without deserialization
    pub async fn next_raw(&mut self) -> Option<async_nats::Message> {
        self.subscriber.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const NATS_URL: &str = "nats://localhost:14222";

    async fn try_connect() -> Option<Client> {
        async_nats::connect(NATS_URL).await.ok()
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Ping {
        value: String,
    }

    fn subject(kind: &str) -> String {
        format!(
            "test.ephemeral-roles.{}.{}",
            kind,
            uuid::Uuid::new_v4().simple()
        )
    }

    #[tokio::test]
    async fn test_publish_subscribe_roundtrip() {
        let Some(client) = try_connect().await else {
            eprintln!("SKIP: NATS not available");
            return;
        };
        let subject = subject("roundtrip");
        let publisher = MessagePublisher::new(client.clone(), "test");
        let subscriber = MessageSubscriber::new(client, "test");
        let mut stream = subscriber.subscribe::<Ping>(&subject).await.unwrap();

        let sent = Ping {
            value: "hello".to_string(),
        };
        publisher.publish(&subject, &sent).await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), sent);
    }

    #[tokio::test]
    async fn test_request_reply() {
        let Some(client) = try_connect().await else {
            eprintln!("SKIP: NATS not available");
            return;
        };
        let subject = subject("request");
        let subscriber = MessageSubscriber::new(client, "test");
        let mut requests = subscriber.subscribe::<Ping>(&subject).await.unwrap();

        let responder = subscriber.clone();
        tokio::spawn(async move {
            if let Some(msg) = requests.next_raw().await {
                let ping: Ping = serde_json::from_slice(&msg.payload).unwrap();
                let pong = Ping {
                    value: format!("{}-pong", ping.value),
                };
                responder.reply(&msg, &pong).await.unwrap();
            }
        });

        let reply: Ping = subscriber
            .request(
                &subject,
                &Ping {
                    value: "ping".to_string(),
                },
                Duration::from_secs(2),
            )
            .await
            .unwrap();
        assert_eq!(reply.value, "ping-pong");
    }

    #[tokio::test]
    async fn test_deserialize_error_on_invalid_json() {
        let Some(client) = try_connect().await else {
            eprintln!("SKIP: NATS not available");
            return;
        };
        let subject = subject("invalid");
        let subscriber = MessageSubscriber::new(client.clone(), "test");
        let mut stream = subscriber.subscribe::<Ping>(&subject).await.unwrap();

        client
            .publish(subject, b"not-valid-json".as_ref().into())
            .await
            .unwrap();

        assert!(matches!(
            stream.next().await.unwrap(),
            Err(Error::Serialization(_))
        ));
    }
}
