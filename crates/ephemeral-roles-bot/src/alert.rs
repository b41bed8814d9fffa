//! ERROR events forwarded to a Discord webhook

use std::fmt;

use anyhow::{Context as _, Result};
use serenity::builder::ExecuteWebhook;
use serenity::http::Http;
use serenity::model::webhook::Webhook;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{warn, Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Discord rejects longer message content.
const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub target: String,
    pub message: String,
}

impl Alert {
    pub fn content(&self) -> String {
        format!("**ERROR** `{}` {}", self.target, self.message)
            .chars()
            .take(MAX_CONTENT_CHARS)
            .collect()
    }
}

/// Queues ERROR events for the webhook worker. Events are dropped while the
/// queue is full.
pub struct AlertLayer {
    tx: mpsc::Sender<Alert>,
}

impl AlertLayer {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl<S: Subscriber> Layer<S> for AlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != tracing::Level::ERROR {
            return;
        }
        let mut visitor = AlertVisitor::default();
        event.record(&mut visitor);
        let _ = self.tx.try_send(Alert {
            target: event.metadata().target().to_string(),
            message: visitor.finish(),
        });
    }
}

#[derive(Default)]
struct AlertVisitor {
    message: String,
    fields: Vec<String>,
}

impl AlertVisitor {
    fn finish(self) -> String {
        let mut out = self.message;
        for field in self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&field);
        }
        out
    }
}

impl Visit for AlertVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// Deliver queued alerts until every [`AlertLayer`] is dropped.
pub async fn run(mut alerts: mpsc::Receiver<Alert>, webhook_url: String, username: String) -> Result<()> {
    let http = Http::new("");
    let webhook = Webhook::from_url(&http, &webhook_url)
        .await
        .context("Failed to resolve alert webhook")?;

    while let Some(alert) = alerts.recv().await {
        let builder = ExecuteWebhook::new()
            .username(username.as_str())
            .content(alert.content());
        if let Err(e) = webhook.execute(&http, false, builder).await {
            // Only ERROR events are forwarded, so this cannot loop.
            warn!(error = %e, "Failed to deliver alert");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{error, info, warn};
    use tracing_subscriber::layer::SubscriberExt;

    fn capture(f: impl FnOnce()) -> Vec<Alert> {
        let (layer, mut rx) = AlertLayer::new(16);
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);

        let mut alerts = Vec::new();
        while let Ok(alert) = rx.try_recv() {
            alerts.push(alert);
        }
        alerts
    }

    #[test]
    fn test_only_errors_are_forwarded() {
        let alerts = capture(|| {
            info!("joined");
            warn!("slow");
            error!(guild = "Test Guild", code = 50013, "Unable to grant ephemeral role");
        });

        assert_eq!(alerts.len(), 1);
        assert_eq!(
            alerts[0].message,
            "Unable to grant ephemeral role guild=Test Guild code=50013"
        );
        assert_eq!(alerts[0].target, module_path!());
    }

    #[test]
    fn test_full_queue_drops_events() {
        let (layer, mut rx) = AlertLayer::new(1);
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            error!("first");
            error!("second");
        });

        assert_eq!(rx.try_recv().unwrap().message, "first");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_content_is_truncated() {
        let alert = Alert {
            target: "ephemeral_roles_bot".to_string(),
            message: "é".repeat(3000),
        };
        let content = alert.content();
        assert_eq!(content.chars().count(), MAX_CONTENT_CHARS);
        assert!(content.starts_with("**ERROR** `ephemeral_roles_bot` é"));
    }
}
