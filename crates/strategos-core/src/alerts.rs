//! Alerting boundary.
//!
//! The scheduler reports tick failures, lag, and victories as [`Alert`]s.
//! [`Alerter`] rate-limits them to a fixed number per rolling window and
//! delivers each one to an [`AlertSink`] under a bounded timeout. Delivery
//! failures are logged and swallowed; emitting never fails its caller.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use strategos_types::{ErrorKind, SessionId};
use tokio::sync::Mutex;

use crate::config::AlertConfig;

/// Maximum alerts kept by a [`MemoryAlertSink`].
pub const MAX_STORED_ALERTS: usize = 500;

// ---------------------------------------------------------------------------
// Alert types
// ---------------------------------------------------------------------------

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Notable, no action needed.
    Info,
    /// Degraded but running.
    Warning,
    /// Needs attention.
    Critical,
}

/// What the alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCode {
    /// A session tick raised an error.
    TickFailure,
    /// A session tick exceeded the lag threshold.
    TickLag,
    /// A session ended with a victory.
    Victory,
}

/// A single alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Severity.
    pub level: AlertLevel,
    /// Category.
    pub code: AlertCode,
    /// Human-readable message.
    pub message: String,
    /// Session concerned, if any.
    pub session_id: Option<SessionId>,
    /// Structured detail.
    pub detail: Option<serde_json::Value>,
    /// Wall-clock time the alert was raised.
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    /// Create an alert raised now.
    pub fn new(level: AlertLevel, code: AlertCode, message: impl Into<String>) -> Self {
        Self {
            level,
            code,
            message: message.into(),
            session_id: None,
            detail: None,
            raised_at: Utc::now(),
        }
    }

    /// Attach the session concerned.
    #[must_use]
    pub const fn for_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attach structured detail.
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Errors from alert delivery.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// The sink rejected or failed the delivery.
    #[error("alert delivery failed: {0}")]
    Delivery(String),

    /// The webhook request failed.
    #[error("alert webhook error: {source}")]
    Webhook {
        /// The underlying HTTP error.
        #[from]
        source: reqwest::Error,
    },

    /// Delivery did not finish in time.
    #[error("alert delivery timed out after {0} ms")]
    Timeout(u128),
}

impl AlertError {
    /// Taxonomy category of this error.
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Infrastructure
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Destination for alerts.
pub trait AlertSink: Send + Sync {
    /// Deliver one alert.
    fn deliver(&self, alert: &Alert) -> impl Future<Output = Result<(), AlertError>> + Send;
}

/// Bounded in-memory alert store, newest first.
#[derive(Debug, Clone, Default)]
pub struct MemoryAlertSink {
    alerts: Arc<Mutex<VecDeque<Alert>>>,
}

impl MemoryAlertSink {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored alerts, newest first.
    pub async fn all(&self) -> Vec<Alert> {
        self.alerts.lock().await.iter().cloned().collect()
    }

    /// Stored alerts with `code`.
    pub async fn by_code(&self, code: AlertCode) -> Vec<Alert> {
        self.alerts
            .lock()
            .await
            .iter()
            .filter(|a| a.code == code)
            .cloned()
            .collect()
    }
}

impl AlertSink for MemoryAlertSink {
    async fn deliver(&self, alert: &Alert) -> Result<(), AlertError> {
        let mut alerts = self.alerts.lock().await;
        alerts.push_front(alert.clone());
        alerts.truncate(MAX_STORED_ALERTS);
        Ok(())
    }
}

/// Posts alerts as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    /// Create a sink posting to `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl AlertSink for WebhookAlertSink {
    async fn deliver(&self, alert: &Alert) -> Result<(), AlertError> {
        self.client
            .post(&self.url)
            .json(alert)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// The engine's sink: logs every alert, keeps recent ones in memory, and
/// forwards to a webhook when one is configured.
#[derive(Debug, Clone, Default)]
pub struct StandardAlertSink {
    memory: MemoryAlertSink,
    webhook: Option<WebhookAlertSink>,
}

impl StandardAlertSink {
    /// Build from configuration.
    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            memory: MemoryAlertSink::new(),
            webhook: config.webhook_url.as_deref().map(WebhookAlertSink::new),
        }
    }

    /// Recently delivered alerts.
    pub const fn memory(&self) -> &MemoryAlertSink {
        &self.memory
    }
}

impl AlertSink for StandardAlertSink {
    async fn deliver(&self, alert: &Alert) -> Result<(), AlertError> {
        match alert.level {
            AlertLevel::Critical => tracing::error!(
                code = ?alert.code,
                session_id = ?alert.session_id,
                "{}",
                alert.message
            ),
            AlertLevel::Warning => tracing::warn!(
                code = ?alert.code,
                session_id = ?alert.session_id,
                "{}",
                alert.message
            ),
            AlertLevel::Info => tracing::info!(
                code = ?alert.code,
                session_id = ?alert.session_id,
                "{}",
                alert.message
            ),
        }
        self.memory.deliver(alert).await?;
        if let Some(webhook) = &self.webhook {
            webhook.deliver(alert).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rate limiting and delivery
// ---------------------------------------------------------------------------

/// Sliding-window limiter: at most `max` events per `window`.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max: usize,
    window: TimeDelta,
    sent: VecDeque<DateTime<Utc>>,
}

impl RateLimiter {
    /// Create a limiter.
    pub fn new(max: u32, window_seconds: u64) -> Self {
        let window = i64::try_from(window_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Self {
            max: usize::try_from(max).unwrap_or(usize::MAX),
            window,
            sent: VecDeque::new(),
        }
    }

    /// Record an event at `now` if the window has room.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> bool {
        while let Some(oldest) = self.sent.front() {
            if now.signed_duration_since(*oldest) >= self.window {
                self.sent.pop_front();
            } else {
                break;
            }
        }
        if self.sent.len() >= self.max {
            return false;
        }
        self.sent.push_back(now);
        true
    }
}

/// Rate-limited, time-bounded alert emitter.
#[derive(Debug)]
pub struct Alerter<K> {
    sink: K,
    limiter: Mutex<RateLimiter>,
    timeout: Duration,
}

impl<K: AlertSink> Alerter<K> {
    /// Create an emitter over `sink`.
    pub fn new(sink: K, config: &AlertConfig) -> Self {
        Self {
            sink,
            limiter: Mutex::new(RateLimiter::new(config.max_per_window, config.window_seconds)),
            timeout: Duration::from_millis(config.delivery_timeout_ms),
        }
    }

    /// The underlying sink.
    pub const fn sink(&self) -> &K {
        &self.sink
    }

    /// Emit `alert`. Returns whether it was delivered.
    ///
    /// Alerts beyond the window limit are dropped; failed or slow
    /// deliveries are logged and otherwise ignored.
    pub async fn emit(&self, alert: Alert) -> bool {
        if !self.limiter.lock().await.try_acquire(alert.raised_at) {
            tracing::debug!(code = ?alert.code, session_id = ?alert.session_id, "Alert suppressed by rate limit");
            return false;
        }
        match tokio::time::timeout(self.timeout, self.sink.deliver(&alert)).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::warn!(code = ?alert.code, %err, "Alert delivery failed");
                false
            }
            Err(_elapsed) => {
                let err = AlertError::Timeout(self.timeout.as_millis());
                tracing::warn!(code = ?alert.code, %err, "Alert delivery failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct FailingSink;

    impl AlertSink for FailingSink {
        async fn deliver(&self, _alert: &Alert) -> Result<(), AlertError> {
            Err(AlertError::Delivery("unreachable".to_owned()))
        }
    }

    struct StallingSink;

    impl AlertSink for StallingSink {
        async fn deliver(&self, _alert: &Alert) -> Result<(), AlertError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn config(max_per_window: u32) -> AlertConfig {
        AlertConfig {
            max_per_window,
            window_seconds: 60,
            delivery_timeout_ms: 50,
            webhook_url: None,
        }
    }

    #[test]
    fn limiter_allows_n_per_rolling_window() {
        let mut limiter = RateLimiter::new(2, 60);
        let t0 = Utc::now();
        assert!(limiter.try_acquire(t0));
        assert!(limiter.try_acquire(t0 + TimeDelta::try_seconds(10).unwrap()));
        assert!(!limiter.try_acquire(t0 + TimeDelta::try_seconds(59).unwrap()));
        assert!(limiter.try_acquire(t0 + TimeDelta::try_seconds(60).unwrap()));
        assert!(!limiter.try_acquire(t0 + TimeDelta::try_seconds(61).unwrap()));
    }

    #[tokio::test]
    async fn emitter_stores_and_rate_limits() {
        let alerter = Alerter::new(MemoryAlertSink::new(), &config(2));
        let session = SessionId::new();
        for _ in 0..3 {
            alerter
                .emit(Alert::new(AlertLevel::Warning, AlertCode::TickLag, "slow").for_session(session))
                .await;
        }
        let stored = alerter.sink().all().await;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored.first().unwrap().session_id, Some(session));
        assert!(alerter.sink().by_code(AlertCode::Victory).await.is_empty());
    }

    #[tokio::test]
    async fn delivery_failures_are_swallowed() {
        let failing = Alerter::new(FailingSink, &config(10));
        assert!(!failing.emit(Alert::new(AlertLevel::Critical, AlertCode::TickFailure, "x")).await);

        let stalling = Alerter::new(StallingSink, &config(10));
        assert!(!stalling.emit(Alert::new(AlertLevel::Info, AlertCode::Victory, "y")).await);
    }

    #[tokio::test]
    async fn standard_sink_keeps_recent_alerts() {
        let sink = StandardAlertSink::from_config(&config(10));
        let alert = Alert::new(AlertLevel::Info, AlertCode::Victory, "alliance wins")
            .with_detail(serde_json::json!({ "winner": "alliance" }));
        sink.deliver(&alert).await.unwrap();
        assert_eq!(sink.memory().all().await, vec![alert]);
    }
}
