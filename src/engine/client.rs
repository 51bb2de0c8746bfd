use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::error::{QcError, QcResult};

use super::types::{CalibrationStatus, EngineReply, EngineStatus, LiveSnapshot, StartRequest};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Status probes made after a restart before giving up.
const RESTART_STATUS_ATTEMPTS: u32 = 5;

/// Contract of the external camera measurement process.
#[async_trait]
pub trait MeasurementEngine: Send + Sync {
    async fn start(&self, request: &StartRequest) -> QcResult<()>;
    async fn stop(&self) -> QcResult<()>;
    async fn status(&self) -> QcResult<EngineStatus>;
    /// `None` while the engine has produced nothing yet.
    async fn live_results(&self) -> QcResult<Option<LiveSnapshot>>;
    /// Best-effort stop, then wait until the engine reports idle.
    async fn restart(&self) -> QcResult<()>;
    async fn calibration_status(&self) -> QcResult<CalibrationStatus>;
    async fn start_calibration(&self) -> QcResult<()>;
    async fn cancel_calibration(&self) -> QcResult<()>;
}

pub struct HttpEngineClient {
    http: Client,
    base_url: String,
    restart_settle: Duration,
}

impl HttpEngineClient {
    pub fn new(base_url: &str, timeout: Duration, restart_settle: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build measurement engine HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            restart_settle,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> QcResult<EngineReply> {
        let response = request
            .send()
            .await
            .map_err(|err| QcError::EngineUnreachable(format!("{what}: {err}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| QcError::EngineUnreachable(format!("{what}: {err}")))?;
        let reply = serde_json::from_str::<EngineReply>(&body).ok();

        if !status.is_success() {
            let message = reply
                .and_then(|reply| reply.message)
                .unwrap_or_else(|| body.chars().take(200).collect());
            return Err(QcError::EngineRejected(format!(
                "{what} returned {status}: {message}"
            )));
        }

        let reply = reply
            .ok_or_else(|| QcError::EngineRejected(format!("{what}: unreadable response")))?;
        if reply.is_error() {
            return Err(QcError::EngineRejected(format!(
                "{what}: {}",
                reply.message.as_deref().unwrap_or("unknown error")
            )));
        }

        Ok(reply)
    }

    fn data_as<T: serde::de::DeserializeOwned>(data: Option<Value>, what: &str) -> QcResult<Option<T>> {
        match data {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|err| QcError::EngineRejected(format!("{what}: unexpected payload: {err}"))),
        }
    }
}

#[async_trait]
impl MeasurementEngine for HttpEngineClient {
    async fn start(&self, request: &StartRequest) -> QcResult<()> {
        log_info!(
            "Starting measurement for {} size {} ({} side)",
            request.article_style,
            request.annotation_name,
            request.side
        );
        self.send(
            self.http.post(self.url("/measurement/start")).json(request),
            "measurement start",
        )
        .await?;
        Ok(())
    }

    async fn stop(&self) -> QcResult<()> {
        self.send(self.http.post(self.url("/measurement/stop")), "measurement stop")
            .await?;
        log_info!("Measurement stopped");
        Ok(())
    }

    async fn status(&self) -> QcResult<EngineStatus> {
        let reply = self
            .send(self.http.get(self.url("/measurement/status")), "measurement status")
            .await?;
        Ok(Self::data_as(reply.data, "measurement status")?.unwrap_or_default())
    }

    async fn live_results(&self) -> QcResult<Option<LiveSnapshot>> {
        let reply = self
            .send(self.http.get(self.url("/results/live")), "live results")
            .await?;
        Self::data_as(reply.data, "live results")
    }

    async fn restart(&self) -> QcResult<()> {
        if let Err(err) = self.stop().await {
            log_debug!("Stop before restart ignored: {err}");
        }

        let mut last_error = None;
        for attempt in 1..=RESTART_STATUS_ATTEMPTS {
            tokio::time::sleep(self.restart_settle).await;
            match self.status().await {
                Ok(status) if !status.running => {
                    log_info!("Measurement engine idle after restart (attempt {attempt})");
                    return Ok(());
                }
                Ok(_) => log_debug!("Engine still running after stop (attempt {attempt})"),
                Err(err) => {
                    log_warn!("Engine status probe {attempt} failed: {err}");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            QcError::EngineRejected("engine kept running after restart".to_string())
        }))
    }

    async fn calibration_status(&self) -> QcResult<CalibrationStatus> {
        let reply = self
            .send(self.http.get(self.url("/calibration/status")), "calibration status")
            .await?;
        Ok(Self::data_as(reply.data, "calibration status")?.unwrap_or_default())
    }

    async fn start_calibration(&self) -> QcResult<()> {
        self.send(self.http.post(self.url("/calibration/start")), "calibration start")
            .await?;
        Ok(())
    }

    async fn cancel_calibration(&self) -> QcResult<()> {
        self.send(self.http.post(self.url("/calibration/cancel")), "calibration cancel")
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response per connection, in order.
    async fn serve(responses: Vec<(u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 16 * 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/api")
    }

    fn client(base_url: &str) -> HttpEngineClient {
        HttpEngineClient::new(base_url, Duration::from_secs(2), Duration::from_millis(10)).unwrap()
    }

    #[tokio::test]
    async fn live_results_parse_envelope() {
        let base = serve(vec![(
            200,
            r#"{"status":"success","data":{"is_live":true,"measurements":[{"id":2,"name":"Length","actual_cm":70.12,"qc_passed":false}]}}"#,
        )])
        .await;

        let snapshot = client(&base).live_results().await.unwrap().unwrap();

        assert!(snapshot.is_live);
        assert_eq!(snapshot.measurements[0].id, 2);
        assert_eq!(snapshot.measurements[0].actual_cm, 70.12);
    }

    #[tokio::test]
    async fn live_results_without_data_is_none() {
        let base = serve(vec![(200, r#"{"status":"success","data":null,"message":"none yet"}"#)]).await;

        assert_eq!(client(&base).live_results().await.unwrap(), None);
    }

    #[tokio::test]
    async fn error_envelope_is_rejection() {
        let base = serve(vec![(400, r#"{"status":"error","message":"annotation_name (size) is required"}"#)]).await;

        match client(&base).stop().await {
            Err(QcError::EngineRejected(message)) => assert!(message.contains("required")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = client(&format!("http://{addr}/api")).status().await;

        assert!(matches!(result, Err(QcError::EngineUnreachable(_))));
    }

    #[tokio::test]
    async fn restart_waits_for_idle_status() {
        let base = serve(vec![
            (400, r#"{"status":"error","message":"No measurement is running"}"#),
            (200, r#"{"status":"success","data":{"running":true,"status":"running"}}"#),
            (200, r#"{"status":"success","data":{"running":false,"status":"stopped"}}"#),
        ])
        .await;

        client(&base).restart().await.unwrap();
    }
}
