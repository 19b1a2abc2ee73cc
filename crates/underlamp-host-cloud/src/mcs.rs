//! MCSManager daemon controller

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use underlamp_config::DaemonConfig;
use underlamp_host_api::{DaemonController, DaemonStatus, HostError, HostResult};

/// One game-server instance managed by an MCSManager panel
pub struct McsDaemon {
    client: Client,
    base_url: String,
    api_key: String,
    daemon_id: String,
    instance_uuid: String,
}

impl McsDaemon {
    pub fn new(config: &DaemonConfig) -> HostResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| HostError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            daemon_id: config.daemon_id.clone(),
            instance_uuid: config.instance_uuid.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> HostResult<Value> {
        debug!(path, "Calling daemon manager");

        let response = self
            .client
            .get(self.url(path))
            .header("X-Requested-With", "XMLHttpRequest")
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("uuid", self.instance_uuid.as_str()),
                ("daemonId", self.daemon_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| HostError::Http(format!("{}: {}", path, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HostError::Http(format!("{}: {}", path, e)))?;

        if !status.is_success() {
            warn!(path, status = %status, "Daemon manager returned an error");
            return Err(HostError::Daemon(format!("{} returned {}: {}", path, status, body.trim())));
        }

        serde_json::from_str(&body)
            .map_err(|e| HostError::Parse(format!("{} returned invalid JSON: {}", path, e)))
    }
}

/// Map an instance status code
pub fn daemon_status_from_code(code: i64) -> DaemonStatus {
    match code {
        -1 => DaemonStatus::Busy,
        0 => DaemonStatus::Stopped,
        1 => DaemonStatus::Stopping,
        2 => DaemonStatus::Starting,
        3 => DaemonStatus::Running,
        _ => DaemonStatus::Unknown,
    }
}

/// Extract the status from an `/api/instance` response
pub fn status_from_response(response: &Value) -> DaemonStatus {
    response["data"]["status"]
        .as_i64()
        .map(daemon_status_from_code)
        .unwrap_or(DaemonStatus::Unknown)
}

#[async_trait]
impl DaemonController for McsDaemon {
    async fn start(&self) -> HostResult<()> {
        self.get("/api/protected_instance/open").await?;
        Ok(())
    }

    async fn stop(&self) -> HostResult<()> {
        self.get("/api/protected_instance/stop").await?;
        Ok(())
    }

    async fn kill(&self) -> HostResult<()> {
        self.get("/api/protected_instance/kill").await?;
        Ok(())
    }

    async fn describe_status(&self) -> HostResult<DaemonStatus> {
        let response = self.get("/api/instance").await?;
        Ok(status_from_response(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn config(base_url: &str) -> DaemonConfig {
        DaemonConfig {
            base_url: base_url.into(),
            api_key: "key".into(),
            daemon_id: "daemon".into(),
            instance_uuid: "uuid".into(),
            request_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn status_codes() {
        assert_eq!(daemon_status_from_code(-1), DaemonStatus::Busy);
        assert_eq!(daemon_status_from_code(3), DaemonStatus::Running);
        assert_eq!(daemon_status_from_code(7), DaemonStatus::Unknown);

        let response = json!({"status": 200, "data": {"status": 0, "config": {}}});
        assert_eq!(status_from_response(&response), DaemonStatus::Stopped);
        assert_eq!(status_from_response(&json!({"data": {}})), DaemonStatus::Unknown);
    }

    #[test]
    fn url_joins_without_double_slash() {
        let daemon = McsDaemon::new(&config("http://panel.local:23333/")).unwrap();
        assert_eq!(daemon.url("/api/instance"), "http://panel.local:23333/api/instance");
    }

    #[tokio::test]
    async fn unreachable_panel_is_an_http_error() {
        let daemon = McsDaemon::new(&config("http://127.0.0.1:1")).unwrap();
        assert!(matches!(daemon.describe_status().await, Err(HostError::Http(_))));
    }
}
