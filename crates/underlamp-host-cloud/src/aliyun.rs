//! Aliyun ECS resource controller
//!
//! Drives a single instance through the `aliyun` command-line tool. Credentials
//! come from the tool's own profile store, never from our config.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use underlamp_config::ResourceConfig;
use underlamp_host_api::{
    HostError, HostResult, ResourceController, ResourceStatus, ResourceStopMode,
};

/// ECS instance driven through the `aliyun` CLI
pub struct AliyunEcs {
    cli_path: PathBuf,
    profile: Option<String>,
    region_id: String,
    instance_id: String,
}

impl AliyunEcs {
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            cli_path: config.cli_path.clone(),
            profile: config.profile.clone(),
            region_id: config.region_id.clone(),
            instance_id: config.instance_id.clone(),
        }
    }

    fn command_args(&self, action: &str, params: &[(&str, String)]) -> Vec<String> {
        let mut args = vec!["ecs".to_string(), action.to_string()];
        if let Some(profile) = &self.profile {
            args.push("--profile".into());
            args.push(profile.clone());
        }
        args.push("--region".into());
        args.push(self.region_id.clone());
        for (name, value) in params {
            args.push(format!("--{}", name));
            args.push(value.clone());
        }
        args
    }

    /// Run one ECS API action and parse its JSON response
    async fn call(&self, action: &str, params: &[(&str, String)]) -> HostResult<Value> {
        let args = self.command_args(action, params);
        debug!(cli = %self.cli_path.display(), action, "Calling ECS API");

        let output = Command::new(&self.cli_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                HostError::Provider(format!(
                    "Failed to run {}: {}",
                    self.cli_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            warn!(action, status = %output.status, "ECS API call failed");
            return Err(HostError::Provider(format!("{} failed: {}", action, detail)));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| HostError::Parse(format!("{} returned invalid JSON: {}", action, e)))
    }

    fn instance_ids(&self) -> String {
        Value::from(vec![self.instance_id.clone()]).to_string()
    }
}

/// Provider name for a stop mode
pub fn stopped_mode(mode: ResourceStopMode) -> &'static str {
    match mode {
        ResourceStopMode::CostSaving => "StopCharging",
        ResourceStopMode::KeepBilling => "KeepCharging",
    }
}

/// Map a provider status string
pub fn parse_resource_status(status: &str) -> ResourceStatus {
    match status {
        "Starting" => ResourceStatus::Starting,
        "Running" => ResourceStatus::Running,
        "Stopping" => ResourceStatus::Stopping,
        "Stopped" => ResourceStatus::Stopped,
        "Pending" => ResourceStatus::Pending,
        _ => ResourceStatus::Unknown,
    }
}

/// Find the status of `instance_id` in a `DescribeInstanceStatus` response
pub fn status_from_response(response: &Value, instance_id: &str) -> ResourceStatus {
    response["InstanceStatuses"]["InstanceStatus"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|entry| entry["InstanceId"].as_str() == Some(instance_id))
        .and_then(|entry| entry["Status"].as_str())
        .map(parse_resource_status)
        .unwrap_or(ResourceStatus::Unknown)
}

/// First public or elastic address in a `DescribeInstances` response
pub fn address_from_response(response: &Value) -> Option<String> {
    let instance = response["Instances"]["Instance"].as_array()?.first()?;

    let public = instance["PublicIpAddress"]["IpAddress"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|ip| !ip.is_empty());
    let elastic = instance["EipAddress"]["IpAddress"]
        .as_str()
        .filter(|ip| !ip.is_empty());

    public.or(elastic).map(str::to_string)
}

#[async_trait]
impl ResourceController for AliyunEcs {
    async fn start(&self) -> HostResult<()> {
        self.call("StartInstance", &[("InstanceId", self.instance_id.clone())])
            .await?;
        Ok(())
    }

    async fn stop(&self, force: bool, mode: ResourceStopMode) -> HostResult<()> {
        self.call(
            "StopInstance",
            &[
                ("InstanceId", self.instance_id.clone()),
                ("ForceStop", force.to_string()),
                ("StoppedMode", stopped_mode(mode).to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn describe_status(&self) -> HostResult<ResourceStatus> {
        let response = self
            .call(
                "DescribeInstanceStatus",
                &[
                    ("RegionId", self.region_id.clone()),
                    ("InstanceId.1", self.instance_id.clone()),
                ],
            )
            .await?;
        Ok(status_from_response(&response, &self.instance_id))
    }

    async fn public_address(&self) -> HostResult<Option<String>> {
        let response = self
            .call(
                "DescribeInstances",
                &[
                    ("RegionId", self.region_id.clone()),
                    ("InstanceIds", self.instance_ids()),
                ],
            )
            .await?;
        Ok(address_from_response(&response))
    }
}
