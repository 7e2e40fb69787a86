use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tfsmoke_domain::EcsCluster;
use tracing::{debug, info};

use crate::credentials::{default_provider, CredentialsProvider};
use crate::driver::Inventory;
use crate::error::DriverError;
use crate::sigv4::sign_request;

const EC2_API_VERSION: &str = "2016-11-15";
const ECS_TARGET_PREFIX: &str = "AmazonEC2ContainerServiceV20141113";
const AMZ_JSON: &str = "application/x-amz-json-1.1";

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct AwsInventoryConfig {
    /// Region used for account-wide calls such as `DescribeRegions`.
    pub home_region: String,
    /// Send every call to `{endpoint_override}/{service}/` instead of the
    /// public regional endpoint. Used by tests and local emulators.
    pub endpoint_override: Option<String>,
}

impl Default for AwsInventoryConfig {
    fn default() -> Self {
        Self { home_region: "us-east-1".into(), endpoint_override: None }
    }
}

// ── EC2 wire types (Query protocol, XML) ──────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeRegionsResponse {
    #[serde(default)]
    region_info: RegionInfo,
}

#[derive(Debug, Default, Deserialize)]
struct RegionInfo {
    #[serde(default)]
    item: Vec<RegionItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegionItem {
    region_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeAvailabilityZonesResponse {
    #[serde(default)]
    availability_zone_info: ZoneInfo,
}

#[derive(Debug, Default, Deserialize)]
struct ZoneInfo {
    #[serde(default)]
    item: Vec<ZoneItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZoneItem {
    zone_name: String,
}

/// `<Response><Errors><Error><Code/><Message/></Error></Errors></Response>`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2ErrorResponse {
    errors: Ec2Errors,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2Errors {
    #[serde(default)]
    error: Vec<Ec2Error>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2Error {
    code: String,
    #[serde(default)]
    message: String,
}

// ── ECS wire types (JSON 1.1) ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeClustersResponse {
    #[serde(default)]
    clusters: Vec<WireCluster>,
    #[serde(default)]
    failures: Vec<WireFailure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCluster {
    #[serde(default)]
    cluster_name: String,
    #[serde(default)]
    cluster_arn: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    registered_container_instances_count: u64,
    #[serde(default)]
    running_tasks_count: u64,
    #[serde(default)]
    pending_tasks_count: u64,
    #[serde(default)]
    active_services_count: u64,
}

#[derive(Debug, Deserialize)]
struct WireFailure {
    #[serde(default)]
    arn: String,
    #[serde(default)]
    reason: String,
}

impl From<WireCluster> for EcsCluster {
    fn from(w: WireCluster) -> Self {
        EcsCluster {
            cluster_name: w.cluster_name,
            cluster_arn: w.cluster_arn,
            status: w.status,
            registered_container_instances: w.registered_container_instances_count,
            running_tasks: w.running_tasks_count,
            pending_tasks: w.pending_tasks_count,
            active_services: w.active_services_count,
        }
    }
}

// ── AwsInventory ──────────────────────────────────────────────────────────────

/// Read-only AWS calls signed with SigV4.
pub struct AwsInventory {
    config: AwsInventoryConfig,
    client: reqwest::Client,
    creds:  Box<dyn CredentialsProvider>,
}

impl AwsInventory {
    /// Build an inventory client with credentials from the ambient environment.
    pub async fn new(config: AwsInventoryConfig) -> Self {
        let client = reqwest::Client::new();
        let creds = default_provider(&client).await;
        Self { config, client, creds }
    }

    #[cfg(test)]
    pub(crate) fn with_test_config(
        config: AwsInventoryConfig,
        creds: impl CredentialsProvider + 'static,
    ) -> Self {
        Self { config, client: reqwest::Client::new(), creds: Box::new(creds) }
    }

    fn endpoint(&self, service: &str, region: &str) -> String {
        match &self.config.endpoint_override {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), service),
            None => format!("https://{}.{}.amazonaws.com", service, region),
        }
    }

    /// Sign and send `builder`; return the status code and body text.
    async fn send_signed(
        &self,
        service: &str,
        region: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<(u16, String), DriverError> {
        let creds = self.creds.credentials().await?;
        let mut req = builder
            .build()
            .map_err(|e| DriverError::Internal(format!("build {} request: {}", service, e)))?;
        sign_request(&mut req, &creds, region, service, Utc::now())?;

        let url = req.url().clone();
        let resp = self
            .client
            .execute(req)
            .await
            .map_err(|e| DriverError::Internal(format!("POST {} failed: {}", url, e)))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| DriverError::Internal(format!("read {} response: {}", url, e)))?;
        Ok((status, text))
    }

    /// EC2 Query API call: form-encoded `Action` plus `params`, XML reply.
    async fn ec2_query<T: DeserializeOwned>(
        &self,
        region: &str,
        action: &str,
        params: &[(&str, &str)],
    ) -> Result<T, DriverError> {
        let mut form = vec![("Action", action), ("Version", EC2_API_VERSION)];
        form.extend_from_slice(params);
        let builder = self
            .client
            .post(format!("{}/", self.endpoint("ec2", region)))
            .form(&form);

        let (status, text) = self.send_signed("ec2", region, builder).await?;
        if status >= 400 {
            let (code, message) = match quick_xml::de::from_str::<Ec2ErrorResponse>(&text) {
                Ok(resp) => match resp.errors.error.into_iter().next() {
                    Some(e) => (e.code, e.message),
                    None => (format!("HTTP {}", status), "unknown error".into()),
                },
                Err(_) => (format!("HTTP {}", status), text.trim().to_string()),
            };
            return Err(DriverError::Aws { service: "ec2".into(), code, message });
        }
        quick_xml::de::from_str(&text)
            .map_err(|e| DriverError::Internal(format!("decode EC2 {}: {}", action, e)))
    }

    /// ECS JSON 1.1 call addressed by `X-Amz-Target`.
    async fn ecs_call(&self, region: &str, operation: &str, body: &Value) -> Result<Value, DriverError> {
        let target = format!("{}.{}", ECS_TARGET_PREFIX, operation);
        let builder = self
            .client
            .post(format!("{}/", self.endpoint("ecs", region)))
            .header(CONTENT_TYPE, AMZ_JSON)
            .header("X-Amz-Target", &target)
            .body(body.to_string());

        let (status, text) = self.send_signed("ecs", region, builder).await?;
        let resp: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        if status >= 400 {
            // `__type` looks like `com.amazonaws.ecs#ClientException`.
            let code = resp["__type"]
                .as_str()
                .and_then(|t| t.rsplit('#').next())
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status));
            let message = resp["message"]
                .as_str()
                .or_else(|| resp["Message"].as_str())
                .unwrap_or("unknown error")
                .to_string();
            return Err(DriverError::Aws { service: "ecs".into(), code, message });
        }
        Ok(resp)
    }
}

#[async_trait]
impl Inventory for AwsInventory {
    async fn enabled_regions(&self) -> Result<Vec<String>, DriverError> {
        let home = self.config.home_region.as_str();
        debug!(region = %home, "EC2: DescribeRegions");
        let resp: DescribeRegionsResponse = self.ec2_query(home, "DescribeRegions", &[]).await?;
        Ok(resp.region_info.item.into_iter().map(|r| r.region_name).collect())
    }

    async fn availability_zones(&self, region: &str) -> Result<Vec<String>, DriverError> {
        debug!(region, "EC2: DescribeAvailabilityZones");
        let resp: DescribeAvailabilityZonesResponse = self
            .ec2_query(
                region,
                "DescribeAvailabilityZones",
                &[
                    ("Filter.1.Name", "state"),
                    ("Filter.1.Value.1", "available"),
                    ("Filter.2.Name", "zone-type"),
                    ("Filter.2.Value.1", "availability-zone"),
                ],
            )
            .await?;
        Ok(resp.availability_zone_info.item.into_iter().map(|z| z.zone_name).collect())
    }

    async fn describe_cluster(&self, region: &str, name: &str) -> Result<EcsCluster, DriverError> {
        info!(region, cluster = name, "ECS: DescribeClusters");
        let resp = self
            .ecs_call(region, "DescribeClusters", &json!({ "clusters": [name] }))
            .await?;

        let parsed: DescribeClustersResponse = serde_json::from_value(resp)
            .map_err(|e| DriverError::Internal(format!("decode DescribeClusters: {}", e)))?;

        let mut clusters = parsed.clusters;
        match (clusters.len(), parsed.failures.first()) {
            (1, _) => Ok(clusters.remove(0).into()),
            (0, Some(f)) => Err(DriverError::NotFound(format!(
                "ECS cluster {} in {} ({}: {})",
                name, region, f.reason, f.arn
            ))),
            (0, None) => Err(DriverError::NotFound(format!("ECS cluster {} in {}", name, region))),
            (n, _) => Err(DriverError::Internal(format!(
                "expected 1 ECS cluster named {} in {}, found {}",
                name, region, n
            ))),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
