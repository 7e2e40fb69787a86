use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::error::DriverError;

#[derive(Clone, Debug)]
pub(crate) struct AwsCredentials {
    pub access_key_id:     String,
    pub secret_access_key: String,
    pub session_token:     Option<String>,
}

impl AwsCredentials {
    /// Parse the `AccessKeyId` / `SecretAccessKey` / `Token` shape shared by
    /// IMDS, the ECS agent and STS.
    fn from_json(v: &Value, token_field: &str) -> Result<Self, DriverError> {
        let field = |name: &str| {
            v[name]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| DriverError::Credentials(format!("response missing {}", name)))
        };
        Ok(Self {
            access_key_id:     field("AccessKeyId")?,
            secret_access_key: field("SecretAccessKey")?,
            session_token:     v[token_field].as_str().map(str::to_string),
        })
    }
}

#[async_trait]
pub(crate) trait CredentialsProvider: Send + Sync {
    async fn credentials(&self) -> Result<AwsCredentials, DriverError>;
}

// ── Static (env vars) ─────────────────────────────────────────────────────────

pub(crate) struct StaticCredentialsProvider(pub AwsCredentials);

#[async_trait]
impl CredentialsProvider for StaticCredentialsProvider {
    async fn credentials(&self) -> Result<AwsCredentials, DriverError> {
        Ok(self.0.clone())
    }
}

// ── ECS container / EC2 IMDSv2 ────────────────────────────────────────────────

pub(crate) struct ImdsCredentialsProvider {
    pub client:  reqwest::Client,
    /// Set when `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` is present.
    pub ecs_uri: Option<String>,
    pub cache:   tokio::sync::Mutex<Option<(AwsCredentials, Instant)>>,
}

impl ImdsCredentialsProvider {
    pub fn new(client: reqwest::Client, ecs_uri: Option<String>) -> Self {
        Self { client, ecs_uri, cache: tokio::sync::Mutex::new(None) }
    }

    async fn get_json(&self, url: &str, token: Option<&str>) -> Result<Value, DriverError> {
        let mut req = self.client.get(url);
        if let Some(t) = token {
            req = req.header("X-aws-ec2-metadata-token", t);
        }
        req.send()
            .await
            .map_err(|e| DriverError::Credentials(format!("GET {}: {}", url, e)))?
            .json()
            .await
            .map_err(|e| DriverError::Credentials(format!("decode {}: {}", url, e)))
    }

    async fn fetch(&self) -> Result<AwsCredentials, DriverError> {
        if let Some(ref uri) = self.ecs_uri {
            let resp = self.get_json(&format!("http://169.254.170.2{}", uri), None).await?;
            return AwsCredentials::from_json(&resp, "Token");
        }

        let imds_token = self
            .client
            .put("http://169.254.169.254/latest/api/token")
            .header("X-aws-ec2-metadata-token-ttl-seconds", "21600")
            .send()
            .await
            .map_err(|e| DriverError::Credentials(format!("IMDSv2 token request: {}", e)))?
            .text()
            .await
            .map_err(|e| DriverError::Credentials(format!("IMDSv2 token decode: {}", e)))?;

        let roles = self
            .client
            .get("http://169.254.169.254/latest/meta-data/iam/security-credentials/")
            .header("X-aws-ec2-metadata-token", &imds_token)
            .send()
            .await
            .map_err(|e| DriverError::Credentials(format!("IMDS roles request: {}", e)))?
            .text()
            .await
            .unwrap_or_default();
        let role = roles.lines().next().unwrap_or("").trim().to_string();
        if role.is_empty() {
            return Err(DriverError::Credentials("IMDS: no IAM role attached".into()));
        }

        let url = format!(
            "http://169.254.169.254/latest/meta-data/iam/security-credentials/{}",
            role
        );
        let resp = self.get_json(&url, Some(&imds_token)).await?;
        AwsCredentials::from_json(&resp, "Token")
    }
}

#[async_trait]
impl CredentialsProvider for ImdsCredentialsProvider {
    async fn credentials(&self) -> Result<AwsCredentials, DriverError> {
        {
            let guard = self.cache.lock().await;
            if let Some((creds, expiry)) = guard.as_ref() {
                if Instant::now() < *expiry {
                    return Ok(creds.clone());
                }
            }
        }

        let creds = self.fetch().await?;
        // Instance credentials live for hours; refresh well before that.
        let expiry = Instant::now() + Duration::from_secs(600);
        *self.cache.lock().await = Some((creds.clone(), expiry));
        Ok(creds)
    }
}

// ── AWS CLI ───────────────────────────────────────────────────────────────────

/// Cached credentials expire this long before the CLI says they do.
const CLI_EXPIRY_MARGIN: Duration = Duration::from_secs(300);
/// Cache lifetime when the CLI reports no expiration (long-lived keys).
const CLI_DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Credentials resolved by the AWS CLI for the active profile.
///
/// `aws configure export-credentials` handles every profile type (static
/// keys, SSO, assumed roles). `aws sts get-session-token` is only tried when
/// that subcommand is missing or fails.
pub(crate) struct AwsCliCredentialsProvider {
    binary: String,
    cache:  tokio::sync::Mutex<Option<(AwsCredentials, Instant)>>,
}

impl AwsCliCredentialsProvider {
    pub fn new() -> Self {
        Self::with_binary("aws")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into(), cache: tokio::sync::Mutex::new(None) }
    }

    async fn run_cli(&self, args: &[&str]) -> Result<Value, DriverError> {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| DriverError::Credentials(format!(
                "aws CLI not found: {}. Install the AWS CLI or set AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY.",
                e
            )))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DriverError::Credentials(format!(
                "aws {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| DriverError::Credentials(format!("aws CLI output parse: {}", e)))
    }

    async fn fetch(&self) -> Result<(AwsCredentials, Duration), DriverError> {
        let exported = self
            .run_cli(&["configure", "export-credentials", "--format", "process"])
            .await;
        let v = match exported {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "export-credentials failed; trying sts get-session-token");
                let resp = self
                    .run_cli(&["sts", "get-session-token", "--duration-seconds", "3600", "--output", "json"])
                    .await?;
                resp["Credentials"].clone()
            }
        };
        let creds = AwsCredentials::from_json(&v, "SessionToken")?;
        let ttl = cache_ttl(v["Expiration"].as_str(), chrono::Utc::now());
        Ok((creds, ttl))
    }
}

/// How long to reuse credentials that expire at `expiration` (RFC 3339).
fn cache_ttl(expiration: Option<&str>, now: chrono::DateTime<chrono::Utc>) -> Duration {
    let Some(expires_at) = expiration.and_then(|e| chrono::DateTime::parse_from_rfc3339(e).ok()) else {
        return CLI_DEFAULT_TTL;
    };
    (expires_at.with_timezone(&chrono::Utc) - now)
        .to_std()
        .ok()
        .and_then(|left| left.checked_sub(CLI_EXPIRY_MARGIN))
        .unwrap_or(Duration::ZERO)
}

#[async_trait]
impl CredentialsProvider for AwsCliCredentialsProvider {
    async fn credentials(&self) -> Result<AwsCredentials, DriverError> {
        let mut cache = self.cache.lock().await;
        if let Some((creds, expiry)) = cache.as_ref() {
            if Instant::now() < *expiry {
                return Ok(creds.clone());
            }
        }

        let (creds, ttl) = self.fetch().await?;
        *cache = Some((creds.clone(), Instant::now() + ttl));
        Ok(creds)
    }
}

// ── Selection ─────────────────────────────────────────────────────────────────

/// Pick a provider from the ambient environment:
/// 1. `AWS_ACCESS_KEY_ID` + `AWS_SECRET_ACCESS_KEY` (+ `AWS_SESSION_TOKEN`)
/// 2. `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` (ECS task)
/// 3. EC2 IMDSv2, if the endpoint answers within two seconds
/// 4. AWS CLI
pub(crate) async fn default_provider(client: &reqwest::Client) -> Box<dyn CredentialsProvider> {
    if let (Ok(key), Ok(secret)) = (
        std::env::var("AWS_ACCESS_KEY_ID"),
        std::env::var("AWS_SECRET_ACCESS_KEY"),
    ) {
        debug!("using AWS credentials from environment");
        return Box::new(StaticCredentialsProvider(AwsCredentials {
            access_key_id:     key,
            secret_access_key: secret,
            session_token:     std::env::var("AWS_SESSION_TOKEN").ok(),
        }));
    }

    if let Ok(uri) = std::env::var("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI") {
        debug!("using ECS container credentials");
        return Box::new(ImdsCredentialsProvider::new(client.clone(), Some(uri)));
    }

    let imds_token = client
        .put("http://169.254.169.254/latest/api/token")
        .header("X-aws-ec2-metadata-token-ttl-seconds", "10")
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    if imds_token.is_ok() {
        debug!("using EC2 instance credentials");
        Box::new(ImdsCredentialsProvider::new(client.clone(), None))
    } else {
        debug!("falling back to AWS CLI credentials");
        Box::new(AwsCliCredentialsProvider::new())
    }
}
