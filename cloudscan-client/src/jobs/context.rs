//! Credential resolution
//!
//! Turns a credential artifact into a [`JobContext`]. Access keys are ready
//! to submit as-is. A service-account key file is uploaded once to discover
//! the projects it can reach, and the caller must pick one before the
//! context can be submitted.

use cloudscan_model::{DiscoveryResponse, ProviderKind};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::{JobClientError, Result};
use crate::infra::services::transport::{KeyUpload, ScanTransport};

/// Region scanned when none is given
pub const DEFAULT_REGION: &str = "all";

/// Raw credential supplied by the user
pub enum CredentialArtifact {
    /// AWS access key pair
    AccessKeys {
        access_key: String,
        secret_key: Zeroizing<String>,
        region: Option<String>,
    },
    /// GCP service-account key file
    KeyFile {
        file_name: String,
        contents: Zeroizing<Vec<u8>>,
    },
}

impl CredentialArtifact {
    pub fn access_keys(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: Option<String>,
    ) -> Self {
        CredentialArtifact::AccessKeys {
            access_key: access_key.into(),
            secret_key: Zeroizing::new(secret_key.into()),
            region,
        }
    }

    pub fn key_file(file_name: impl Into<String>, contents: Vec<u8>) -> Self {
        CredentialArtifact::KeyFile {
            file_name: file_name.into(),
            contents: Zeroizing::new(contents),
        }
    }

    /// Read a key file from disk
    pub async fn read_key_file(path: &Path) -> std::io::Result<Self> {
        let contents = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "key.json".to_string());
        Ok(Self::key_file(file_name, contents))
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            CredentialArtifact::AccessKeys { .. } => ProviderKind::Aws,
            CredentialArtifact::KeyFile { .. } => ProviderKind::Gcp,
        }
    }
}

impl fmt::Debug for CredentialArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialArtifact::AccessKeys {
                access_key, region, ..
            } => f
                .debug_struct("AccessKeys")
                .field("access_key", access_key)
                .field("secret_key", &"<redacted>")
                .field("region", region)
                .finish(),
            CredentialArtifact::KeyFile {
                file_name,
                contents,
            } => f
                .debug_struct("KeyFile")
                .field("file_name", file_name)
                .field("contents", &format_args!("<{} bytes>", contents.len()))
                .finish(),
        }
    }
}

/// Context for a provider that submits credentials directly
#[derive(Clone)]
pub struct SingleStepContext {
    pub access_key: String,
    pub secret_key: Zeroizing<String>,
    pub region: String,
    pub checks: Option<String>,
}

impl fmt::Debug for SingleStepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleStepContext")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("checks", &self.checks)
            .finish()
    }
}

/// Context for a provider that needs discovery before submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoStepContext {
    /// Opaque reference the worker issued for the uploaded key
    pub discovery_ref: String,
    pub discovered: Vec<String>,
    pub selected: Option<String>,
    pub warning: Option<String>,
    pub checks: Option<String>,
}

/// Submittable description of a job. Never persisted.
#[derive(Debug, Clone)]
pub enum JobContext {
    SingleStep(SingleStepContext),
    TwoStep(TwoStepContext),
}

impl JobContext {
    pub fn provider(&self) -> ProviderKind {
        match self {
            JobContext::SingleStep(_) => ProviderKind::Aws,
            JobContext::TwoStep(_) => ProviderKind::Gcp,
        }
    }

    /// Whether the context can be submitted as it stands
    pub fn is_ready(&self) -> bool {
        match self {
            JobContext::SingleStep(_) => true,
            JobContext::TwoStep(ctx) => ctx.selected.is_some(),
        }
    }

    /// Targets available for selection; empty for single-step contexts
    pub fn discovered(&self) -> &[String] {
        match self {
            JobContext::SingleStep(_) => &[],
            JobContext::TwoStep(ctx) => &ctx.discovered,
        }
    }

    pub fn selected(&self) -> Option<&str> {
        match self {
            JobContext::SingleStep(_) => None,
            JobContext::TwoStep(ctx) => ctx.selected.as_deref(),
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            JobContext::SingleStep(_) => None,
            JobContext::TwoStep(ctx) => ctx.warning.as_deref(),
        }
    }

    /// Choose the target to scan. Only discovered targets are accepted.
    pub fn select(&mut self, target: &str) -> Result<()> {
        match self {
            JobContext::TwoStep(ctx) => {
                if !ctx.discovered.iter().any(|known| known == target) {
                    return Err(JobClientError::UnknownTarget(target.to_string()));
                }
                ctx.selected = Some(target.to_string());
                Ok(())
            }
            JobContext::SingleStep(_) => {
                Err(JobClientError::UnknownTarget(target.to_string()))
            }
        }
    }

    /// Restrict the scan to a comma-separated list of checks
    pub fn with_checks(mut self, checks: Option<String>) -> Self {
        let checks = checks.filter(|c| !c.trim().is_empty());
        match &mut self {
            JobContext::SingleStep(ctx) => ctx.checks = checks,
            JobContext::TwoStep(ctx) => ctx.checks = checks,
        }
        self
    }
}

/// Resolves credential artifacts into job contexts
#[derive(Debug, Clone)]
pub struct ContextResolver {
    transport: Arc<dyn ScanTransport>,
}

impl ContextResolver {
    pub fn new(transport: Arc<dyn ScanTransport>) -> Self {
        Self { transport }
    }

    pub async fn resolve(&self, artifact: CredentialArtifact) -> Result<JobContext> {
        match artifact {
            CredentialArtifact::AccessKeys {
                access_key,
                secret_key,
                region,
            } => {
                if access_key.trim().is_empty() || secret_key.trim().is_empty() {
                    return Err(JobClientError::MalformedArtifact(
                        "access key and secret key are required".into(),
                    ));
                }
                let region = region
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_REGION.to_string());
                Ok(JobContext::SingleStep(SingleStepContext {
                    access_key,
                    secret_key,
                    region,
                    checks: None,
                }))
            }
            CredentialArtifact::KeyFile {
                file_name,
                contents,
            } => {
                validate_key_file(&contents)?;
                let upload = KeyUpload {
                    file_name,
                    contents,
                };
                let discovery = self
                    .transport
                    .discover(&upload)
                    .await
                    .map_err(JobClientError::Discovery)?;
                Ok(JobContext::TwoStep(two_step(discovery)))
            }
        }
    }
}

fn validate_key_file(contents: &[u8]) -> Result<()> {
    match serde_json::from_slice::<Value>(contents) {
        Ok(Value::Object(_)) => Ok(()),
        Ok(_) => Err(JobClientError::MalformedArtifact(
            "key file must contain a JSON object".into(),
        )),
        Err(err) => Err(JobClientError::MalformedArtifact(format!(
            "key file is not valid JSON: {err}"
        ))),
    }
}

fn two_step(discovery: DiscoveryResponse) -> TwoStepContext {
    if let Some(warning) = &discovery.warning {
        warn!("[Resolver] Discovery warning: {}", warning);
    }
    info!(
        "[Resolver] Key {} can reach {} project(s)",
        discovery.key_id,
        discovery.projects.len()
    );
    TwoStepContext {
        discovery_ref: discovery.key_id,
        discovered: discovery.projects,
        selected: None,
        warning: discovery.warning,
        checks: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::infra::testing::StubTransport;

    fn resolver(stub: &StubTransport) -> ContextResolver {
        ContextResolver::new(Arc::new(stub.clone()))
    }

    #[tokio::test]
    async fn access_keys_resolve_without_network() {
        let stub = StubTransport::new();
        let ctx = resolver(&stub)
            .resolve(CredentialArtifact::access_keys("AKIA", "secret", None))
            .await
            .unwrap();

        assert!(ctx.is_ready());
        assert_eq!(ctx.provider(), ProviderKind::Aws);
        match &ctx {
            JobContext::SingleStep(single) => assert_eq!(single.region, "all"),
            other => panic!("expected single-step context, got {other:?}"),
        }
        assert_eq!(stub.discover_calls(), 0);
        assert!(!format!("{ctx:?}").contains("secret\""));
    }

    #[tokio::test]
    async fn key_file_discovers_targets() {
        let stub =
            StubTransport::new().with_projects("key-9", &["proj-a", "proj-b"]);
        let mut ctx = resolver(&stub)
            .resolve(CredentialArtifact::key_file(
                "sa.json",
                br#"{"type":"service_account"}"#.to_vec(),
            ))
            .await
            .unwrap();

        assert_eq!(ctx.discovered(), ["proj-a", "proj-b"]);
        assert!(!ctx.is_ready());

        let err = ctx.select("proj-z").unwrap_err();
        assert!(matches!(err, JobClientError::UnknownTarget(_)));
        assert!(!ctx.is_ready());

        ctx.select("proj-b").unwrap();
        assert!(ctx.is_ready());
        assert_eq!(ctx.selected(), Some("proj-b"));
    }

    #[tokio::test]
    async fn discovery_warning_is_kept() {
        let stub = StubTransport::new()
            .with_projects("key-1", &[])
            .with_discovery_warning("permission denied listing projects");
        let ctx = resolver(&stub)
            .resolve(CredentialArtifact::key_file("sa.json", b"{}".to_vec()))
            .await
            .unwrap();

        assert!(ctx.discovered().is_empty());
        assert_eq!(ctx.warning(), Some("permission denied listing projects"));
    }

    #[tokio::test]
    async fn malformed_key_file_is_rejected_locally() {
        let stub = StubTransport::new();
        for contents in [b"not json".to_vec(), b"[1,2]".to_vec()] {
            let err = resolver(&stub)
                .resolve(CredentialArtifact::key_file("sa.json", contents))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DiscoveryFailure);
            assert!(matches!(err, JobClientError::MalformedArtifact(_)));
        }
        assert_eq!(stub.discover_calls(), 0);
    }

    #[tokio::test]
    async fn discovery_transport_failure_is_reported() {
        let stub = StubTransport::new();
        stub.fail_discovery("invalid key");
        let err = resolver(&stub)
            .resolve(CredentialArtifact::key_file("sa.json", b"{}".to_vec()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DiscoveryFailure);
        assert!(err.to_string().contains("invalid key"));
    }
}
