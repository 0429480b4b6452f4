use serde::{Deserialize, Serialize};

/// Cloud provider a scan runs against.
///
/// The provider also selects the submission protocol: AWS takes raw
/// credentials in one request and answers synchronously, GCP needs a key
/// upload that discovers projects before the asynchronous job can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "AWS", alias = "aws")]
    Aws,
    #[serde(rename = "GCP", alias = "gcp")]
    Gcp,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Aws => "AWS",
            ProviderKind::Gcp => "GCP",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
