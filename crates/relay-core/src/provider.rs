//! Vendor family tag.

use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Upstream vendor family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Baidu Wenxin workshop (ERNIE models), OAuth client credentials
    Baidu,
    /// Zhipu open platform (ChatGLM models), self-signed tokens
    Zhipu,
    /// Google PaLM `generateMessage`, static API key
    Palm,
}

impl ProviderKind {
    /// Lowercase name used in configuration and logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baidu => "baidu",
            Self::Zhipu => "zhipu",
            Self::Palm => "palm",
        }
    }

    /// Whether the vendor API can stream natively
    #[must_use]
    pub fn streams_natively(&self) -> bool {
        !matches!(self, Self::Palm)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baidu" | "ernie" => Ok(Self::Baidu),
            "zhipu" | "chatglm" => Ok(Self::Zhipu),
            "palm" | "google-palm" => Ok(Self::Palm),
            other => Err(RelayError::configuration(format!(
                "Unknown provider kind: {other}"
            ))),
        }
    }
}
