//! Model tier and reasoning-effort abstractions.
//!
//! Gateway deployments come in tiers (standard, mini, nano) that trade
//! latency against depth. The tier is derived from the deployment name and
//! drives the default reasoning effort when the caller does not set one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reasoning effort requested from a deployment that supports it.
///
/// Maps directly to the `reasoning_effort` request parameter.
///
/// # Examples
///
/// ```
/// use apigate_common::features::ReasoningEffort;
///
/// let effort: ReasoningEffort = "high".parse().unwrap();
/// assert_eq!(effort, ReasoningEffort::High);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ReasoningEffort {
    /// Minimal internal computation, fastest responses.
    Low,
    /// Balanced depth and latency.
    Medium,
    /// Most thorough, slowest.
    High,
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for ReasoningEffort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => anyhow::bail!("Unknown reasoning effort: {s} (expected low, medium, or high)"),
        }
    }
}

/// Deployment tier, derived from the deployment name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ModelTier {
    /// The full-size deployment.
    Standard,
    /// The mid-size deployment, balanced for cost.
    Mini,
    /// The smallest deployment, optimized for speed.
    Nano,
}

impl ModelTier {
    /// Classifies a deployment name into a tier.
    ///
    /// Matching is substring-based on the lowercased name, so it holds for
    /// both bare names (`gpt5nano`) and hyphenated ones (`gpt-5-nano`).
    #[must_use]
    pub fn of(deployment: &str) -> Self {
        let name = deployment.to_lowercase();
        if name.contains("nano") {
            Self::Nano
        } else if name.contains("mini") {
            Self::Mini
        } else {
            Self::Standard
        }
    }

    /// The reasoning effort applied when the caller sets none.
    ///
    /// Nano deployments default to low effort; everything else runs medium.
    #[must_use]
    pub const fn default_effort(self) -> ReasoningEffort {
        match self {
            Self::Nano => ReasoningEffort::Low,
            Self::Mini | Self::Standard => ReasoningEffort::Medium,
        }
    }
}

/// Whether a deployment name identifies a reasoning-capable model family.
///
/// Only reasoning-capable deployments accept the `reasoning_effort`
/// parameter; sending it elsewhere is a request error.
#[must_use]
pub fn is_reasoning_deployment(deployment: &str) -> bool {
    let name = deployment.to_lowercase();
    name.contains("gpt5") || name.contains("gpt-5")
}
