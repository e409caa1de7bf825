//! Shared domain enumerations aligned with persisted database values.
//!
//! Enums backing TEXT columns carry `as_str`/`TryFrom<&str>` pairs so the
//! repository layer can round-trip them without relying on Postgres enums.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A persisted TEXT value that matches no variant; surfaces storage
/// corruption at the decode boundary instead of panicking later.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized value `{0}`")]
pub struct UnknownVariant(pub String);

/// Supported CMS platforms for registered connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Shopify,
    Wordpress,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Shopify => "shopify",
            Platform::Wordpress => "wordpress",
        }
    }
}

impl TryFrom<&str> for Platform {
    type Error = UnknownVariant;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "shopify" => Ok(Platform::Shopify),
            "wordpress" => Ok(Platform::Wordpress),
            _ => Err(UnknownVariant(value.into())),
        }
    }
}

/// Lifecycle of a scanned image asset.
///
/// Transitions only move forward; a re-scan may promote a pending asset but
/// never demotes an `Optimized` one. `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Detected,
    NeedsAltText,
    NeedsOptimization,
    Analyzing,
    Optimized,
    Cancelled,
}

impl AssetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetStatus::Detected => "detected",
            AssetStatus::NeedsAltText => "needs_alt_text",
            AssetStatus::NeedsOptimization => "needs_optimization",
            AssetStatus::Analyzing => "analyzing",
            AssetStatus::Optimized => "optimized",
            AssetStatus::Cancelled => "cancelled",
        }
    }

    /// Ordering rank used by the upsert promotion rule.
    pub fn rank(self) -> u8 {
        match self {
            AssetStatus::Detected => 0,
            AssetStatus::NeedsAltText | AssetStatus::NeedsOptimization => 1,
            AssetStatus::Analyzing => 2,
            AssetStatus::Optimized => 3,
            AssetStatus::Cancelled => 4,
        }
    }

    /// Whether a scan-time upsert may replace `self` with `candidate`.
    pub fn may_promote_to(self, candidate: AssetStatus) -> bool {
        !self.is_terminal() && candidate.rank() > self.rank()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AssetStatus::Optimized | AssetStatus::Cancelled)
    }
}

impl TryFrom<&str> for AssetStatus {
    type Error = UnknownVariant;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "detected" => Ok(AssetStatus::Detected),
            "needs_alt_text" => Ok(AssetStatus::NeedsAltText),
            "needs_optimization" => Ok(AssetStatus::NeedsOptimization),
            "analyzing" => Ok(AssetStatus::Analyzing),
            "optimized" => Ok(AssetStatus::Optimized),
            "cancelled" => Ok(AssetStatus::Cancelled),
            _ => Err(UnknownVariant(value.into())),
        }
    }
}

/// One-way job state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Legal transitions: Pending→Running, Pending|Running→Cancelled,
    /// Running→Completed|Failed. Terminal states accept nothing.
    pub fn may_transition_to(self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Pending, JobState::Running) => true,
            (JobState::Pending | JobState::Running, JobState::Cancelled) => true,
            (JobState::Running, JobState::Completed | JobState::Failed) => true,
            _ => false,
        }
    }
}

impl TryFrom<&str> for JobState {
    type Error = UnknownVariant;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(JobState::Pending),
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "cancelled" => Ok(JobState::Cancelled),
            _ => Err(UnknownVariant(value.into())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ScanImages,
    OptimizeImages,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::ScanImages => "scan_images",
            JobType::OptimizeImages => "optimize_images",
        }
    }
}

impl TryFrom<&str> for JobType {
    type Error = UnknownVariant;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "scan_images" => Ok(JobType::ScanImages),
            "optimize_images" => Ok(JobType::OptimizeImages),
            _ => Err(UnknownVariant(value.into())),
        }
    }
}

/// Batch status mirrors the owning job's state vocabulary.
pub type BatchStatus = JobState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixMethod {
    Automatic,
    Manual,
}

impl FixMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            FixMethod::Automatic => "automatic",
            FixMethod::Manual => "manual",
        }
    }
}

impl TryFrom<&str> for FixMethod {
    type Error = UnknownVariant;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "automatic" => Ok(FixMethod::Automatic),
            "manual" => Ok(FixMethod::Manual),
            _ => Err(UnknownVariant(value.into())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    Applied,
    Failed,
    RolledBack,
}

impl FixStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FixStatus::Applied => "applied",
            FixStatus::Failed => "failed",
            FixStatus::RolledBack => "rolled_back",
        }
    }
}

impl TryFrom<&str> for FixStatus {
    type Error = UnknownVariant;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "applied" => Ok(FixStatus::Applied),
            "failed" => Ok(FixStatus::Failed),
            "rolled_back" => Ok(FixStatus::RolledBack),
            _ => Err(UnknownVariant(value.into())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Active,
    Exhausted,
    Expired,
}

impl PurchaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PurchaseStatus::Active => "active",
            PurchaseStatus::Exhausted => "exhausted",
            PurchaseStatus::Expired => "expired",
        }
    }
}

impl TryFrom<&str> for PurchaseStatus {
    type Error = UnknownVariant;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" => Ok(PurchaseStatus::Active),
            "exhausted" => Ok(PurchaseStatus::Exhausted),
            "expired" => Ok(PurchaseStatus::Expired),
            _ => Err(UnknownVariant(value.into())),
        }
    }
}

/// Subscription tier supplied by the external identity/billing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Starter,
    Growth,
    Unlimited,
}

impl PlanTier {
    /// Monthly included credits; `None` means unmetered.
    pub fn monthly_quota(self) -> Option<u32> {
        match self {
            PlanTier::Free => Some(10),
            PlanTier::Starter => Some(100),
            PlanTier::Growth => Some(500),
            PlanTier::Unlimited => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Starter => "starter",
            PlanTier::Growth => "growth",
            PlanTier::Unlimited => "unlimited",
        }
    }
}

impl TryFrom<&str> for PlanTier {
    type Error = UnknownVariant;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "free" => Ok(PlanTier::Free),
            "starter" => Ok(PlanTier::Starter),
            "growth" => Ok(PlanTier::Growth),
            "unlimited" => Ok(PlanTier::Unlimited),
            _ => Err(UnknownVariant(value.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_status_never_leaves_optimized() {
        assert!(!AssetStatus::Optimized.may_promote_to(AssetStatus::NeedsAltText));
        assert!(!AssetStatus::Optimized.may_promote_to(AssetStatus::Analyzing));
        assert!(!AssetStatus::Cancelled.may_promote_to(AssetStatus::Detected));
    }

    #[test]
    fn asset_status_promotes_forward() {
        assert!(AssetStatus::Detected.may_promote_to(AssetStatus::NeedsAltText));
        assert!(AssetStatus::NeedsAltText.may_promote_to(AssetStatus::Analyzing));
        assert!(AssetStatus::Analyzing.may_promote_to(AssetStatus::Optimized));
        assert!(!AssetStatus::Analyzing.may_promote_to(AssetStatus::NeedsAltText));
    }

    #[test]
    fn job_state_machine_is_one_way() {
        assert!(JobState::Pending.may_transition_to(JobState::Running));
        assert!(JobState::Running.may_transition_to(JobState::Completed));
        assert!(JobState::Running.may_transition_to(JobState::Failed));
        assert!(JobState::Pending.may_transition_to(JobState::Cancelled));
        assert!(JobState::Running.may_transition_to(JobState::Cancelled));

        for terminal in [JobState::Completed, JobState::Failed, JobState::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                JobState::Pending,
                JobState::Running,
                JobState::Completed,
                JobState::Failed,
                JobState::Cancelled,
            ] {
                assert!(!terminal.may_transition_to(next));
            }
        }
    }

    #[test]
    fn enum_round_trips() {
        for status in [
            AssetStatus::Detected,
            AssetStatus::NeedsAltText,
            AssetStatus::NeedsOptimization,
            AssetStatus::Analyzing,
            AssetStatus::Optimized,
            AssetStatus::Cancelled,
        ] {
            assert_eq!(AssetStatus::try_from(status.as_str()), Ok(status));
        }
        assert!(AssetStatus::try_from("unknown").is_err());
        assert_eq!(PlanTier::try_from("growth"), Ok(PlanTier::Growth));
        assert_eq!(PlanTier::Unlimited.monthly_quota(), None);
    }

    #[test]
    fn decode_error_carries_the_raw_value() {
        let err = JobState::try_from("paused").unwrap_err();
        assert_eq!(err, UnknownVariant("paused".into()));
        assert_eq!(err.to_string(), "unrecognized value `paused`");
    }
}
