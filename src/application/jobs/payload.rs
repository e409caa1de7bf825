//! Typed job payloads.
//!
//! Payloads are persisted as tagged JSON; the tag pins the payload shape
//! to the job type, so a claimed row can never be dispatched with the
//! wrong argument set.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::domain::types::JobType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    ScanImages {
        connection_id: Uuid,
    },
    OptimizeImages {
        connection_id: Uuid,
        user_id: Uuid,
        batch_id: Uuid,
        asset_ids: Vec<Uuid>,
    },
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::ScanImages { .. } => JobType::ScanImages,
            JobPayload::OptimizeImages { .. } => JobType::OptimizeImages,
        }
    }

    pub fn encode(&self) -> Result<serde_json::Value, AppError> {
        serde_json::to_value(self).map_err(|e| AppError::unexpected(e.to_string()))
    }

    /// Decode a stored payload, checking the tag against the row's type.
    pub fn decode(job_type: JobType, value: &serde_json::Value) -> Result<Self, AppError> {
        let payload: JobPayload = serde_json::from_value(value.clone())
            .map_err(|e| AppError::unexpected(format!("undecodable job payload: {e}")))?;
        if payload.job_type() != job_type {
            return Err(AppError::unexpected(format!(
                "payload tag {} does not match job type {}",
                payload.job_type().as_str(),
                job_type.as_str()
            )));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trips_through_tagged_json() {
        let payload = JobPayload::OptimizeImages {
            connection_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
            asset_ids: vec![Uuid::new_v4()],
        };
        let value = payload.encode().unwrap();
        assert_eq!(value["type"], "optimize_images");
        let back = JobPayload::decode(JobType::OptimizeImages, &value).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn mismatched_tag_is_rejected() {
        let value = JobPayload::ScanImages {
            connection_id: Uuid::new_v4(),
        }
        .encode()
        .unwrap();
        assert!(JobPayload::decode(JobType::OptimizeImages, &value).is_err());
    }
}
