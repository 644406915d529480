//! Ownership labels attached to every agent container definition.
//!
//! The backend is the only store of agent state: a task is rebuilt from the
//! labels on the first container of its definition. The key names and the
//! JSON encoding of the profile and job identity must not drift, or tasks
//! created by an older build stop reconciling.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::types::{ElasticProfile, JobIdentifier};

pub const LABEL_SERVER_ID: &str = "server-id";
pub const LABEL_JOB_IDENTIFIER: &str = "job-identifier";
pub const LABEL_ENVIRONMENT: &str = "environment";
pub const LABEL_CONFIGURATION: &str = "configuration";
pub const LABEL_CREATED_BY: &str = "created-by";

/// Docker labels of a container definition.
pub type Labels = BTreeMap<String, String>;

pub type LabelResult<T> = Result<T, LabelError>;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("missing label: {0}")]
    Missing(&'static str),

    #[error("malformed {label} label: {source}")]
    Malformed {
        label: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Identity labels of one agent task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipLabels {
    pub server_id: String,
    pub job_identifier: JobIdentifier,
    pub environment: String,
    pub profile: ElasticProfile,
}

impl OwnershipLabels {
    pub fn encode(&self, created_by: &str) -> LabelResult<Labels> {
        let job = self
            .job_identifier
            .to_json()
            .map_err(|source| LabelError::Malformed {
                label: LABEL_JOB_IDENTIFIER,
                source,
            })?;
        let profile = self.profile.to_json().map_err(|source| LabelError::Malformed {
            label: LABEL_CONFIGURATION,
            source,
        })?;

        let mut labels = Labels::new();
        labels.insert(LABEL_SERVER_ID.to_string(), self.server_id.clone());
        labels.insert(LABEL_JOB_IDENTIFIER.to_string(), job);
        labels.insert(LABEL_ENVIRONMENT.to_string(), self.environment.clone());
        labels.insert(LABEL_CONFIGURATION.to_string(), profile);
        labels.insert(LABEL_CREATED_BY.to_string(), created_by.to_string());
        Ok(labels)
    }

    /// Decode labels. A missing `server-id` decodes as `default_server_id`,
    /// a missing `environment` as the empty string.
    pub fn decode(labels: &Labels, default_server_id: &str) -> LabelResult<Self> {
        let profile_json = labels
            .get(LABEL_CONFIGURATION)
            .ok_or(LabelError::Missing(LABEL_CONFIGURATION))?;
        let job_json = labels
            .get(LABEL_JOB_IDENTIFIER)
            .ok_or(LabelError::Missing(LABEL_JOB_IDENTIFIER))?;

        let profile =
            ElasticProfile::from_json(profile_json).map_err(|source| LabelError::Malformed {
                label: LABEL_CONFIGURATION,
                source,
            })?;
        let job_identifier =
            JobIdentifier::from_json(job_json).map_err(|source| LabelError::Malformed {
                label: LABEL_JOB_IDENTIFIER,
                source,
            })?;

        Ok(Self {
            server_id: owner(labels, default_server_id).to_string(),
            job_identifier,
            environment: labels.get(LABEL_ENVIRONMENT).cloned().unwrap_or_default(),
            profile,
        })
    }
}

/// The server that owns a container, defaulting to `default_server_id`.
pub fn owner<'a>(labels: &'a Labels, default_server_id: &'a str) -> &'a str {
    labels
        .get(LABEL_SERVER_ID)
        .map(String::as_str)
        .unwrap_or(default_server_id)
}

/// Whether `server_id` owns a container. Unlabelled containers count as owned.
pub fn owned_by(labels: &Labels, server_id: &str) -> bool {
    owner(labels, server_id).eq_ignore_ascii_case(server_id)
}
