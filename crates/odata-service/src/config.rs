//! Service configuration, loaded from TOML.
//!
//! ```toml
//! service_root = "http://localhost:8080/odata"
//! listen = "127.0.0.1:8080"
//! verbose_errors = true
//!
//! [entity_set_rights]
//! "*" = "AllRead"
//! Orders = "All"
//!
//! [service_action_rights]
//! "*" = "Invoke"
//! ```

use crate::access::AccessGate;
use crate::model::{AccessRules, EntitySetRights, OperationRights};
use crate::service::ServiceSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),

    #[error("failed to parse config file {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),

    #[error("config validation failed: {0}")]
    ValidationFailed(String),
}

/// Settings of a hosted data service. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Absolute URI clients use to reach the service root.
    pub service_root: String,
    /// Socket address the HTTP binary binds.
    pub listen: String,
    pub verbose_errors: bool,
    pub max_batch_requests: usize,
    /// Channel capacity of each entity set's store actor.
    pub store_capacity: usize,
    pub entity_set_rights: AccessRules<EntitySetRights>,
    pub service_action_rights: AccessRules<OperationRights>,
    pub service_operation_rights: AccessRules<OperationRights>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_root: "http://localhost:8080".to_string(),
            listen: "127.0.0.1:8080".to_string(),
            verbose_errors: false,
            max_batch_requests: 100,
            store_capacity: 32,
            entity_set_rights: AccessRules::new().with("*", EntitySetRights::ALL),
            service_action_rights: AccessRules::new().with("*", OperationRights::Invoke),
            service_operation_rights: AccessRules::new().with("*", OperationRights::Invoke),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed(path.into(), e))?;
        let parsed: Self =
            toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(path.into(), e))?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.service_root.contains("://") {
            return Err(ConfigError::ValidationFailed(format!(
                "service_root '{}' must be an absolute URI",
                self.service_root
            )));
        }
        if self.max_batch_requests == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_batch_requests must be at least 1".to_string(),
            ));
        }
        if self.store_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "store_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn settings(&self) -> ServiceSettings {
        ServiceSettings {
            service_root: self.service_root.trim_end_matches('/').to_string(),
            verbose_errors: self.verbose_errors,
            max_batch_requests: self.max_batch_requests,
        }
    }

    pub fn access_gate(&self) -> AccessGate {
        AccessGate::new(
            self.entity_set_rights.clone(),
            self.service_action_rights.clone(),
            self.service_operation_rights.clone(),
        )
    }
}
