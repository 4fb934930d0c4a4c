//! Deployment record: the identifiers a deployment run produces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Node endpoint the record was produced against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub server: String,
    pub port: String,
    /// Kept out of printed output; the record file stores it explicitly.
    #[serde(skip_serializing, default)]
    pub token: String,
}

impl Endpoint {
    /// `server[:port]` without a trailing slash.
    pub fn url(&self) -> String {
        let server = self.server.trim_end_matches('/');
        if self.port.trim().is_empty() {
            server.to_string()
        } else {
            format!("{server}:{}", self.port.trim())
        }
    }
}

/// Pipeline progress. Each stage implies every earlier one completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Empty,
    AppCreated,
    AssetCreated,
    Linked,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Empty => "EMPTY",
            Stage::AppCreated => "APP_CREATED",
            Stage::AssetCreated => "ASSET_CREATED",
            Stage::Linked => "LINKED",
        };
        f.write_str(s)
    }
}

/// Identifiers produced by a deployment. `0` means unset.
///
/// `asset_id` may only be set once `application_id` is; the setters enforce
/// this so an invalid record cannot be built, let alone persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    application_id: u64,
    asset_id: u64,
    pub deployer_address: String,
    pub endpoint: Endpoint,
}

impl DeploymentRecord {
    pub fn new(deployer_address: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            application_id: 0,
            asset_id: 0,
            deployer_address: deployer_address.into(),
            endpoint,
        }
    }

    pub fn application_id(&self) -> u64 {
        self.application_id
    }

    pub fn asset_id(&self) -> u64 {
        self.asset_id
    }

    /// Adopt a created (or resumed) application.
    pub fn set_application(&mut self, application_id: u64) -> Result<(), crate::Error> {
        if application_id == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "application id must be non-zero".into(),
            ));
        }
        if self.asset_id != 0 && self.application_id != application_id {
            return Err(crate::Error::InvalidConfiguration(format!(
                "cannot move asset {} to application {application_id}",
                self.asset_id
            )));
        }
        self.application_id = application_id;
        Ok(())
    }

    /// Record the minted credential asset. Requires an application.
    pub fn set_asset(&mut self, asset_id: u64) -> Result<(), crate::Error> {
        if self.application_id == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "asset id set before application id".into(),
            ));
        }
        if asset_id == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "asset id must be non-zero".into(),
            ));
        }
        self.asset_id = asset_id;
        Ok(())
    }

    /// Furthest stage the identifiers alone can prove. Linking leaves no
    /// trace in the record, so this never returns [`Stage::Linked`].
    pub fn stage(&self) -> Stage {
        match (self.application_id, self.asset_id) {
            (0, _) => Stage::Empty,
            (_, 0) => Stage::AppCreated,
            _ => Stage::AssetCreated,
        }
    }

    /// A record may be persisted only with both identifiers set.
    pub fn ensure_complete(&self) -> Result<(), crate::Error> {
        if self.application_id == 0 || self.asset_id == 0 {
            return Err(crate::Error::InvalidConfiguration(format!(
                "incomplete deployment record (app_id={}, asset_id={})",
                self.application_id, self.asset_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DeploymentRecord {
        DeploymentRecord::new("DEPLOYER", Endpoint::default())
    }

    #[test]
    fn test_stage_follows_identifiers() {
        let mut r = record();
        assert_eq!(r.stage(), Stage::Empty);
        r.set_application(42).unwrap();
        assert_eq!(r.stage(), Stage::AppCreated);
        r.set_asset(99).unwrap();
        assert_eq!(r.stage(), Stage::AssetCreated);
    }

    #[test]
    fn test_asset_before_application_rejected() {
        let mut r = record();
        assert!(r.set_asset(99).is_err());
        assert_eq!(r.asset_id(), 0);
    }

    #[test]
    fn test_zero_ids_rejected() {
        let mut r = record();
        assert!(r.set_application(0).is_err());
        r.set_application(1).unwrap();
        assert!(r.set_asset(0).is_err());
    }

    #[test]
    fn test_incomplete_record_not_persistable() {
        let mut r = record();
        assert!(r.ensure_complete().is_err());
        r.set_application(42).unwrap();
        assert!(r.ensure_complete().is_err());
        r.set_asset(99).unwrap();
        assert!(r.ensure_complete().is_ok());
    }

    #[test]
    fn test_stage_ordering() {
        assert!(Stage::Empty < Stage::AppCreated);
        assert!(Stage::AssetCreated < Stage::Linked);
        assert_eq!(Stage::AssetCreated.to_string(), "ASSET_CREATED");
    }
}
