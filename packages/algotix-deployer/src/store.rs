//! Deployment record persistence as flat `key=value` lines.
//!
//! The file is always rewritten in full (tmp + rename) so a reader never
//! observes a half-written record.

use crate::record::{DeploymentRecord, Endpoint};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

const KEY_SERVER: &str = "algod_server";
const KEY_PORT: &str = "algod_port";
const KEY_TOKEN: &str = "algod_token";
const KEY_APP_ID: &str = "app_id";
const KEY_ASSET_ID: &str = "asset_id";
const KEY_DEPLOYER: &str = "deployer_address";

/// File-backed record store. Writes through one instance are serialized.
pub struct RecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the store with `record`. Incomplete records are refused.
    pub fn save(&self, record: &DeploymentRecord) -> Result<(), crate::Error> {
        record.ensure_complete()?;
        let contents = encode(record);

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = tmp.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                crate::Error::Store(format!("Failed to create record directory: {e}"))
            })?;
        }
        std::fs::write(&tmp, contents)
            .map_err(|e| crate::Error::Store(format!("Failed to write record: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| crate::Error::Store(format!("Failed to rename record: {e}")))?;

        info!(
            path = %self.path.display(),
            app_id = record.application_id(),
            asset_id = record.asset_id(),
            "Deployment record saved"
        );
        Ok(())
    }

    /// Read the persisted record. `None` when nothing has been deployed yet.
    pub fn load(&self) -> Result<Option<DeploymentRecord>, crate::Error> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No deployment record found");
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| crate::Error::Store(format!("Failed to read record: {e}")))?;
        let record = decode(&contents)?;
        if let Some(r) = &record {
            info!(
                path = %self.path.display(),
                app_id = r.application_id(),
                asset_id = r.asset_id(),
                "Deployment record loaded"
            );
        }
        Ok(record)
    }
}

fn encode(record: &DeploymentRecord) -> String {
    let endpoint = &record.endpoint;
    [
        (KEY_SERVER, endpoint.server.clone()),
        (KEY_PORT, endpoint.port.clone()),
        (KEY_TOKEN, endpoint.token.clone()),
        (KEY_APP_ID, record.application_id().to_string()),
        (KEY_ASSET_ID, record.asset_id().to_string()),
        (KEY_DEPLOYER, record.deployer_address.clone()),
    ]
    .iter()
    .map(|(k, v)| format!("{k}={v}\n"))
    .collect()
}

/// Parse `key=value` lines. Keys are case-insensitive so a `.env`-style
/// file with `APP_ID=...` reads the same; unknown keys are ignored.
fn decode(contents: &str) -> Result<Option<DeploymentRecord>, crate::Error> {
    let mut endpoint = Endpoint::default();
    let mut deployer = String::new();
    let mut app_id = None;
    let mut asset_id = None;

    for (n, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            crate::Error::Store(format!("line {}: expected key=value", n + 1))
        })?;
        let value = unquote(value.trim());
        match key.trim().to_ascii_lowercase().as_str() {
            KEY_SERVER => endpoint.server = value.to_string(),
            KEY_PORT => endpoint.port = value.to_string(),
            KEY_TOKEN => endpoint.token = value.to_string(),
            KEY_DEPLOYER => deployer = value.to_string(),
            KEY_APP_ID => app_id = Some(parse_id(KEY_APP_ID, value)?),
            KEY_ASSET_ID => asset_id = Some(parse_id(KEY_ASSET_ID, value)?),
            _ => {}
        }
    }

    let mut record = DeploymentRecord::new(deployer, endpoint);
    match (app_id.unwrap_or(0), asset_id.unwrap_or(0)) {
        (0, 0) => Ok(None),
        (0, asset) => Err(crate::Error::Store(format!(
            "record has asset_id={asset} but no app_id"
        ))),
        (app, asset) => {
            record.set_application(app)?;
            if asset != 0 {
                record.set_asset(asset)?;
            }
            Ok(Some(record))
        }
    }
}

fn parse_id(key: &str, value: &str) -> Result<u64, crate::Error> {
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|e| crate::Error::Store(format!("invalid {key} {value:?}: {e}")))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
