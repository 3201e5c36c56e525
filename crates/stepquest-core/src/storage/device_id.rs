//! Install identifier stamped on progress merged into another database.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use uuid::Uuid;

use super::data_dir;

const DEVICE_ID_FILE: &str = "device_id.txt";
const DEVICE_ID_PREFIX: &str = "stepquest-";

#[derive(Debug, thiserror::Error)]
pub enum DeviceIdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid device ID format: {0}")]
    InvalidFormat(String),
}

/// `stepquest-<uuid v4>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(Uuid);

impl DeviceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DEVICE_ID_PREFIX}{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = DeviceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DeviceIdError::InvalidFormat(s.to_string());
        let uuid = s.strip_prefix(DEVICE_ID_PREFIX).ok_or_else(invalid)?;
        Uuid::parse_str(uuid).map(Self).map_err(|_| invalid())
    }
}

/// Read the id kept in `dir/device_id.txt`, creating it on first use.
///
/// The file is written to a temporary name and renamed into place so a
/// crash never leaves a truncated id behind.
pub fn get_or_create_device_id_at(dir: &Path) -> Result<String, DeviceIdError> {
    let path = dir.join(DEVICE_ID_FILE);
    if path.exists() {
        let id: DeviceId = fs::read_to_string(&path)?.trim().parse()?;
        return Ok(id.to_string());
    }

    let id = DeviceId::generate();
    fs::create_dir_all(dir)?;
    let tmp = dir.join(format!("{DEVICE_ID_FILE}.tmp"));
    fs::write(&tmp, format!("{id}\n"))?;
    fs::rename(&tmp, &path)?;
    tracing::info!(device_id = %id, "created device id");
    Ok(id.to_string())
}

/// Device id of this install, kept in the data directory.
pub fn get_or_create_device_id() -> Result<String, DeviceIdError> {
    get_or_create_device_id_at(&data_dir()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn created_id_is_stable() {
        let dir = TempDir::new().unwrap();
        let first = get_or_create_device_id_at(dir.path()).unwrap();
        assert!(first.starts_with(DEVICE_ID_PREFIX));
        assert_eq!(first.len(), DEVICE_ID_PREFIX.len() + 36);
        assert_eq!(get_or_create_device_id_at(dir.path()).unwrap(), first);
        assert!(!dir.path().join("device_id.txt.tmp").exists());
    }

    #[test]
    fn creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested/path");
        get_or_create_device_id_at(&nested).unwrap();
        assert!(nested.join(DEVICE_ID_FILE).exists());
    }

    #[test]
    fn parse_checks_prefix_and_uuid() {
        let id: DeviceId = "stepquest-123e4567-e89b-12d3-a456-426614174000"
            .parse()
            .unwrap();
        assert_eq!(id.to_string(), "stepquest-123e4567-e89b-12d3-a456-426614174000");
        assert!("pomodoro-123e4567-e89b-12d3-a456-426614174000"
            .parse::<DeviceId>()
            .is_err());
        assert!("stepquest-not-a-uuid".parse::<DeviceId>().is_err());
    }

    #[test]
    fn corrupt_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(DEVICE_ID_FILE), "stepquest-123\n").unwrap();
        assert!(matches!(
            get_or_create_device_id_at(dir.path()),
            Err(DeviceIdError::InvalidFormat(_))
        ));
    }
}
