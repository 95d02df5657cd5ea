use crate::error::KdevError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

// ---------------------------------------------------------------------------
// DevModeStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevModeStatus {
    #[default]
    NotDeveloping,
    Developing,
    Ending,
}

impl DevModeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DevModeStatus::NotDeveloping => "not_developing",
            DevModeStatus::Developing => "developing",
            DevModeStatus::Ending => "ending",
        }
    }
}

impl fmt::Display for DevModeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PortMapping
// ---------------------------------------------------------------------------

/// A `local:remote` port pair. Serialized in its string form (`"8080:80"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortMapping {
    pub local: u16,
    pub remote: u16,
}

impl PortMapping {
    pub fn new(local: u16, remote: u16) -> Self {
        Self { local, remote }
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.local, self.remote)
    }
}

impl FromStr for PortMapping {
    type Err = KdevError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KdevError::InvalidPortMapping(s.to_string());
        let s = s.trim();
        match s.split_once(':') {
            Some((local, remote)) => Ok(Self {
                local: local.parse().map_err(|_| invalid())?,
                remote: remote.parse().map_err(|_| invalid())?,
            }),
            None => {
                let port = s.parse().map_err(|_| invalid())?;
                Ok(Self::new(port, port))
            }
        }
    }
}

impl TryFrom<String> for PortMapping {
    type Error = KdevError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortMapping> for String {
    fn from(value: PortMapping) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// PortForwardRecord
// ---------------------------------------------------------------------------

/// A forwarded port and the tunnel process serving it. One tunnel process may
/// serve several ports, so `pid` is not unique across records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPortForwardRecord")]
pub struct PortForwardRecord {
    pub port: PortMapping,
    pub pid: u32,
}

impl PortForwardRecord {
    pub fn new(port: PortMapping, pid: u32) -> Self {
        Self { port, pid }
    }

    /// Parse the flat `"<local>:<remote>-<pid>"` encoding written by older
    /// releases.
    pub fn parse_legacy(s: &str) -> Result<Self, KdevError> {
        let invalid = || KdevError::InvalidPortForwardRecord(s.to_string());
        let (port, pid) = s.trim().rsplit_once('-').ok_or_else(invalid)?;
        let port = port.parse::<PortMapping>().map_err(|_| invalid())?;
        let pid = pid.parse::<u32>().map_err(|_| invalid())?;
        Ok(Self { port, pid })
    }
}

/// Accepts both the structured form and the legacy flat string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPortForwardRecord {
    Structured { port: PortMapping, pid: u32 },
    Legacy(String),
}

impl TryFrom<RawPortForwardRecord> for PortForwardRecord {
    type Error = KdevError;

    fn try_from(raw: RawPortForwardRecord) -> Result<Self, Self::Error> {
        match raw {
            RawPortForwardRecord::Structured { port, pid } => Ok(Self { port, pid }),
            RawPortForwardRecord::Legacy(s) => Self::parse_legacy(&s),
        }
    }
}

/// Deserialize a record list, dropping entries that do not parse. One corrupt
/// entry must not make the rest of the profile unreadable.
pub(crate) fn skip_invalid_records<'de, D>(
    deserializer: D,
) -> Result<Vec<PortForwardRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(values
        .into_iter()
        .filter_map(|value| match serde_yaml::from_value::<PortForwardRecord>(value.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(entry = ?value, error = %e, "skipping invalid port-forward record");
                None
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// PortForwardStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForwardStatus {
    pub port: PortMapping,
    pub status: String,
}

// ---------------------------------------------------------------------------
// ProcessKind
// ---------------------------------------------------------------------------

/// Background helper processes owned by a dev session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    /// The tunnel that carries sync-daemon traffic into the cluster.
    PortForward,
    SyncDaemon,
}

impl ProcessKind {
    pub fn file_stem(self) -> &'static str {
        match self {
            ProcessKind::PortForward => "sync-port-forward",
            ProcessKind::SyncDaemon => "syncthing",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProcessKind::PortForward => "port-forward",
            ProcessKind::SyncDaemon => "syncthing",
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// SyncMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Local changes are pushed, remote changes are pulled back.
    #[default]
    SendReceive,
    SendOnly,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_mapping_parses_pair_and_single() {
        assert_eq!(
            "8080:80".parse::<PortMapping>().unwrap(),
            PortMapping::new(8080, 80)
        );
        assert_eq!(
            "3000".parse::<PortMapping>().unwrap(),
            PortMapping::new(3000, 3000)
        );
        assert!("80:http".parse::<PortMapping>().is_err());
        assert!("".parse::<PortMapping>().is_err());
    }

    #[test]
    fn port_mapping_serializes_as_string() {
        let yaml = serde_yaml::to_string(&vec![PortMapping::new(8080, 80)]).unwrap();
        assert!(yaml.contains("8080:80"));
        let back: Vec<PortMapping> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, vec![PortMapping::new(8080, 80)]);
    }

    #[test]
    fn legacy_record_parses() {
        let rec = PortForwardRecord::parse_legacy("8080:80-111").unwrap();
        assert_eq!(rec.port, PortMapping::new(8080, 80));
        assert_eq!(rec.pid, 111);
    }

    #[test]
    fn legacy_record_rejects_non_numeric_pid() {
        assert!(PortForwardRecord::parse_legacy("8080:80-abc").is_err());
        assert!(PortForwardRecord::parse_legacy("8080:80").is_err());
    }

    #[test]
    fn record_deserializes_both_forms() {
        let yaml = "- 8080:80-111\n- port: '9090:90'\n  pid: 222\n";
        let recs: Vec<PortForwardRecord> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            recs,
            vec![
                PortForwardRecord::new(PortMapping::new(8080, 80), 111),
                PortForwardRecord::new(PortMapping::new(9090, 90), 222),
            ]
        );
    }

    #[test]
    fn invalid_records_are_skipped_in_lists() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(deserialize_with = "skip_invalid_records")]
            records: Vec<PortForwardRecord>,
        }

        let yaml = "records:\n- 9090:90-abc\n- 8080:80-111\n- port: http\n  pid: 3\n";
        let holder: Holder = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            holder.records,
            vec![PortForwardRecord::new(PortMapping::new(8080, 80), 111)]
        );
    }

    #[test]
    fn record_serializes_structured() {
        let rec = PortForwardRecord::new(PortMapping::new(8080, 80), 111);
        let yaml = serde_yaml::to_string(&rec).unwrap();
        assert!(yaml.contains("pid: 111"));
        assert!(yaml.contains("8080:80"));
    }
}
