use crate::error::{KdevError, Result};
use crate::paths;
use crate::types::{self, DevModeStatus, PortForwardRecord, PortForwardStatus, PortMapping};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How long [`ProfileStore::lock`] waits for a concurrent kdev process.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// SyncState
// ---------------------------------------------------------------------------

/// Ports and flags of the file-sync daemon while a session is running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default)]
    pub syncing: bool,
    #[serde(default)]
    pub local_port: u16,
    #[serde(default)]
    pub local_gui_port: u16,
    #[serde(default)]
    pub remote_port: u16,
    #[serde(default)]
    pub remote_gui_port: u16,
}

// ---------------------------------------------------------------------------
// ServiceDevProfile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDevProfile {
    pub name: String,
    /// Deployment rolled back when the session ends. Defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<String>,
    #[serde(default)]
    pub status: DevModeStatus,
    #[serde(default, deserialize_with = "types::skip_invalid_records")]
    pub port_forward_pid_list: Vec<PortForwardRecord>,
    #[serde(default)]
    pub dev_port_list: Vec<PortMapping>,
    #[serde(default)]
    pub port_forward_status_list: Vec<PortForwardStatus>,
    #[serde(default)]
    pub syncthing_secret: String,
    #[serde(default)]
    pub sync: SyncState,
    #[serde(default)]
    pub local_sync_dirs: Vec<PathBuf>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl ServiceDevProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workload: None,
            status: DevModeStatus::NotDeveloping,
            port_forward_pid_list: Vec::new(),
            dev_port_list: Vec::new(),
            port_forward_status_list: Vec::new(),
            syncthing_secret: String::new(),
            sync: SyncState::default(),
            local_sync_dirs: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn workload_name(&self) -> &str {
        self.workload.as_deref().unwrap_or(&self.name)
    }

    /// `dev end` accepts a developing service, or one whose previous end was
    /// interrupted after it was marked `ending`.
    pub fn can_end(&self) -> bool {
        matches!(self.status, DevModeStatus::Developing | DevModeStatus::Ending)
    }

    pub fn set_status(&mut self, status: DevModeStatus) {
        self.status = status;
        self.touch();
    }

    // -----------------------------------------------------------------------
    // Port-forward lookups
    // -----------------------------------------------------------------------

    /// PID of the tunnel serving `port`. The last matching record wins, as the
    /// most recently started tunnel is the live one.
    pub fn pid_for_port(&self, port: PortMapping) -> Option<u32> {
        self.port_forward_pid_list
            .iter()
            .rev()
            .find(|r| r.port == port)
            .map(|r| r.pid)
    }

    pub fn ports_for_pid(&self, pid: u32) -> Vec<PortMapping> {
        let mut ports = Vec::new();
        for record in self.port_forward_pid_list.iter().filter(|r| r.pid == pid) {
            if !ports.contains(&record.port) {
                ports.push(record.port);
            }
        }
        ports
    }

    /// Distinct PIDs in first-seen order.
    pub fn distinct_pids(&self) -> Vec<u32> {
        let mut pids = Vec::new();
        for record in &self.port_forward_pid_list {
            if !pids.contains(&record.pid) {
                pids.push(record.pid);
            }
        }
        pids
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub fn add_port_forward(&mut self, port: PortMapping, pid: u32) {
        self.port_forward_pid_list
            .push(PortForwardRecord::new(port, pid));
        if !self.dev_port_list.contains(&port) {
            self.dev_port_list.push(port);
        }
        self.touch();
    }

    pub fn set_port_forward_status(&mut self, port: PortMapping, status: impl Into<String>) {
        let status = status.into();
        match self
            .port_forward_status_list
            .iter_mut()
            .find(|s| s.port == port)
        {
            Some(existing) => existing.status = status,
            None => self
                .port_forward_status_list
                .push(PortForwardStatus { port, status }),
        }
        self.touch();
    }

    pub fn delete_dev_ports(&mut self, ports: &[PortMapping]) -> usize {
        let before = self.dev_port_list.len();
        self.dev_port_list.retain(|p| !ports.contains(p));
        self.touch();
        before - self.dev_port_list.len()
    }

    pub fn delete_port_forward_statuses(&mut self, ports: &[PortMapping]) -> usize {
        let before = self.port_forward_status_list.len();
        self.port_forward_status_list
            .retain(|s| !ports.contains(&s.port));
        self.touch();
        before - self.port_forward_status_list.len()
    }

    pub fn delete_port_forward_records(&mut self, ports: &[PortMapping]) -> usize {
        let before = self.port_forward_pid_list.len();
        self.port_forward_pid_list
            .retain(|r| !ports.contains(&r.port));
        self.touch();
        before - self.port_forward_pid_list.len()
    }

    pub fn clear_port_forwards(&mut self) {
        self.dev_port_list.clear();
        self.port_forward_status_list.clear();
        self.port_forward_pid_list.clear();
        self.touch();
    }

    /// Forget the sync daemon's ports once it is stopped.
    pub fn clear_sync_state(&mut self) {
        self.sync = SyncState::default();
        self.touch();
    }

    /// Final transition of a teardown: the service is no longer developing.
    pub fn mark_dev_ended(&mut self) {
        self.status = DevModeStatus::NotDeveloping;
        self.sync.syncing = false;
        self.local_sync_dirs.clear();
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// ProfileStore
// ---------------------------------------------------------------------------

/// Per-service profile documents under `.kdev/profiles/`.
///
/// Mutations go through [`ProfileGuard`], which holds an exclusive file lock
/// on the service for its whole lifetime, so only one kdev process at a time
/// can read-modify-write a given profile.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self, service: &str) -> bool {
        paths::profile_path(&self.root, service).exists()
    }

    /// Unlocked snapshot, for display only.
    pub fn load(&self, service: &str) -> Result<ServiceDevProfile> {
        paths::validate_service_name(service)?;
        read_profile(&paths::profile_path(&self.root, service), service)
    }

    pub fn list(&self) -> Result<Vec<ServiceDevProfile>> {
        let dir = paths::profiles_dir(&self.root);
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut profiles = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let data = match std::fs::read_to_string(&path) {
                Ok(d) => d,
                Err(_) => continue,
            };
            match serde_yaml::from_str::<ServiceDevProfile>(&data) {
                Ok(profile) => profiles.push(profile),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable profile")
                }
            }
        }
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(profiles)
    }

    /// Write a new profile, replacing any existing one.
    pub fn create(&self, profile: &ServiceDevProfile) -> Result<()> {
        paths::validate_service_name(&profile.name)?;
        let lock = self.acquire(&profile.name, LOCK_TIMEOUT)?;
        write_profile(&paths::profile_path(&self.root, &profile.name), profile)?;
        drop(lock);
        Ok(())
    }

    /// Lock the service's profile and load it.
    pub fn lock(&self, service: &str) -> Result<ProfileGuard> {
        self.lock_with_timeout(service, LOCK_TIMEOUT)
    }

    pub fn lock_with_timeout(&self, service: &str, timeout: Duration) -> Result<ProfileGuard> {
        paths::validate_service_name(service)?;
        let lock_file = self.acquire(service, timeout)?;
        let path = paths::profile_path(&self.root, service);
        let profile = read_profile(&path, service)?;
        Ok(ProfileGuard {
            path,
            lock_file,
            profile,
        })
    }

    fn acquire(&self, service: &str, timeout: Duration) -> Result<File> {
        let path = paths::lock_path(&self.root, service);
        if let Some(parent) = path.parent() {
            crate::io::ensure_dir(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        let contended = fs2::lock_contended_error().raw_os_error();
        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(file),
                Err(e) if e.raw_os_error() == contended => {
                    if start.elapsed() >= timeout {
                        return Err(KdevError::ProfileLocked(service.to_string()));
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn read_profile(path: &Path, service: &str) -> Result<ServiceDevProfile> {
    if !path.exists() {
        return Err(KdevError::ProfileNotFound(service.to_string()));
    }
    let data = std::fs::read_to_string(path)?;
    let profile: ServiceDevProfile = serde_yaml::from_str(&data)?;
    Ok(profile)
}

fn write_profile(path: &Path, profile: &ServiceDevProfile) -> Result<()> {
    let data = serde_yaml::to_string(profile)?;
    crate::io::atomic_write(path, data.as_bytes())
}

// ---------------------------------------------------------------------------
// ProfileGuard
// ---------------------------------------------------------------------------

/// A loaded profile plus the exclusive lock on it. The lock is released when
/// the guard is dropped.
#[derive(Debug)]
pub struct ProfileGuard {
    path: PathBuf,
    lock_file: File,
    profile: ServiceDevProfile,
}

impl ProfileGuard {
    pub fn service(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &ServiceDevProfile {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut ServiceDevProfile {
        &mut self.profile
    }

    /// Persist the whole document atomically.
    pub fn save(&self) -> Result<()> {
        write_profile(&self.path, &self.profile)
    }
}

impl Drop for ProfileGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pm(s: &str) -> PortMapping {
        s.parse().unwrap()
    }

    #[test]
    fn profile_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::new(dir.path());
        assert!(!store.exists("web"));

        let mut profile = ServiceDevProfile::new("web");
        profile.status = DevModeStatus::Developing;
        profile.add_port_forward(pm("8080:80"), 111);
        profile.syncthing_secret = "web-sync-secret".into();
        store.create(&profile).unwrap();
        assert!(store.exists("web"));

        let loaded = store.load("web").unwrap();
        assert_eq!(loaded.status, DevModeStatus::Developing);
        assert_eq!(loaded.dev_port_list, vec![pm("8080:80")]);
        assert_eq!(loaded.pid_for_port(pm("8080:80")), Some(111));
        assert_eq!(loaded.syncthing_secret, "web-sync-secret");
    }

    #[test]
    fn legacy_profile_loads_and_migrates_on_save() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::new(dir.path());
        let path = paths::profile_path(dir.path(), "web");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "name: web\nstatus: developing\nport_forward_pid_list:\n  - 8080:80-111\n  - 9090:90-111\ndev_port_list:\n  - '8080:80'\n",
        )
        .unwrap();

        let guard = store.lock("web").unwrap();
        assert_eq!(guard.profile().distinct_pids(), vec![111]);
        guard.save().unwrap();
        drop(guard);

        let data = std::fs::read_to_string(&path).unwrap();
        assert!(data.contains("pid: 111"));
        assert!(!data.contains("-111"));
    }

    #[test]
    fn legacy_profile_with_bad_pid_drops_that_entry() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::new(dir.path());
        let path = paths::profile_path(dir.path(), "web");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "name: web\nstatus: developing\nport_forward_pid_list:\n  - 8080:80-abc\n  - 9090:90-222\n",
        )
        .unwrap();

        let loaded = store.load("web").unwrap();
        assert_eq!(loaded.status, DevModeStatus::Developing);
        assert_eq!(loaded.pid_for_port(pm("8080:80")), None);
        assert_eq!(loaded.pid_for_port(pm("9090:90")), Some(222));
    }

    #[test]
    fn missing_profile_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::new(dir.path());
        assert!(matches!(
            store.lock("web"),
            Err(KdevError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn lock_excludes_second_holder_until_dropped() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::new(dir.path());
        store.create(&ServiceDevProfile::new("web")).unwrap();

        let first = store.lock("web").unwrap();
        let second = store.lock_with_timeout("web", Duration::from_millis(120));
        assert!(matches!(second, Err(KdevError::ProfileLocked(_))));

        drop(first);
        assert!(store
            .lock_with_timeout("web", Duration::from_millis(120))
            .is_ok());
    }

    #[test]
    fn delete_by_port_touches_only_listed_ports() {
        let mut profile = ServiceDevProfile::new("web");
        profile.add_port_forward(pm("8080:80"), 111);
        profile.add_port_forward(pm("9090:90"), 222);
        profile.set_port_forward_status(pm("8080:80"), "LISTEN");
        profile.set_port_forward_status(pm("9090:90"), "LISTEN");

        assert_eq!(profile.delete_dev_ports(&[pm("8080:80")]), 1);
        assert_eq!(profile.delete_port_forward_statuses(&[pm("8080:80")]), 1);
        assert_eq!(profile.delete_port_forward_records(&[pm("8080:80")]), 1);

        assert_eq!(profile.dev_port_list, vec![pm("9090:90")]);
        assert_eq!(profile.port_forward_status_list.len(), 1);
        assert_eq!(profile.distinct_pids(), vec![222]);
    }

    #[test]
    fn ports_for_pid_groups_shared_tunnels() {
        let mut profile = ServiceDevProfile::new("web");
        profile.add_port_forward(pm("8080:80"), 111);
        profile.add_port_forward(pm("9090:90"), 111);
        profile.add_port_forward(pm("7070:70"), 333);

        assert_eq!(
            profile.ports_for_pid(111),
            vec![pm("8080:80"), pm("9090:90")]
        );
        assert_eq!(profile.distinct_pids(), vec![111, 333]);
    }

    #[test]
    fn mark_dev_ended_resets_session_fields() {
        let mut profile = ServiceDevProfile::new("web");
        profile.status = DevModeStatus::Ending;
        profile.sync.syncing = true;
        profile.local_sync_dirs.push(PathBuf::from("/src/web"));

        profile.mark_dev_ended();
        assert_eq!(profile.status, DevModeStatus::NotDeveloping);
        assert!(!profile.sync.syncing);
        assert!(profile.local_sync_dirs.is_empty());
    }

    #[test]
    fn list_skips_non_yaml() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::new(dir.path());
        store.create(&ServiceDevProfile::new("web")).unwrap();
        store.create(&ServiceDevProfile::new("api")).unwrap();
        std::fs::write(paths::profiles_dir(dir.path()).join("notes.txt"), "x").unwrap();

        let names: Vec<String> = store.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["api".to_string(), "web".to_string()]);
    }
}
