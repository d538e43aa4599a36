//! Process inventory and termination.
//!
//! [`ProcessControl`] is the seam between the enforcer and the OS. The
//! production implementation reads the process table through `sysinfo`;
//! tests substitute an in-memory table.
//!
//! A process is known by its name and, when its executable lives inside a
//! `.app` bundle, by the bundle's `CFBundleIdentifier` as well. Block and
//! allow lists may use either form.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System, UpdateKind};
use tracing::{debug, trace};

use super::error::ProcessError;

/// A running process as seen by one inventory pass.
///
/// Never cached across sweeps; the process may be gone by the next tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunningProcess {
    /// Process ID.
    pub pid: u32,
    /// Stable per-application identifier (the process name).
    pub app_id: String,
    /// Bundle identifier of the enclosing `.app`, e.g. `com.apple.Safari`.
    pub bundle_id: Option<String>,
}

impl RunningProcess {
    /// Create a process record.
    pub fn new(pid: u32, app_id: impl Into<String>) -> Self {
        Self {
            pid,
            app_id: app_id.into(),
            bundle_id: None,
        }
    }

    /// Attach a bundle identifier.
    pub fn with_bundle_id(mut self, bundle_id: impl Into<String>) -> Self {
        self.bundle_id = Some(bundle_id.into());
        self
    }

    /// Every identifier this process answers to: the name, then the bundle ID.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> + Clone {
        std::iter::once(self.app_id.as_str()).chain(self.bundle_id.as_deref())
    }

    /// Whether the process answers to `id`.
    pub fn answers_to(&self, id: &str) -> bool {
        self.identifiers().any(|own| own == id)
    }
}

/// Bundle identifier of the innermost `.app` bundle enclosing `exe`.
///
/// Reads `<bundle>.app/Contents/Info.plist` (XML or binary). Returns `None`
/// for executables outside a bundle or bundles without an identifier.
pub fn bundle_id_for_exe(exe: &Path) -> Option<String> {
    let bundle = exe
        .ancestors()
        .find(|dir| dir.extension().is_some_and(|ext| ext == "app"))?;
    let info = bundle.join("Contents").join("Info.plist");

    let value = match plist::Value::from_file(&info) {
        Ok(value) => value,
        Err(e) => {
            trace!("No readable Info.plist at {:?}: {}", info, e);
            return None;
        }
    };

    value
        .as_dictionary()?
        .get("CFBundleIdentifier")?
        .as_string()
        .map(str::to_string)
}

/// Read and signal running processes.
pub trait ProcessControl: Send + Sync {
    /// Fresh inventory of every running process.
    fn snapshot(&self) -> Result<Vec<RunningProcess>, ProcessError>;

    /// Ask the process to exit.
    fn terminate(&self, pid: u32) -> Result<(), ProcessError>;

    /// Kill the process outright.
    fn force_terminate(&self, pid: u32) -> Result<(), ProcessError>;

    /// Whether the process still exists.
    fn is_running(&self, pid: u32) -> bool;
}

/// [`ProcessControl`] backed by `sysinfo`.
pub struct SysinfoProcessControl {
    system: Mutex<System>,
    /// Bundle lookups keyed by executable path.
    bundle_ids: Mutex<HashMap<PathBuf, Option<String>>>,
}

impl SysinfoProcessControl {
    /// Create a controller with an empty process table.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            bundle_ids: Mutex::new(HashMap::new()),
        }
    }

    fn refresh(system: &mut System, which: ProcessesToUpdate<'_>) {
        system.refresh_processes_specifics(which, true, ProcessRefreshKind::new());
    }

    fn bundle_id(&self, exe: Option<&Path>) -> Option<String> {
        let exe = exe?;
        let Ok(mut cache) = self.bundle_ids.lock() else {
            return bundle_id_for_exe(exe);
        };
        cache
            .entry(exe.to_path_buf())
            .or_insert_with(|| bundle_id_for_exe(exe))
            .clone()
    }
}

impl Default for SysinfoProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for SysinfoProcessControl {
    fn snapshot(&self) -> Result<Vec<RunningProcess>, ProcessError> {
        let mut system = self
            .system
            .lock()
            .map_err(|e| ProcessError::Inventory(e.to_string()))?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet),
        );

        let processes: Vec<RunningProcess> = system
            .processes()
            .iter()
            .map(|(pid, process)| RunningProcess {
                pid: pid.as_u32(),
                app_id: process.name().to_string_lossy().to_string(),
                bundle_id: self.bundle_id(process.exe()),
            })
            .collect();

        trace!("Process inventory: {} entries", processes.len());
        Ok(processes)
    }

    fn terminate(&self, pid: u32) -> Result<(), ProcessError> {
        let mut system = self
            .system
            .lock()
            .map_err(|e| ProcessError::Inventory(e.to_string()))?;
        let target = Pid::from_u32(pid);
        Self::refresh(&mut system, ProcessesToUpdate::Some(&[target]));

        let process = system
            .process(target)
            .ok_or(ProcessError::NotFound { pid })?;

        match process.kill_with(Signal::Term) {
            Some(true) => Ok(()),
            Some(false) => Err(ProcessError::Signal {
                pid,
                message: "SIGTERM was not delivered".to_string(),
            }),
            None => {
                // No graceful signal on this platform; the escalation step kills it
                debug!("Graceful termination unsupported, deferring to forced kill");
                Ok(())
            }
        }
    }

    fn force_terminate(&self, pid: u32) -> Result<(), ProcessError> {
        let mut system = self
            .system
            .lock()
            .map_err(|e| ProcessError::Inventory(e.to_string()))?;
        let target = Pid::from_u32(pid);
        Self::refresh(&mut system, ProcessesToUpdate::Some(&[target]));

        let process = system
            .process(target)
            .ok_or(ProcessError::NotFound { pid })?;

        if process.kill() {
            Ok(())
        } else {
            Err(ProcessError::Signal {
                pid,
                message: "SIGKILL was not delivered".to_string(),
            })
        }
    }

    fn is_running(&self, pid: u32) -> bool {
        let Ok(mut system) = self.system.lock() else {
            return false;
        };
        let target = Pid::from_u32(pid);
        Self::refresh(&mut system, ProcessesToUpdate::Some(&[target]));
        system.process(target).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_snapshot_contains_current_process() {
        let control = SysinfoProcessControl::new();
        let processes = control.snapshot().unwrap();
        let me = std::process::id();

        assert!(processes.iter().any(|p| p.pid == me));
    }

    #[test]
    fn test_current_process_is_running() {
        let control = SysinfoProcessControl::new();
        assert!(control.is_running(std::process::id()));
    }

    fn write_bundle(root: &Path, name: &str, bundle_id: &str) -> PathBuf {
        let contents = root.join(format!("{}.app", name)).join("Contents");
        let macos = contents.join("MacOS");
        fs::create_dir_all(&macos).unwrap();
        fs::write(
            contents.join("Info.plist"),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>CFBundleIdentifier</key>
  <string>{}</string>
  <key>CFBundleName</key>
  <string>{}</string>
</dict>
</plist>
"#,
                bundle_id, name
            ),
        )
        .unwrap();
        macos.join(name)
    }

    #[test]
    fn test_bundle_id_from_enclosing_app() {
        let dir = tempdir().unwrap();
        let exe = write_bundle(dir.path(), "Slack", "com.tinyspeck.slackmacgap");

        assert_eq!(
            bundle_id_for_exe(&exe),
            Some("com.tinyspeck.slackmacgap".to_string())
        );
    }

    #[test]
    fn test_bundle_id_absent_outside_bundle() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join("bin").join("slack");

        assert_eq!(bundle_id_for_exe(&exe), None);
        assert_eq!(bundle_id_for_exe(Path::new("/usr/bin/true")), None);
    }

    #[test]
    fn test_process_answers_to_name_and_bundle_id() {
        let process = RunningProcess::new(5, "Finder").with_bundle_id("com.apple.finder");

        assert!(process.answers_to("Finder"));
        assert!(process.answers_to("com.apple.finder"));
        assert!(!process.answers_to("com.apple.Terminal"));
        assert_eq!(
            process.identifiers().collect::<Vec<_>>(),
            vec!["Finder", "com.apple.finder"]
        );
    }

    #[test]
    fn test_terminate_unknown_pid_is_not_found() {
        let control = SysinfoProcessControl::new();
        let result = control.terminate(u32::MAX - 1);
        assert!(matches!(result, Err(ProcessError::NotFound { .. })));
    }
}
