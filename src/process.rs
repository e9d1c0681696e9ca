//! Target-process liveness tracking via system process scans.

use log::info;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Watches the game process matched at session start. When nothing matched,
/// liveness stays true and the session runs on the step budget alone.
pub struct ProcessWatch {
    system: System,
    target_pid: Option<Pid>,
}

impl ProcessWatch {
    /// Scan once for a process whose name contains `name_hint`
    /// (case-insensitive), skipping our own process.
    pub fn find(name_hint: &str) -> Self {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            ProcessRefreshKind::everything(),
        );

        let own_pid = std::process::id();
        let needle = name_hint.to_lowercase();
        let target_pid = system.processes().iter().find_map(|(pid, process)| {
            if pid.as_u32() == own_pid {
                return None;
            }
            let name = process.name().to_string_lossy().to_lowercase();
            name.contains(&needle).then_some(*pid)
        });

        match target_pid {
            Some(pid) => info!("watching process {} for '{name_hint}'", pid.as_u32()),
            None => info!("no process matched '{name_hint}', skipping liveness checks"),
        }

        Self { system, target_pid }
    }

    /// Whether the watched process is still running. Always true when no
    /// process was matched at startup.
    pub fn is_alive(&mut self) -> bool {
        let Some(pid) = self.target_pid else {
            return true;
        };
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), ProcessRefreshKind::new());
        self.system.process(pid).is_some()
    }

    pub fn target_pid(&self) -> Option<u32> {
        self.target_pid.map(|pid| pid.as_u32())
    }
}
