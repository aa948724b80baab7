//! Firmware ingest service managed through systemd.
//!
//! `start` and `stop` are queued with `--no-block` so systemd never holds
//! the main loop while the unit changes state; every call is still cut off
//! at a deadline in case systemctl itself hangs.

use std::io;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, warn};

use super::process::wait_bounded;
use crate::app::ports::IngestService;

pub const SYSTEMCTL_TIMEOUT: Duration = Duration::from_secs(2);

pub struct SystemdUnit {
    program: String,
    base_args: Vec<String>,
    unit: String,
    timeout: Duration,
}

impl SystemdUnit {
    pub fn new(unit: impl Into<String>) -> Self {
        Self::with_command("systemctl", unit, SYSTEMCTL_TIMEOUT)
    }

    /// `command` is split on whitespace like the journal command.
    pub fn with_command(command: &str, unit: impl Into<String>, timeout: Duration) -> Self {
        let mut words = command.split_whitespace().map(str::to_owned);
        Self {
            program: words.next().unwrap_or_default(),
            base_args: words.collect(),
            unit: unit.into(),
            timeout,
        }
    }

    fn systemctl(&self, args: &[&str]) -> io::Result<ExitStatus> {
        debug!("INGEST: systemctl {:?} {}", args, self.unit);
        let mut child = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .arg(&self.unit)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        wait_bounded(&mut child, self.timeout)?.ok_or_else(|| {
            warn!("INGEST: systemctl {:?} exceeded {:?}, killed it", args, self.timeout);
            io::ErrorKind::TimedOut.into()
        })
    }

    fn checked(&self, verb: &str) -> io::Result<()> {
        let status = self.systemctl(&["--no-block", verb])?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "systemctl {} {} exited with {}",
                verb, self.unit, status
            )))
        }
    }
}

impl IngestService for SystemdUnit {
    fn start(&mut self) -> io::Result<()> {
        self.checked("start")
    }

    fn stop(&mut self) -> io::Result<()> {
        self.checked("stop")
    }

    /// `is-active` exits 0 only for a running unit.
    fn is_running(&mut self) -> io::Result<bool> {
        Ok(self.systemctl(&["is-active"])?.success())
    }
}
