//! Journal queries through `journalctl`.

use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use super::process::wait_bounded;
use crate::app::ports::JournalPort;

pub struct Journalctl {
    program: String,
    base_args: Vec<String>,
}

impl Journalctl {
    /// `command` is split on whitespace: program, then fixed leading
    /// arguments, e.g. `journalctl --no-pager`.
    pub fn new(command: &str) -> Self {
        let mut words = command.split_whitespace().map(str::to_owned);
        Self {
            program: words.next().unwrap_or_default(),
            base_args: words.collect(),
        }
    }
}

impl JournalPort for Journalctl {
    /// Runs the query to completion or kills it at `timeout`.  Output is
    /// drained on a helper thread so a chatty query cannot fill the pipe
    /// and stall.
    fn query(&mut self, args: &[String], timeout: Duration) -> io::Result<Vec<u8>> {
        debug!("JOURNAL: {} {:?} {:?}", self.program, self.base_args, args);
        let mut child = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("journal stdout not captured"))?;
        let reader = thread::spawn(move || {
            let mut out = Vec::new();
            stdout.read_to_end(&mut out).map(|_| out)
        });

        let status = wait_bounded(&mut child, timeout)?;
        // The child is gone either way, so the pipe is closed and the
        // reader finishes.
        let out = reader
            .join()
            .map_err(|_| io::Error::other("journal reader panicked"))?;
        let Some(status) = status else {
            warn!("JOURNAL: query exceeded {:?}, killed it", timeout);
            return Err(io::ErrorKind::TimedOut.into());
        };
        let out = out?;
        if !status.success() {
            debug!("JOURNAL: query exited with {}", status);
        }
        Ok(out)
    }
}
