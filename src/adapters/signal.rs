//! SIGINT/SIGTERM/SIGHUP → one wake byte for the main loop.

use crossbeam_channel::{Receiver, Sender, bounded};
use log::warn;

/// Byte delivered for every termination request.
pub const TERMINATE: u8 = 15;

/// Install the process-wide handler.  Can only be called once.
pub fn install() -> Result<Receiver<u8>, ctrlc::Error> {
    let (tx, rx) = bounded(4);
    ctrlc::set_handler(handler(tx))?;
    Ok(rx)
}

fn handler(tx: Sender<u8>) -> impl FnMut() + Send + 'static {
    move || {
        // A full channel means a stop is already pending.
        if tx.try_send(TERMINATE).is_err() {
            warn!("SIGNAL: termination already pending");
        }
    }
}
