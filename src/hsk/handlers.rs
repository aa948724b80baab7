//! Command handlers.
//!
//! One plain `fn` per opcode, registered in
//! [`CommandTable::standard`](super::engine::CommandTable::standard).
//! Refusals the peer should hear about come back as `Reply::Error`;
//! anything returned as `Err` stops the daemon.
//!
//! Sysfs-backed reads (sensors, identity) are trusted platform plumbing,
//! so their failures are fatal.  Subprocess-backed services (journal,
//! ingest) fail routinely and are refused with `Unavailable` instead.

use std::ffi::OsStr;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use anyhow::Context;
use log::{info, warn};

use super::engine::{HskEngine, Reply, truncated};
use super::packet::{Packet, Payload};
use super::restart::RestartCode;
use crate::app::ports::FirmwareSlot;
use crate::error::CommandError;
use crate::fsm::{StartupControl, StateId};

/// Request byte that clears the end state (run to completion).
pub const RUN_TO_COMPLETION: u8 = 0xFF;

type HandlerResult = anyhow::Result<Reply>;

// ── Telemetry ────────────────────────────────────────────────

pub fn ping(_: &mut HskEngine, pkt: &Packet, _: &mut dyn StartupControl) -> HandlerResult {
    Ok(Reply::Data(pkt.data.clone()))
}

pub fn statistics(e: &mut HskEngine, _: &Packet, _: &mut dyn StartupControl) -> HandlerResult {
    Ok(Reply::bytes(&e.stats.snapshot().to_wire()))
}

pub fn temps(e: &mut HskEngine, _: &Packet, _: &mut dyn StartupControl) -> HandlerResult {
    let raw = e.services.sensors.raw_temps().context("reading temperatures")?;
    Ok(Reply::Data(be_words(&raw)))
}

pub fn volts(e: &mut HskEngine, _: &Packet, _: &mut dyn StartupControl) -> HandlerResult {
    let raw = e.services.sensors.raw_volts().context("reading voltages")?;
    Ok(Reply::Data(be_words(&raw)))
}

fn be_words(words: &[u16]) -> Payload {
    let mut p = Payload::new();
    for w in words {
        // At most six words.
        let _ = p.extend_from_slice(&w.to_be_bytes());
    }
    p
}

// ── Identity ─────────────────────────────────────────────────

pub fn identify(e: &mut HskEngine, _: &Packet, _: &mut dyn StartupControl) -> HandlerResult {
    let id = &e.services.identity;
    let dna = id.dna().context("reading device DNA")?;
    let mac = id.mac().context("reading MAC address")?;
    let platform = id.platform_version().context("reading platform version")?;
    let build = id
        .build_version()
        .map(|(maj, min, rev)| format!("{maj}.{min}.{rev}"))
        .unwrap_or_default();

    let mut out = Vec::with_capacity(64);
    for field in [dna.as_bytes(), mac.as_bytes(), platform.as_bytes(), build.as_bytes()] {
        out.extend_from_slice(field);
        out.push(0);
    }
    if let Some(loc) = e.services.location.location() {
        out.extend_from_slice(&[loc.crate_id, loc.side, loc.slot]);
    }
    Ok(Reply::bytes(&out))
}

// ── Bring-up control ─────────────────────────────────────────

pub fn start_state(
    _: &mut HskEngine,
    pkt: &Packet,
    startup: &mut dyn StartupControl,
) -> HandlerResult {
    if let Some(&b) = pkt.data.first() {
        match (b, StateId::from_u8(b)) {
            (RUN_TO_COMPLETION, _) => {
                info!("HSK: bring-up will run to completion");
                startup.set_end_state(None);
            }
            (_, Some(s)) if s != StateId::Failure => {
                info!("HSK: bring-up will halt at {:?}", s);
                startup.set_end_state(Some(s));
            }
            _ => return Ok(Reply::refuse(CommandError::InvalidArgument, &[b])),
        }
    }
    Ok(Reply::bytes(&[startup.state().as_u8()]))
}

// ── Firmware slots ───────────────────────────────────────────

pub fn fw_next(e: &mut HskEngine, pkt: &Packet, _: &mut dyn StartupControl) -> HandlerResult {
    link_command(e, pkt, FirmwareSlot::NextFirmware)
}

pub fn soft_next(e: &mut HskEngine, pkt: &Packet, _: &mut dyn StartupControl) -> HandlerResult {
    link_command(e, pkt, FirmwareSlot::NextSoftware)
}

/// Set the next software bundle, then restart straight into it.
pub fn soft_next_reboot(
    e: &mut HskEngine,
    pkt: &Packet,
    _: &mut dyn StartupControl,
) -> HandlerResult {
    let reply = link_command(e, pkt, FirmwareSlot::NextSoftware)?;
    if matches!(reply, Reply::Data(_)) {
        request_restart(e, RestartCode::NORMAL);
    }
    Ok(reply)
}

/// Empty request queries, a leading NUL clears, anything else is a path.
fn link_command(e: &mut HskEngine, pkt: &Packet, slot: FirmwareSlot) -> HandlerResult {
    let store = &mut e.services.firmware;
    match pkt.data.first() {
        None => {}
        Some(0) => {
            store
                .clear_link(slot)
                .with_context(|| format!("clearing {:?}", slot))?;
            info!("HSK: cleared {:?}", slot);
        }
        Some(_) => {
            let raw = pkt.data.split(|&b| b == 0).next().unwrap_or_default();
            let target = Path::new(OsStr::from_bytes(raw));
            match store.set_link(slot, target) {
                Ok(()) => info!("HSK: {:?} -> {}", slot, target.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    warn!("HSK: {:?} target {} does not exist", slot, target.display());
                    return Ok(Reply::Error(CommandError::NotFound, Payload::new()));
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("setting {:?}", slot));
                }
            }
        }
    }

    let current = store
        .read_link(slot)
        .with_context(|| format!("reading {:?}", slot))?;
    Ok(match current {
        Some(target) => {
            let mut out = target.as_os_str().as_bytes().to_vec();
            out.push(0);
            Reply::bytes(&out)
        }
        None => Reply::bytes(&[0]),
    })
}

// ── Journal ──────────────────────────────────────────────────

/// A non-empty request starts a new query; every request returns the next
/// chunk of the buffered output.
pub fn journal(e: &mut HskEngine, pkt: &Packet, _: &mut dyn StartupControl) -> HandlerResult {
    if !pkt.data.is_empty() {
        let args: Vec<String> = String::from_utf8_lossy(&pkt.data)
            .split(|c: char| c.is_whitespace() || c == '\0')
            .filter(|a| !a.is_empty())
            .map(str::to_owned)
            .collect();
        match e.services.journal.query(&args, e.journal_timeout) {
            Ok(out) => {
                info!("HSK: journal query {:?} returned {} bytes", args, out.len());
                e.journal.load(out);
            }
            Err(err) => {
                warn!("HSK: journal query {:?} failed: {}", args, err);
                e.journal.load(Vec::new());
                return Ok(Reply::refuse(CommandError::Unavailable, &[]));
            }
        }
    }
    Ok(Reply::Data(truncated(e.journal.next_chunk())))
}

// ── Download mode ────────────────────────────────────────────

pub fn download_mode(
    e: &mut HskEngine,
    pkt: &Packet,
    _: &mut dyn StartupControl,
) -> HandlerResult {
    let ingest = &mut e.services.ingest;
    let outcome = match pkt.data.first() {
        None => Ok(()),
        Some(1) => ingest.start().map(|()| {
            info!("HSK: download mode on");
            e.ingest_started = true;
        }),
        Some(0) => ingest.stop().map(|()| {
            info!("HSK: download mode off");
            e.ingest_started = false;
        }),
        Some(&b) => return Ok(Reply::refuse(CommandError::InvalidArgument, &[b])),
    };
    if let Err(err) = outcome {
        warn!("HSK: ingest service control failed: {}", err);
        return Ok(Reply::refuse(CommandError::Unavailable, &pkt.data));
    }

    match ingest.is_running() {
        Ok(up) => Ok(Reply::bytes(&[up as u8])),
        Err(err) => {
            warn!("HSK: ingest service status unknown: {}", err);
            Ok(Reply::refuse(CommandError::Unavailable, &pkt.data))
        }
    }
}

// ── Restart ──────────────────────────────────────────────────

pub fn restart(e: &mut HskEngine, pkt: &Packet, _: &mut dyn StartupControl) -> HandlerResult {
    let &[b] = &pkt.data[..] else {
        return Ok(Reply::refuse(CommandError::InvalidArgument, &pkt.data));
    };
    let Some(code) = RestartCode::parse(b) else {
        return Ok(Reply::refuse(CommandError::InvalidArgument, &[b]));
    };
    if code.force_reprogram() {
        e.services
            .firmware
            .clear_link(FirmwareSlot::CurrentFirmware)
            .context("clearing current firmware link")?;
        info!("HSK: current firmware link cleared for reprogram");
    }
    request_restart(e, code);
    Ok(Reply::bytes(&[b]))
}

fn request_restart(e: &mut HskEngine, code: RestartCode) {
    info!("HSK: {} requested", code);
    e.restart = Some(code);
}
