//! UDP link: one frame per datagram.
//!
//! Replies go to the configured remote if there is one, otherwise to
//! the address the most recent datagram came from.  Read and write
//! handles share that "last peer" slot.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info};

use crate::error::TransportError;
use crate::hsk::transport::{Framing, Transport};

const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct UdpLink {
    socket: UdpSocket,
    remote: Option<SocketAddr>,
    last_peer: Arc<Mutex<Option<SocketAddr>>>,
}

impl UdpLink {
    pub fn bind(bind: &str, remote: Option<&str>) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind)?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        let remote = match remote {
            Some(r) => Some(r.to_socket_addrs()?.next().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("cannot resolve {r}"))
            })?),
            None => None,
        };
        info!(
            "UDP: bound {} (replies to {})",
            socket.local_addr()?,
            remote.map_or_else(|| "last sender".to_string(), |r| r.to_string())
        );
        Ok(Self {
            socket,
            remote,
            last_peer: Arc::new(Mutex::new(None)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn peer(&self) -> Option<SocketAddr> {
        self.remote.or_else(|| self.last_peer.lock().ok().and_then(|p| *p))
    }
}

impl Transport for UdpLink {
    fn framing(&self) -> Framing {
        Framing::Datagram
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.socket.recv_from(buf) {
            Ok((n, from)) => {
                if let Ok(mut p) = self.last_peer.lock() {
                    if *p != Some(from) {
                        debug!("UDP: peer is now {}", from);
                    }
                    *p = Some(from);
                }
                Ok(n)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let peer = self.peer().ok_or(TransportError::NoPeer)?;
        self.socket.send_to(data, peer)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(Self {
            socket: self.socket.try_clone()?,
            remote: self.remote,
            last_peer: self.last_peer.clone(),
        }))
    }
}
