//! Link-layer capability: send and receive raw Ethernet frames
//!
//! The SYN prober and ARP resolver only see the `LinkLayer` trait, so they
//! run against an in-memory link in tests and a pnet datalink channel in
//! production.

use crate::{Result, ScanError};
use anyhow::{bail, Context};
use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Raw frame transport owned by one prober
pub trait LinkLayer: Send {
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Next frame, or `None` when the read timeout passed without traffic
    fn recv(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Opens a fresh link on the interface a route resolved to
pub type LinkOpener = Arc<dyn Fn(&NetworkInterface) -> Result<Box<dyn LinkLayer>> + Send + Sync>;

/// Ethernet channel over pnet's datalink layer
pub struct EthernetChannel {
    interface: String,
    tx: Box<dyn DataLinkSender>,
    rx: Box<dyn DataLinkReceiver>,
}

impl EthernetChannel {
    pub fn open(interface: &NetworkInterface, read_timeout: Duration) -> Result<Self> {
        let config = Config {
            read_timeout: Some(read_timeout),
            ..Default::default()
        };
        Self::open_with(interface, config, datalink::channel)
    }

    /// Open through an injectable channel constructor
    pub fn open_with<F>(interface: &NetworkInterface, config: Config, opener: F) -> Result<Self>
    where
        F: FnOnce(&NetworkInterface, Config) -> io::Result<Channel>,
    {
        let (tx, rx) = open_eth_channel(interface, config, opener).map_err(|e| {
            let permission = e
                .downcast_ref::<io::Error>()
                .map_or(false, |io| io.kind() == io::ErrorKind::PermissionDenied);
            if permission {
                ScanError::PermissionError(format!("{:#}", e))
            } else {
                ScanError::RawSocketError(format!("{:#}", e))
            }
        })?;
        log::debug!("datalink channel open on {}", interface.name);
        Ok(Self {
            interface: interface.name.clone(),
            tx,
            rx,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

fn open_eth_channel<F>(
    interface: &NetworkInterface,
    config: Config,
    opener: F,
) -> anyhow::Result<(Box<dyn DataLinkSender>, Box<dyn DataLinkReceiver>)>
where
    F: FnOnce(&NetworkInterface, Config) -> io::Result<Channel>,
{
    let channel = opener(interface, config)
        .with_context(|| format!("opening on {}", interface.name))?;
    match channel {
        Channel::Ethernet(tx, rx) => Ok((tx, rx)),
        _ => bail!("non-ethernet channel for {}", interface.name),
    }
}

impl LinkLayer for EthernetChannel {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        match self.tx.send_to(frame, None) {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(ScanError::RawSocketError(format!(
                "send on {}: {}",
                self.interface, e
            ))),
            None => Err(ScanError::RawSocketError(format!(
                "send on {}: frame not queued",
                self.interface
            ))),
        }
    }

    fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        match self.rx.next() {
            Ok(frame) => Ok(Some(frame.to_vec())),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(ScanError::RawSocketError(format!(
                "read on {}: {}",
                self.interface, e
            ))),
        }
    }
}

/// Opener used outside tests
pub fn system_opener(read_timeout: Duration) -> LinkOpener {
    Arc::new(move |interface: &NetworkInterface| {
        let channel = EthernetChannel::open(interface, read_timeout)?;
        Ok(Box::new(channel) as Box<dyn LinkLayer>)
    })
}
