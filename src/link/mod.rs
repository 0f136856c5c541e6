//! # Crazyflie link
//!
//! Plumbing between an open `crazyflie_link::Connection` and the rest of the crate. A [CrazyflieLink] runs two
//! tasks: one forwards the uplink packet queue to the radio, the other dispatches received packets to the subsystem
//! listening on their CRTP port. The pieces built on top of it are:
//!  - a [CrtpCommander] sharing the uplink queue,
//!  - a [ParamReader], used to detect the flow deck,
//!  - a [LogReader], used to stream the position estimate.
//!
//! ``` no_run
//! # async fn connect() -> flowdeck_pilot::Result<()> {
//! use flowdeck_pilot::link::{param, CrazyflieLink};
//! use flowdeck_pilot::sink::crtp::CrtpConfig;
//! use flowdeck_pilot::supervisor::sensor_channel;
//!
//! let context = crazyflie_link::LinkContext::new();
//! let mut link = CrazyflieLink::connect(context.open_link("radio://0/80/2M/E7E7E7E7E7").await?);
//!
//! let (sensor, monitor) = sensor_channel();
//! let params = link.param().await?;
//! param::confirm_flow_deck(&params, &sensor).await?;
//!
//! let commander = link.commander(CrtpConfig::default());
//! # Ok(())
//! # }
//! ```

pub(crate) mod crtp_utils;
pub mod log;
pub mod param;

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Duration;

use crazyflie_link::Packet;
use flume::{Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::link::log::LogReader;
use crate::link::param::ParamReader;
use crate::sink::crtp::{CrtpCommander, CrtpConfig, CrtpPort};
use crate::{Error, Result};

struct CrtpDispatch {
    link: Arc<crazyflie_link::Connection>,
    port_channels: BTreeMap<u8, Sender<Packet>>,
    disconnect: Arc<AtomicBool>,
}

impl CrtpDispatch {
    fn new(link: Arc<crazyflie_link::Connection>, disconnect: Arc<AtomicBool>) -> Self {
        CrtpDispatch {
            link,
            port_channels: BTreeMap::new(),
            disconnect,
        }
    }

    fn port_receiver(&mut self, port: CrtpPort) -> Receiver<Packet> {
        let (tx, rx) = flume::unbounded();
        self.port_channels.insert(port.into(), tx);
        rx
    }

    fn run(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            while !self.disconnect.load(Relaxed) {
                match timeout(Duration::from_millis(200), self.link.recv_packet()).await {
                    Ok(Ok(packet)) => {
                        if let Some(channel) = self.port_channels.get(&packet.get_port()) {
                            let _ = channel.send_async(packet).await;
                        }
                    }
                    Err(_) => continue,
                    // Link closed
                    Ok(Err(_)) => return,
                }
            }
        })
    }
}

/// # Connected Crazyflie
///
/// One-time use: once disconnected, either on request or after a link loss, a new one must be created from a new
/// connection. See the [module documentation](crate::link) for an example.
pub struct CrazyflieLink {
    link: Arc<crazyflie_link::Connection>,
    uplink: Sender<Packet>,
    param_downlink: Option<Receiver<Packet>>,
    log_downlink: Option<Receiver<Packet>>,
    disconnect: Arc<AtomicBool>,
    uplink_task: Option<JoinHandle<()>>,
    dispatch_task: Option<JoinHandle<()>>,
}

impl CrazyflieLink {
    /// Start the uplink and dispatch tasks on an open connection
    pub fn connect(connection: crazyflie_link::Connection) -> Self {
        let disconnect = Arc::new(AtomicBool::new(false));
        let link = Arc::new(connection);

        // Downlink dispatcher
        let mut dispatcher = CrtpDispatch::new(link.clone(), disconnect.clone());
        let param_downlink = dispatcher.port_receiver(CrtpPort::Param);
        let log_downlink = dispatcher.port_receiver(CrtpPort::Log);
        let dispatch_task = dispatcher.run();

        // Uplink queue
        let (uplink, rx) = flume::unbounded::<Packet>();
        let disconnect_uplink = disconnect.clone();
        let link_uplink = link.clone();
        let uplink_task = tokio::spawn(async move {
            while !disconnect_uplink.load(Relaxed) {
                match timeout(Duration::from_millis(100), rx.recv_async()).await {
                    Ok(Ok(pk)) => {
                        if let Err(e) = link_uplink.send_packet(pk).await {
                            ::log::warn!("Link uplink failed: {:?}", e);
                            return;
                        }
                    }
                    Err(_) => (),
                    Ok(Err(flume::RecvError::Disconnected)) => return,
                }
            }
        });

        Self {
            link,
            uplink,
            param_downlink: Some(param_downlink),
            log_downlink: Some(log_downlink),
            disconnect,
            uplink_task: Some(uplink_task),
            dispatch_task: Some(dispatch_task),
        }
    }

    /// Flight commander sending on this link
    pub fn commander(&self, config: CrtpConfig) -> CrtpCommander {
        CrtpCommander::new(self.uplink.clone(), config)
    }

    /// Download the parameter table and return the reader
    ///
    /// The param port has a single reader: a second call returns [Error::Disconnected].
    pub async fn param(&mut self) -> Result<ParamReader> {
        let downlink = self.param_downlink.take().ok_or(Error::Disconnected)?;
        ParamReader::new(self.uplink.clone(), downlink).await
    }

    /// Download the log table and return the reader
    ///
    /// The log port has a single reader: a second call returns [Error::Disconnected].
    pub async fn log(&mut self) -> Result<LogReader> {
        let downlink = self.log_downlink.take().ok_or(Error::Disconnected)?;
        LogReader::new(self.uplink.clone(), downlink).await
    }

    /// Stop both tasks and close the link
    ///
    /// Commanders and readers created from this link report [Error::Disconnected] afterwards.
    pub async fn disconnect(&mut self) {
        self.disconnect.store(true, Relaxed);

        if let Some(uplink_task) = self.uplink_task.take() {
            let _ = uplink_task.await;
        }
        if let Some(dispatch_task) = self.dispatch_task.take() {
            let _ = dispatch_task.await;
        }

        self.link.close().await;
    }
}

impl Drop for CrazyflieLink {
    fn drop(&mut self) {
        self.disconnect.store(true, Relaxed);
    }
}
