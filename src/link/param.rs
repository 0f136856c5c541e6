//! # Parameter reading
//!
//! The Crazyflie exposes its settings and the hardware it detected as parameters, listed in a table of content
//! downloaded when the [ParamReader] is created. Names are formatted "group.name".
//!
//! The flow deck detection is one of them: [FLOW_DECK_PARAM] reads 1 when a Flow deck V2 was found at boot.
//! [confirm_flow_deck] reads it and reports the result on the [SensorLink] the supervisor waits on. A firmware
//! without the deck driver has no such parameter; nothing is reported then and the startup ends on the sensor
//! timeout.

use std::collections::BTreeMap;

use crazyflie_link::Packet;
use flume::{Receiver, Sender};
use log::{info, warn};
use tokio::sync::Mutex;

use crate::link::crtp_utils::{channel_dispatcher, fetch_toc, TocItem, WaitForPacket};
use crate::sink::crtp::CrtpPort;
use crate::supervisor::SensorLink;
use crate::{Error, Result};

/// Flow deck V2 detection parameter
pub const FLOW_DECK_PARAM: &str = "deck.bcFlow2";

const READ_CHANNEL: u8 = 1;

// Low nibble of the TOC type byte
const TYPE_U8: u8 = 0x08;

fn not_found(name: &str) -> Error {
    Error::ParamError(format!("Parameter {} not found", name))
}

/// # Access to the Crazyflie parameters
///
/// Reads are sent one at a time and always fetch the current value from the Crazyflie.
#[derive(Debug)]
pub struct ParamReader {
    uplink: Sender<Packet>,
    read_downlink: Mutex<Receiver<Packet>>,
    toc: BTreeMap<String, TocItem>,
}

impl ParamReader {
    /// Download the table of content over `downlink`, the param port packets
    pub async fn new(uplink: Sender<Packet>, downlink: Receiver<Packet>) -> Result<Self> {
        let (toc_downlink, read_downlink, _write_downlink, _misc_downlink) = channel_dispatcher(downlink);
        let toc = fetch_toc(CrtpPort::Param, &uplink, &toc_downlink).await?;

        Ok(Self {
            uplink,
            read_downlink: Mutex::new(read_downlink),
            toc,
        })
    }

    /// Names of all the parameters
    pub fn names(&self) -> Vec<String> {
        self.toc.keys().cloned().collect()
    }

    /// Read an 8 bit unsigned parameter
    ///
    /// Return an error if the parameter does not exist, has another type, or the Crazyflie refuses the read.
    pub async fn get_u8(&self, name: &str) -> Result<u8> {
        let item = self.toc.get(name).ok_or_else(|| not_found(name))?;
        if item.item_type & 0x0f != TYPE_U8 {
            return Err(Error::ParamError(format!(
                "Parameter {} is type 0x{:02x}, not u8",
                name, item.item_type
            )));
        }

        let value = self.read_value(item.id).await?;
        value
            .first()
            .copied()
            .ok_or_else(|| Error::ProtocolError(format!("empty value for {}", name)))
    }

    async fn read_value(&self, param_id: u16) -> Result<Vec<u8>> {
        let downlink = self.read_downlink.lock().await;

        let id = param_id.to_le_bytes();
        let request = Packet::new(CrtpPort::Param.into(), READ_CHANNEL, id.to_vec());
        self.uplink.send_async(request).await?;

        let response = downlink.wait_packet(READ_CHANNEL, &id).await?;
        match response.get_data().as_slice() {
            [_, _, 0, value @ ..] => Ok(value.to_vec()),
            [_, _, code, ..] => Err(Error::ParamError(format!(
                "Reading parameter {} failed with code {}",
                param_id, code
            ))),
            _ => Err(Error::ProtocolError("param read response too short".to_owned())),
        }
    }
}

/// Report the flow deck detection parameter on `sensor`
///
/// Returns the reported presence. If the parameter cannot be read, the error is returned and nothing is reported.
pub async fn confirm_flow_deck(param: &ParamReader, sensor: &SensorLink) -> Result<bool> {
    let attached = match param.get_u8(FLOW_DECK_PARAM).await {
        Ok(value) => value != 0,
        Err(e) => {
            warn!("Could not read {}: {}", FLOW_DECK_PARAM, e);
            return Err(e);
        }
    };

    if attached {
        info!("Flow deck detected");
    }
    sensor.confirm_sensor(attached);
    Ok(attached)
}
