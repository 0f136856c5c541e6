//! # Log blocks
//!
//! The log subsystem streams firmware variables at a fixed period. Variables are listed in a table of content
//! downloaded when the [LogReader] is created, grouped into a [LogBlock], and the block is started with its period.
//! Every period the Crazyflie then sends one packet holding a millisecond timestamp and the values.
//!
//! [LogReader::start_position] streams the position estimate (`stateEstimate.x/y/z`) and [record_positions] relays
//! it into a [TelemetryRecorder]:
//! ``` no_run
//! # async fn trail(link: &mut flowdeck_pilot::link::CrazyflieLink) -> flowdeck_pilot::Result<()> {
//! use flowdeck_pilot::link::log::{record_positions, POSITION_PERIOD};
//! use flowdeck_pilot::telemetry::TelemetryRecorder;
//!
//! let recorder = TelemetryRecorder::new();
//! let positions = link.log().await?.start_position(POSITION_PERIOD).await?;
//! tokio::spawn(record_positions(positions, recorder.clone()));
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crazyflie_link::Packet;
use flume::{Receiver, Sender};
use log::{debug, warn};
use num_enum::TryFromPrimitive;

use crate::link::crtp_utils::{channel_dispatcher, fetch_toc, TocItem, WaitForPacket};
use crate::sink::crtp::CrtpPort;
use crate::telemetry::{TelemetryRecorder, TelemetrySample};
use crate::{Error, Result};

/// Variables of the position block
pub const POSITION_VARIABLES: [&str; 3] = ["stateEstimate.x", "stateEstimate.y", "stateEstimate.z"];
/// Period of the position block
pub const POSITION_PERIOD: Duration = Duration::from_millis(10);

const CONTROL_CHANNEL: u8 = 1;

const START_BLOCK: u8 = 3;
const STOP_BLOCK: u8 = 4;
const RESET: u8 = 5;
const CREATE_BLOCK_V2: u8 = 6;

// Block id, then a 24 bit timestamp
const DATA_HEADER: usize = 4;
const MAX_BLOCK_PAYLOAD: usize = 30 - DATA_HEADER;

fn not_found(name: &str) -> Error {
    Error::LogError(format!("Log variable {} not found", name))
}

type BlockChannels = Arc<Mutex<HashMap<u8, Sender<Packet>>>>;

fn lock(blocks: &BlockChannels) -> MutexGuard<'_, HashMap<u8, Sender<Packet>>> {
    blocks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Type of a log variable, as listed in the table of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum LogType {
    /// uint8_t
    U8 = 1,
    /// uint16_t
    U16 = 2,
    /// uint32_t
    U32 = 3,
    /// int8_t
    I8 = 4,
    /// int16_t
    I16 = 5,
    /// int32_t
    I32 = 6,
    /// float
    F32 = 7,
    /// half precision float
    F16 = 8,
}

impl LogType {
    fn size(self) -> usize {
        match self {
            LogType::U8 | LogType::I8 => 1,
            LogType::U16 | LogType::I16 | LogType::F16 => 2,
            LogType::U32 | LogType::I32 | LogType::F32 => 4,
        }
    }

    fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            LogType::U8 => bytes[0] as f32,
            LogType::I8 => bytes[0] as i8 as f32,
            LogType::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            LogType::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            LogType::F16 => half::f16::from_le_bytes([bytes[0], bytes[1]]).to_f32(),
            LogType::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            LogType::I32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            LogType::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }
}

fn log_type(item: &TocItem) -> Result<LogType> {
    LogType::try_from_primitive(item.item_type & 0x0f)
        .map_err(|_| Error::ProtocolError(format!("Invalid log item type: {}", item.item_type)))
}

/// # Access to the Crazyflie log subsystem
pub struct LogReader {
    uplink: Sender<Packet>,
    control_downlink: Arc<tokio::sync::Mutex<Receiver<Packet>>>,
    blocks: BlockChannels,
    toc: BTreeMap<String, TocItem>,
    next_block_id: Mutex<u8>,
}

impl LogReader {
    /// Download the table of content over `downlink`, the log port packets, and delete any block left running
    pub async fn new(uplink: Sender<Packet>, downlink: Receiver<Packet>) -> Result<Self> {
        let (toc_downlink, control_downlink, data_downlink, _) = channel_dispatcher(downlink);
        let toc = fetch_toc(CrtpPort::Log, &uplink, &toc_downlink).await?;

        // Route data packets to their block by id
        let blocks: BlockChannels = Arc::default();
        let routes = blocks.clone();
        tokio::spawn(async move {
            while let Ok(pk) = data_downlink.recv_async().await {
                let block_id = match pk.get_data().first() {
                    Some(id) => *id,
                    None => continue,
                };
                let channel = lock(&routes).get(&block_id).cloned();
                if let Some(channel) = channel {
                    if channel.send_async(pk).await.is_err() {
                        lock(&routes).remove(&block_id);
                    }
                }
            }
        });

        let log = Self {
            uplink,
            control_downlink: Arc::new(tokio::sync::Mutex::new(control_downlink)),
            blocks,
            toc,
            next_block_id: Mutex::new(0),
        };
        log.reset().await?;
        Ok(log)
    }

    async fn reset(&self) -> Result<()> {
        let downlink = self.control_downlink.lock().await;

        let pk = Packet::new(CrtpPort::Log.into(), CONTROL_CHANNEL, vec![RESET]);
        self.uplink.send_async(pk).await?;

        let pk = downlink.wait_packet(CONTROL_CHANNEL, &[RESET]).await?;
        check_reply(&pk, "reset")
    }

    /// Names of all the log variables
    pub fn names(&self) -> Vec<String> {
        self.toc.keys().cloned().collect()
    }

    fn generate_next_block_id(&self) -> Result<u8> {
        let mut next_block_id = self.next_block_id.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *next_block_id == u8::MAX {
            return Err(Error::LogError("No more block ID available!".into()));
        }
        let id = *next_block_id;
        *next_block_id += 1;
        Ok(id)
    }

    /// Create a block holding `variables`, in that order
    ///
    /// The values of a block must fit in one packet (26 bytes).
    pub async fn create_block(&self, variables: &[&str]) -> Result<LogBlock> {
        let mut resolved = Vec::with_capacity(variables.len());
        for name in variables {
            let item = *self.toc.get(*name).ok_or_else(|| not_found(name))?;
            resolved.push((item, log_type(&item)?));
        }
        let size: usize = resolved.iter().map(|(_, log_type)| log_type.size()).sum();
        if size > MAX_BLOCK_PAYLOAD {
            return Err(Error::LogError(format!(
                "Block of {} bytes does not fit in a packet",
                size
            )));
        }

        let block_id = self.generate_next_block_id()?;
        let mut payload = vec![CREATE_BLOCK_V2, block_id];
        for (item, log_type) in resolved.iter() {
            // Stored and fetched as the TOC type
            let log_type = *log_type as u8;
            payload.push(log_type << 4 | log_type);
            payload.extend_from_slice(&item.id.to_le_bytes());
        }

        let block = LogBlock {
            uplink: self.uplink.clone(),
            control_downlink: self.control_downlink.clone(),
            blocks: self.blocks.clone(),
            block_id,
            types: resolved.into_iter().map(|(_, log_type)| log_type).collect(),
        };
        block.control(payload).await?;
        debug!("Created log block {} with {:?}", block_id, variables);
        Ok(block)
    }

    /// Create and start the position block
    pub async fn start_position(&self, period: Duration) -> Result<LogStream> {
        self.create_block(&POSITION_VARIABLES).await?.start(period).await
    }
}

fn check_reply(pk: &Packet, command: &str) -> Result<()> {
    match pk.get_data().get(2) {
        Some(0) => Ok(()),
        Some(code) => Err(Error::LogError(format!("Log {} refused with code {}", command, code))),
        None => Err(Error::ProtocolError(format!("Log {} reply too short", command))),
    }
}

/// Log block created on the Crazyflie, not started
pub struct LogBlock {
    uplink: Sender<Packet>,
    control_downlink: Arc<tokio::sync::Mutex<Receiver<Packet>>>,
    blocks: BlockChannels,
    block_id: u8,
    types: Vec<LogType>,
}

impl LogBlock {
    /// Block id on the Crazyflie
    pub fn id(&self) -> u8 {
        self.block_id
    }

    async fn control(&self, payload: Vec<u8>) -> Result<()> {
        let downlink = self.control_downlink.lock().await;
        let prefix = [payload[0], self.block_id];

        let pk = Packet::new(CrtpPort::Log.into(), CONTROL_CHANNEL, payload);
        self.uplink.send_async(pk).await?;

        let pk = downlink.wait_packet(CONTROL_CHANNEL, &prefix).await?;
        check_reply(&pk, "block command")
    }

    /// Start the block and return the stream of its values
    ///
    /// The period is rounded down to 10 ms steps, between 10 ms and 2.55 s.
    pub async fn start(self, period: Duration) -> Result<LogStream> {
        let period_10ms = (period.as_millis() / 10).clamp(1, u8::MAX as u128) as u8;

        let (tx, rx) = flume::unbounded();
        lock(&self.blocks).insert(self.block_id, tx);
        if let Err(e) = self.control(vec![START_BLOCK, self.block_id, period_10ms]).await {
            lock(&self.blocks).remove(&self.block_id);
            return Err(e);
        }

        Ok(LogStream {
            block: self,
            data_downlink: rx,
        })
    }
}

/// Values of one log packet
#[derive(Debug, Clone, PartialEq)]
pub struct LogData {
    /// Crazyflie timestamp (ms), wraps after 2^24
    pub timestamp: u32,
    /// Values in the block order
    pub values: Vec<f32>,
}

/// Running log block
pub struct LogStream {
    block: LogBlock,
    data_downlink: Receiver<Packet>,
}

impl LogStream {
    /// Next packet of the block
    ///
    /// Malformed packets are logged and skipped. Returns [Error::Disconnected] once the link is closed.
    pub async fn next_data(&self) -> Result<LogData> {
        loop {
            let pk = self.data_downlink.recv_async().await?;
            match decode(&self.block.types, pk.get_data()) {
                Some(data) => return Ok(data),
                None => warn!("Malformed log packet for block {}", self.block.block_id),
            }
        }
    }

    /// Stop the block, returning it to be started again
    pub async fn stop(self) -> Result<LogBlock> {
        lock(&self.block.blocks).remove(&self.block.block_id);
        self.block.control(vec![STOP_BLOCK, self.block.block_id]).await?;
        Ok(self.block)
    }
}

fn decode(types: &[LogType], data: &[u8]) -> Option<LogData> {
    let size: usize = types.iter().map(|t| t.size()).sum();
    if data.len() < DATA_HEADER + size {
        return None;
    }

    let timestamp = u32::from_le_bytes([data[1], data[2], data[3], 0]);
    let mut offset = DATA_HEADER;
    let values = types
        .iter()
        .map(|log_type| {
            let value = log_type.decode(&data[offset..]);
            offset += log_type.size();
            value
        })
        .collect();
    Some(LogData { timestamp, values })
}

/// Relay a position stream into `recorder` until the link closes
pub async fn record_positions(positions: LogStream, recorder: TelemetryRecorder) -> Result<()> {
    loop {
        let data = match positions.next_data().await {
            Ok(data) => data,
            Err(Error::Disconnected) => {
                debug!("Position stream closed");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if let [x, y, z] = &data.values[..] {
            recorder.record(TelemetrySample {
                x: *x,
                y: *y,
                z: *z,
                timestamp: data.timestamp as u64,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::crtp_utils::toc_reply;

    const DATA_CHANNEL: u8 = 2;

    const POSITION_TOC: &[(&str, u8)] = &[
        ("stateEstimate.x", 7),
        ("stateEstimate.y", 7),
        ("stateEstimate.z", 7),
        ("pm.vbat", 7),
    ];

    struct Crazyflie {
        uplink: Sender<Packet>,
        downlink: Receiver<Packet>,
        commands: Receiver<Vec<u8>>,
        data: Sender<Packet>,
    }

    /// Answer TOC requests and accept every control command, recording them
    fn crazyflie(items: &'static [(&'static str, u8)]) -> Crazyflie {
        let (uplink, requests) = flume::unbounded::<Packet>();
        let (replies, downlink) = flume::unbounded();
        let (commands_tx, commands) = flume::unbounded();
        let data = replies.clone();
        tokio::spawn(async move {
            while let Ok(request) = requests.recv_async().await {
                let reply = match request.get_channel() {
                    CONTROL_CHANNEL => {
                        let data = request.get_data();
                        let _ = commands_tx.send(data.to_vec());
                        let mut reply = data[..data.len().min(2)].to_vec();
                        reply.resize(2, 0);
                        reply.push(0);
                        Some(Packet::new(request.get_port(), CONTROL_CHANNEL, reply))
                    }
                    _ => toc_reply(items, &request),
                };
                if let Some(reply) = reply {
                    let _ = replies.send(reply);
                }
            }
        });
        Crazyflie {
            uplink,
            downlink,
            commands,
            data,
        }
    }

    fn position_packet(block_id: u8, timestamp: u32, position: [f32; 3]) -> Packet {
        let mut data = vec![block_id];
        data.extend_from_slice(&timestamp.to_le_bytes()[..3]);
        for value in position.iter() {
            data.extend_from_slice(&value.to_le_bytes());
        }
        Packet::new(CrtpPort::Log.into(), DATA_CHANNEL, data)
    }

    #[tokio::test]
    async fn position_block_is_created_every_10ms() {
        let cf = crazyflie(POSITION_TOC);
        let log = LogReader::new(cf.uplink.clone(), cf.downlink.clone()).await.unwrap();
        let positions = log.start_position(POSITION_PERIOD).await.unwrap();

        let commands: Vec<Vec<u8>> = cf.commands.drain().collect();
        assert_eq!(commands[0], vec![RESET]);
        assert_eq!(
            commands[1],
            vec![CREATE_BLOCK_V2, 0, 0x77, 0, 0, 0x77, 1, 0, 0x77, 2, 0]
        );
        assert_eq!(commands[2], vec![START_BLOCK, 0, 1]);

        positions.stop().await.unwrap();
        assert_eq!(cf.commands.recv_async().await.unwrap(), vec![STOP_BLOCK, 0]);
    }

    #[tokio::test]
    async fn positions_reach_the_recorder() {
        let cf = crazyflie(POSITION_TOC);
        let log = LogReader::new(cf.uplink.clone(), cf.downlink.clone()).await.unwrap();
        let positions = log.start_position(POSITION_PERIOD).await.unwrap();
        let block_id = positions.block.id();

        let recorder = TelemetryRecorder::new();
        let mut feed = recorder.feed().subscribe();
        let relay = tokio::spawn(record_positions(positions, recorder.clone()));

        cf.data.send(position_packet(block_id, 0x01_0000, [0.1, -0.2, 0.5])).unwrap();
        // Another block and a truncated packet are skipped
        cf.data.send(position_packet(block_id + 1, 20, [9.0, 9.0, 9.0])).unwrap();
        cf.data
            .send(Packet::new(CrtpPort::Log.into(), DATA_CHANNEL, vec![block_id, 0, 0, 0, 1]))
            .unwrap();
        cf.data.send(position_packet(block_id, 0x01_000a, [0.2, -0.2, 0.5])).unwrap();

        let first = feed.recv().await.unwrap();
        assert_eq!(first, TelemetrySample { x: 0.1, y: -0.2, z: 0.5, timestamp: 65536 });
        assert_eq!(feed.recv().await.unwrap().timestamp, 65546);
        assert_eq!(recorder.trail_snapshot().len(), 2);

        relay.abort();
    }

    #[tokio::test]
    async fn unknown_variable_is_refused() {
        let cf = crazyflie(&[("pm.vbat", 7)]);
        let log = LogReader::new(cf.uplink.clone(), cf.downlink.clone()).await.unwrap();

        let result = log.start_position(POSITION_PERIOD).await;
        assert!(matches!(result, Err(Error::LogError(_))));
    }

    #[test]
    fn values_are_decoded_by_type() {
        let types = [LogType::U8, LogType::I16, LogType::F16, LogType::F32];
        let mut data = vec![0, 0x10, 0, 0, 200];
        data.extend_from_slice(&(-300i16).to_le_bytes());
        data.extend_from_slice(&half::f16::from_f32(1.5).to_le_bytes());
        data.extend_from_slice(&2.25f32.to_le_bytes());

        let decoded = decode(&types, &data).unwrap();
        assert_eq!(decoded.timestamp, 0x10);
        assert_eq!(decoded.values, vec![200.0, -300.0, 1.5, 2.25]);
        assert_eq!(decode(&types, &data[..8]), None);
    }
}
