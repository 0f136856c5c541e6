//! CRTP helpers shared by the param and log readers

use std::collections::BTreeMap;

use async_trait::async_trait;
use crazyflie_link::Packet;
use flume::{Receiver, Sender};
use log::debug;

use crate::sink::crtp::CrtpPort;
use crate::{Error, Result};

#[async_trait]
pub(crate) trait WaitForPacket {
    /// Wait for a packet on `channel` whose data starts with `data_prefix`, dropping the others
    async fn wait_packet(&self, channel: u8, data_prefix: &[u8]) -> Result<Packet>;
}

#[async_trait]
impl WaitForPacket for Receiver<Packet> {
    async fn wait_packet(&self, channel: u8, data_prefix: &[u8]) -> Result<Packet> {
        loop {
            let pk = self.recv_async().await?;
            if pk.get_channel() == channel && pk.get_data().starts_with(data_prefix) {
                return Ok(pk);
            }
        }
    }
}

/// Split the downlink of a port into its four channels
pub(crate) fn channel_dispatcher(
    downlink: Receiver<Packet>,
) -> (Receiver<Packet>, Receiver<Packet>, Receiver<Packet>, Receiver<Packet>) {
    let (tx0, rx0) = flume::unbounded();
    let (tx1, rx1) = flume::unbounded();
    let (tx2, rx2) = flume::unbounded();
    let (tx3, rx3) = flume::unbounded();
    let senders = [tx0, tx1, tx2, tx3];

    tokio::spawn(async move {
        while let Ok(pk) = downlink.recv_async().await {
            if let Some(channel) = senders.get(pk.get_channel() as usize) {
                let _ = channel.send_async(pk).await;
            }
        }
    });

    (rx0, rx1, rx2, rx3)
}

const TOC_CHANNEL: u8 = 0;
const TOC_GET_ITEM: u8 = 2;
const TOC_INFO: u8 = 3;

/// Entry of a table of content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TocItem {
    pub(crate) id: u16,
    pub(crate) item_type: u8,
}

/// Download the table of content of `port`, keyed by "group.name"
pub(crate) async fn fetch_toc(
    port: CrtpPort,
    uplink: &Sender<Packet>,
    downlink: &Receiver<Packet>,
) -> Result<BTreeMap<String, TocItem>> {
    uplink
        .send_async(Packet::new(port.into(), TOC_CHANNEL, vec![TOC_INFO]))
        .await?;
    let pk = downlink.wait_packet(TOC_CHANNEL, &[TOC_INFO]).await?;
    let toc_len = match pk.get_data().as_slice() {
        [_, lo, hi, ..] => u16::from_le_bytes([*lo, *hi]),
        _ => return Err(Error::ProtocolError("TOC info too short".to_owned())),
    };

    let mut toc = BTreeMap::new();
    for i in 0..toc_len {
        let [lo, hi] = i.to_le_bytes();
        uplink
            .send_async(Packet::new(port.into(), TOC_CHANNEL, vec![TOC_GET_ITEM, lo, hi]))
            .await?;
        let pk = downlink.wait_packet(TOC_CHANNEL, &[TOC_GET_ITEM, lo, hi]).await?;
        let (name, item) = parse_toc_item(pk.get_data())?;
        toc.insert(name, item);
    }

    debug!("{:?} TOC downloaded, {} items", port, toc.len());
    Ok(toc)
}

fn parse_toc_item(data: &[u8]) -> Result<(String, TocItem)> {
    let malformed = || Error::ProtocolError("TOC item format error".to_owned());
    if data.len() < 4 {
        return Err(malformed());
    }

    let mut strings = data[4..].split(|b| *b == 0);
    let group = String::from_utf8_lossy(strings.next().ok_or_else(malformed)?);
    let name = String::from_utf8_lossy(strings.next().ok_or_else(malformed)?);

    let item = TocItem {
        id: u16::from_le_bytes([data[1], data[2]]),
        item_type: data[3],
    };
    Ok((format!("{}.{}", group, name), item))
}

/// Crazyflie side of the TOC exchange, for the reader tests
#[cfg(test)]
pub(crate) fn toc_reply(items: &[(&str, u8)], request: &Packet) -> Option<Packet> {
    let data = request.get_data();
    match data.as_slice() {
        [TOC_INFO] => {
            let [lo, hi] = (items.len() as u16).to_le_bytes();
            Some(Packet::new(request.get_port(), TOC_CHANNEL, vec![TOC_INFO, lo, hi, 0, 0, 0, 0]))
        }
        [TOC_GET_ITEM, lo, hi] => {
            let (name, item_type) = items.get(u16::from_le_bytes([*lo, *hi]) as usize)?;
            let mut reply = vec![TOC_GET_ITEM, *lo, *hi, *item_type];
            for part in name.split('.') {
                reply.extend_from_slice(part.as_bytes());
                reply.push(0);
            }
            Some(Packet::new(request.get_port(), TOC_CHANNEL, reply))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn toc_is_keyed_by_full_name() {
        let items = [("deck.bcFlow2", 0x08), ("stateEstimate.z", 0x07)];
        let (uplink, requests) = flume::unbounded::<Packet>();
        let (replies, downlink) = flume::unbounded();
        tokio::spawn(async move {
            while let Ok(request) = requests.recv_async().await {
                if let Some(reply) = toc_reply(&items, &request) {
                    let _ = replies.send(reply);
                }
            }
        });

        let toc = fetch_toc(CrtpPort::Param, &uplink, &downlink).await.unwrap();
        assert_eq!(toc.len(), 2);
        assert_eq!(toc["deck.bcFlow2"], TocItem { id: 0, item_type: 0x08 });
        assert_eq!(toc["stateEstimate.z"].id, 1);
    }

    #[test]
    fn truncated_item_is_an_error() {
        assert!(matches!(parse_toc_item(&[2, 0, 0]), Err(Error::ProtocolError(_))));
        assert!(matches!(parse_toc_item(&[2, 0, 0, 8, b'd']), Err(Error::ProtocolError(_))));
    }
}
