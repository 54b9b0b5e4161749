//! Two single-producer/single-consumer packet queues (TX, RX), each
//! capacity 64, each slot up to 1500 bytes, plus a "connected" flag.

use utils::collections::RingBuffer;

pub const QUEUE_CAPACITY: usize = 64;
pub const MAX_PACKET_LEN: usize = 1500;

#[derive(Clone, Copy)]
pub struct Packet {
    len: u16,
    data: [u8; MAX_PACKET_LEN],
}

impl Packet {
    pub fn from_slice(bytes: &[u8]) -> Self {
        let len = bytes.len().min(MAX_PACKET_LEN);
        let mut data = [0u8; MAX_PACKET_LEN];
        data[..len].copy_from_slice(&bytes[..len]);
        Self { len: len as u16, data }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

pub struct Network {
    tx: RingBuffer<Packet, QUEUE_CAPACITY>,
    rx: RingBuffer<Packet, QUEUE_CAPACITY>,
    connected: bool,
}

impl Network {
    pub fn new() -> Self {
        Self {
            tx: RingBuffer::new(),
            rx: RingBuffer::new(),
            connected: false,
        }
    }

    pub fn reset(&mut self) {
        self.tx.clear();
        self.rx.clear();
        self.connected = false;
    }

    /// Enqueue `bytes` (truncated to [`MAX_PACKET_LEN`]) onto the TX queue.
    /// Returns `false` if the queue is full.
    pub fn send(&mut self, bytes: &[u8]) -> bool {
        self.tx.push(Packet::from_slice(bytes))
    }

    /// Dequeue the next outgoing packet, if any (consumed by the host side
    /// of the NIC, e.g. to actually transmit it).
    pub fn take_outgoing(&mut self) -> Option<Packet> {
        self.tx.pop()
    }

    /// Host delivers an incoming packet to the guest's RX queue. Returns
    /// `false` if the queue is full.
    pub fn deliver(&mut self, bytes: &[u8]) -> bool {
        self.rx.push(Packet::from_slice(bytes))
    }

    /// Dequeue the next incoming packet for the guest. `None` if empty.
    pub fn recv(&mut self) -> Option<Packet> {
        self.rx.pop()
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_take_outgoing() {
        let mut net = Network::new();
        assert!(net.send(b"hello"));
        let pkt = net.take_outgoing().unwrap();
        assert_eq!(pkt.as_slice(), b"hello");
    }

    #[test]
    fn tx_queue_full_reports_failure() {
        let mut net = Network::new();
        for _ in 0..QUEUE_CAPACITY {
            assert!(net.send(b"x"));
        }
        assert!(!net.send(b"x"));
    }

    #[test]
    fn recv_on_empty_rx_returns_none() {
        let mut net = Network::new();
        assert!(net.recv().is_none());
        net.deliver(b"ping");
        assert_eq!(net.recv().unwrap().as_slice(), b"ping");
    }

    #[test]
    fn packet_longer_than_max_is_truncated() {
        let big = [7u8; MAX_PACKET_LEN + 100];
        let pkt = Packet::from_slice(&big);
        assert_eq!(pkt.as_slice().len(), MAX_PACKET_LEN);
    }
}
