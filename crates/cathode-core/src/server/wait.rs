use super::protocol::IoPacket;

/// Requests the engine could not complete, retained for retry.
///
/// The queue never blocks anything: a packet is pushed when dispatch
/// reports reply-pending, and the owner re-dispatches the drained packets
/// whenever the input state changes (new bytes, disconnect, or a timeout
/// of its choosing).
#[derive(Debug, Default)]
pub struct ReplyPendingQueue {
    entries: Vec<IoPacket>,
}

impl ReplyPendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: IoPacket) {
        self.entries.push(packet);
    }

    /// Remove every retained packet for a retry round. Packets that pend
    /// again are simply pushed back.
    pub fn drain(&mut self) -> Vec<IoPacket> {
        std::mem::take(&mut self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::protocol::IoFunction;

    #[test]
    fn test_drain_empties_queue() {
        let mut queue = ReplyPendingQueue::new();
        queue.push(IoPacket::new(1, IoFunction::RawRead));
        queue.push(IoPacket::new(2, IoFunction::UserDefined));
        assert_eq!(queue.len(), 2);
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }
}
