//! Reordering and deduplication of incoming RTP packets.

use super::Packet;

/// Number of slots in the reorder window. A power of two, so ring
/// positions reduce to a bitwise mask.
const BUFFER_SIZE: u16 = 64;

/// Forward-wrap distance beyond which a packet is taken to be a duplicate
/// or a late arrival from before the window began, rather than a packet
/// far ahead of it. A heuristic, tuned against the behavior of common IP
/// cameras; keep in sync with their observed wire behavior.
const PRE_WINDOW_THRESHOLD: u16 = 0x0FFF;

/// Sorts incoming RTP packets into sequence-number order and discards
/// duplicates, buffering up to [`BUFFER_SIZE`] packets while waiting for
/// the missing ones.
///
/// `process` never fails: packets that overrun the window cause a flush
/// rather than an error, and callers can detect the resulting gaps by
/// inspecting the sequence numbers of what's returned. A `Reorderer` owns
/// the packets it has buffered and hands them back exactly once.
///
/// Not internally synchronized; callers invoke `process` from one place
/// at a time.
pub struct Reorderer {
    initialized: bool,
    expected_seq_num: u16,

    /// Ring of pending packets; `abs_pos` is the slot at which a packet
    /// with sequence number `expected_seq_num` belongs.
    buffer: Vec<Option<Packet>>,
    abs_pos: u16,
}

impl Reorderer {
    pub fn new() -> Self {
        Reorderer {
            initialized: false,
            expected_seq_num: 0,
            buffer: vec![None; usize::from(BUFFER_SIZE)],
            abs_pos: 0,
        }
    }

    /// Processes one packet, returning all packets which are now in order.
    pub fn process(&mut self, pkt: Packet) -> Vec<Packet> {
        if !self.initialized {
            self.initialized = true;
            self.expected_seq_num = pkt.sequence_number.wrapping_add(1);
            return vec![pkt];
        }

        let rel_pos = pkt.sequence_number.wrapping_sub(self.expected_seq_num);

        // Duplicate of an already-emitted packet, or sent before the first
        // packet this reorderer saw. Discard.
        if rel_pos > PRE_WINDOW_THRESHOLD {
            return Vec::new();
        }

        // Too far ahead for the window to hold. Flush everything buffered,
        // in ring order, then the new packet.
        if rel_pos >= BUFFER_SIZE {
            let mut ret = Vec::with_capacity(usize::from(BUFFER_SIZE) + 1);
            for i in 0..BUFFER_SIZE {
                let p = usize::from((self.abs_pos + i) & (BUFFER_SIZE - 1));
                if let Some(buffered) = self.buffer[p].take() {
                    ret.push(buffered);
                }
            }
            self.expected_seq_num = pkt.sequence_number.wrapping_add(1);
            ret.push(pkt);
            return ret;
        }

        // A predecessor is still missing; hold this packet in its slot.
        if rel_pos != 0 {
            let p = usize::from((self.abs_pos + rel_pos) & (BUFFER_SIZE - 1));
            if self.buffer[p].is_some() {
                // Duplicate of a packet already waiting in the window.
                return Vec::new();
            }
            self.buffer[p] = Some(pkt);
            return Vec::new();
        }

        // Exactly the expected packet: emit it plus the run of consecutive
        // packets already buffered behind it.
        let seq = pkt.sequence_number;
        let mut ret = vec![pkt];
        self.abs_pos = (self.abs_pos + 1) & (BUFFER_SIZE - 1);
        while let Some(buffered) = self.buffer[usize::from(self.abs_pos)].take() {
            ret.push(buffered);
            self.abs_pos = (self.abs_pos + 1) & (BUFFER_SIZE - 1);
        }
        self.expected_seq_num = seq.wrapping_add(ret.len() as u16);
        ret
    }
}

impl Default for Reorderer {
    fn default() -> Self {
        Reorderer::new()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::super::Packet;
    use super::Reorderer;

    fn pkt(sequence_number: u16) -> Packet {
        Packet {
            sequence_number,
            timestamp: 0,
            ssrc: 0,
            mark: false,
            payload: Bytes::new(),
        }
    }

    fn seqs(pkts: Vec<Packet>) -> Vec<u16> {
        pkts.iter().map(|p| p.sequence_number).collect()
    }

    #[test]
    fn in_order() {
        let mut r = Reorderer::new();
        assert_eq!(seqs(r.process(pkt(10))), [10]);
        assert_eq!(seqs(r.process(pkt(11))), [11]);
        assert_eq!(seqs(r.process(pkt(12))), [12]);
    }

    #[test]
    fn out_of_order() {
        let mut r = Reorderer::new();
        assert_eq!(seqs(r.process(pkt(10))), [10]);
        assert_eq!(seqs(r.process(pkt(11))), [11]);
        assert_eq!(seqs(r.process(pkt(13))), []);
        assert_eq!(seqs(r.process(pkt(12))), [12, 13]);
        assert_eq!(seqs(r.process(pkt(14))), [14]);
    }

    #[test]
    fn duplicate_already_emitted() {
        let mut r = Reorderer::new();
        assert_eq!(seqs(r.process(pkt(10))), [10]);
        assert_eq!(seqs(r.process(pkt(11))), [11]);
        assert_eq!(seqs(r.process(pkt(10))), []);
    }

    #[test]
    fn duplicate_in_window() {
        let mut r = Reorderer::new();
        assert_eq!(seqs(r.process(pkt(10))), [10]);
        assert_eq!(seqs(r.process(pkt(13))), []);
        assert_eq!(seqs(r.process(pkt(13))), []);
        assert_eq!(seqs(r.process(pkt(11))), [11]);
        assert_eq!(seqs(r.process(pkt(12))), [12, 13]);
    }

    #[test]
    fn flush_on_overflow() {
        let mut r = Reorderer::new();
        assert_eq!(seqs(r.process(pkt(0))), [0]);
        assert_eq!(seqs(r.process(pkt(100))), [100]);
        assert_eq!(seqs(r.process(pkt(101))), [101]);
    }

    #[test]
    fn flush_emits_window_contents_first() {
        let mut r = Reorderer::new();
        assert_eq!(seqs(r.process(pkt(10))), [10]);
        assert_eq!(seqs(r.process(pkt(12))), []);
        assert_eq!(seqs(r.process(pkt(13))), []);

        // 11 is still missing when 75 lands 64 slots past it.
        assert_eq!(seqs(r.process(pkt(75))), [12, 13, 75]);
        assert_eq!(seqs(r.process(pkt(76))), [76]);
    }

    #[test]
    fn sequence_number_wraparound() {
        let mut r = Reorderer::new();
        assert_eq!(seqs(r.process(pkt(65534))), [65534]);
        assert_eq!(seqs(r.process(pkt(65535))), [65535]);
        assert_eq!(seqs(r.process(pkt(1))), []);
        assert_eq!(seqs(r.process(pkt(0))), [0, 1]);
        assert_eq!(seqs(r.process(pkt(2))), [2]);
    }

    #[test]
    fn conservation() {
        // Everything fed in after the first packet comes back out exactly
        // once, duplicates aside.
        let mut r = Reorderer::new();
        let mut emitted = Vec::new();
        for &seq in &[0u16, 2, 1, 1, 4, 3, 5] {
            emitted.extend(seqs(r.process(pkt(seq))));
        }
        assert_eq!(emitted, [0, 1, 2, 3, 4, 5]);
    }
}
