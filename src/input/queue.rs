//! Queue state guarded by an input port's monitor.
//!
//! Each logical stream is tracked as a generation: a stream ID reused after
//! its EOS was queued starts a new generation, so packets of the old and new
//! stream never mix in a cursor. Packets pulled by a cursor move from the
//! shared queue into the generation's held list, leaving other streams'
//! packets queued in order.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::warn;

use super::block::{DataBlock, SampleTimestamp, elements_per_sample};
use crate::config::QueueDepth;
use crate::types::{DataPacket, SampleBuffer, SriChangeFlags, StreamSri};

pub(super) struct Queued<B> {
    pub generation: u64,
    pub packet: DataPacket<B>,
}

struct Held<B> {
    packet: DataPacket<B>,
    /// Elements already consumed from the front of the payload.
    offset: usize,
}

impl<B: SampleBuffer> Held<B> {
    fn remaining(&self) -> usize {
        self.packet.len().saturating_sub(self.offset)
    }
}

pub(super) struct Generation<B> {
    pub stream_id: String,
    /// Latest SRI pushed for this stream.
    pub sri: StreamSri,
    /// Change flags waiting for the next packet; `Some` means changed.
    pub pending: Option<SriChangeFlags>,
    pub eos_queued: bool,
    pub enabled: bool,
    held: VecDeque<Held<B>>,
    /// Flags of empty packets dropped from the held list.
    carried: Option<SriChangeFlags>,
    carried_flush: bool,
}

/// Outcome of one cursor read attempt.
pub(super) enum Fetch<B> {
    Block { block: DataBlock<B>, eos: bool },
    /// The stream ended with no data left to read.
    Eos,
    /// Not enough data queued yet.
    Pending,
    /// The stream is gone or disabled.
    Gone,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct Request {
    /// Samples wanted; `None` reads the rest of the front packet.
    pub count: Option<usize>,
    /// Samples to consume; `None` consumes everything read.
    pub consume: Option<usize>,
    /// Wait for `count` samples unless a boundary ends the read first.
    pub require_full: bool,
}

struct Span {
    samples: usize,
    /// An SRI change or EOS limits the readable run.
    boundary: bool,
}

fn span<B: SampleBuffer>(held: &VecDeque<Held<B>>) -> Span {
    let Some(front) = held.front() else {
        return Span { samples: 0, boundary: false };
    };
    let per_sample = elements_per_sample(&front.packet.sri);
    let mut elements = 0;
    for (index, entry) in held.iter().enumerate() {
        if index > 0 && entry.packet.sri_changed {
            return Span { samples: elements / per_sample, boundary: true };
        }
        elements += entry.remaining();
        if entry.packet.eos {
            return Span { samples: elements / per_sample, boundary: true };
        }
    }
    Span { samples: elements / per_sample, boundary: false }
}

impl<B: SampleBuffer> Generation<B> {
    /// Drops exhausted non-EOS packets at the front, keeping their flags.
    fn drop_empty_front(&mut self) {
        while let Some(front) = self.held.front() {
            if front.packet.eos || front.remaining() > 0 {
                break;
            }
            if let Some(entry) = self.held.pop_front() {
                if entry.packet.sri_changed {
                    let flags = self.carried.unwrap_or_default();
                    self.carried = Some(flags | entry.packet.sri_change_flags);
                }
                self.carried_flush |= entry.packet.input_queue_flushed;
            }
        }
    }

    /// Discards held elements up to the next boundary; returns how many.
    fn discard_to_boundary(&mut self) -> usize {
        let mut discarded = 0;
        for (index, held) in self.held.iter_mut().enumerate() {
            if index > 0 && held.packet.sri_changed {
                break;
            }
            discarded += held.remaining();
            held.offset = held.packet.len();
            if held.packet.eos {
                break;
            }
        }
        self.drop_empty_front();
        discarded
    }
}

pub(super) struct QueueState<B> {
    pub packets: VecDeque<Queued<B>>,
    pub max_depth: QueueDepth,
    /// Stream ID to the generation currently accepting pushes.
    pub streams: HashMap<String, u64>,
    pub generations: BTreeMap<u64, Generation<B>>,
    next_generation: u64,
    pub blocked: bool,
}

impl<B: SampleBuffer> QueueState<B> {
    pub fn new(max_depth: QueueDepth) -> Self {
        Self {
            packets: VecDeque::new(),
            max_depth,
            streams: HashMap::new(),
            generations: BTreeMap::new(),
            next_generation: 0,
            blocked: false,
        }
    }

    fn allocate_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    /// Registers a new stream generation whose first packet reports every field changed.
    pub fn open(&mut self, sri: StreamSri) -> u64 {
        let generation = self.allocate_generation();
        self.streams.insert(sri.stream_id.clone(), generation);
        self.generations.insert(
            generation,
            Generation {
                stream_id: sri.stream_id.clone(),
                sri,
                pending: Some(SriChangeFlags::ALL),
                eos_queued: false,
                enabled: true,
                held: VecDeque::new(),
                carried: None,
                carried_flush: false,
            },
        );
        generation
    }

    /// Generation ID for a packet whose stream is never registered.
    pub fn orphan(&mut self) -> u64 {
        self.allocate_generation()
    }

    /// Latest generation of `stream_id`, including one whose EOS is queued.
    pub fn latest(&self, stream_id: &str) -> Option<u64> {
        self.streams.get(stream_id).copied()
    }

    /// Oldest generation of `stream_id` still readable.
    pub fn oldest(&self, stream_id: &str) -> Option<u64> {
        self.generations
            .iter()
            .find(|(_, generation)| generation.stream_id == stream_id)
            .map(|(id, _)| *id)
    }

    pub fn blocking_active(&self) -> bool {
        self.generations.values().any(|generation| generation.sri.blocking && !generation.eos_queued)
    }

    pub fn is_full(&self) -> bool {
        self.max_depth.is_full(self.packets.len())
    }

    /// Drops queued data packets, keeping EOS packets with empty payloads.
    ///
    /// SRI changes carried by dropped packets move onto the stream's next
    /// EOS packet or, failing that, onto the stream's next push.
    pub fn flush(&mut self) -> usize {
        let mut lost: HashMap<u64, SriChangeFlags> = HashMap::new();
        let mut kept = VecDeque::new();
        let mut dropped = 0;
        for mut queued in self.packets.drain(..) {
            if queued.packet.eos {
                if let Some(flags) = lost.remove(&queued.generation) {
                    queued.packet.sri_changed = true;
                    queued.packet.sri_change_flags |= flags;
                }
                queued.packet.buffer = B::default();
                queued.packet.input_queue_flushed = true;
                kept.push_back(queued);
            } else {
                if queued.packet.sri_changed {
                    *lost.entry(queued.generation).or_default() |= queued.packet.sri_change_flags;
                }
                dropped += 1;
            }
        }
        for (generation, flags) in lost {
            if let Some(entry) = self.generations.get_mut(&generation) {
                entry.pending = Some(entry.pending.unwrap_or_default() | flags);
            }
        }
        self.packets = kept;
        dropped
    }

    /// Forgets a generation once its EOS has been consumed.
    pub fn retire(&mut self, generation: u64) {
        if let Some(entry) = self.generations.remove(&generation) {
            if self.streams.get(&entry.stream_id) == Some(&generation) {
                self.streams.remove(&entry.stream_id);
            }
        }
    }

    pub fn pop_front(&mut self) -> Option<DataPacket<B>> {
        let queued = self.packets.pop_front()?;
        if queued.packet.eos {
            self.retire(queued.generation);
        }
        Some(queued.packet)
    }

    /// Generation of the stream the next read should come from.
    pub fn current_generation(&mut self) -> Option<u64> {
        if let Some((id, _)) = self
            .generations
            .iter()
            .find(|(_, generation)| generation.enabled && !generation.held.is_empty())
        {
            return Some(*id);
        }
        while let Some(front) = self.packets.front() {
            if self.generations.contains_key(&front.generation) {
                return Some(front.generation);
            }
            // EOS for a stream that was never registered
            self.packets.pop_front();
        }
        None
    }

    pub fn disable(&mut self, generation: u64) {
        if let Some(entry) = self.generations.get_mut(&generation) {
            entry.enabled = false;
            entry.held.clear();
            entry.carried = None;
            entry.carried_flush = false;
        }
        self.packets.retain(|queued| queued.generation != generation);
    }

    pub fn has_buffered(&self, generation: u64) -> bool {
        self.generations.get(&generation).is_some_and(|entry| !entry.held.is_empty())
            || self.packets.iter().any(|queued| queued.generation == generation)
    }

    /// Moves this generation's queued packets into its held list until
    /// `want` samples or a boundary are held.
    fn pull(&mut self, generation: u64, want: Option<usize>) {
        let Some(entry) = self.generations.get_mut(&generation) else {
            return;
        };
        loop {
            entry.drop_empty_front();
            let held = span(&entry.held);
            let enough = match want {
                Some(count) => held.samples >= count,
                None => held.samples > 0,
            };
            if held.boundary || enough {
                break;
            }
            let Some(position) = self.packets.iter().position(|q| q.generation == generation) else {
                break;
            };
            if let Some(queued) = self.packets.remove(position) {
                entry.held.push_back(Held { packet: queued.packet, offset: 0 });
            }
        }
    }

    /// Samples readable without waiting, up to the next boundary.
    pub fn available(&mut self, generation: u64) -> Option<usize> {
        self.pull(generation, Some(usize::MAX));
        let entry = self.generations.get(&generation).filter(|entry| entry.enabled)?;
        Some(span(&entry.held).samples)
    }

    pub fn fetch(&mut self, generation: u64, request: Request) -> Fetch<B> {
        match self.generations.get(&generation) {
            Some(entry) if entry.enabled => {}
            _ => return Fetch::Gone,
        }
        self.pull(generation, request.count);

        let Some(entry) = self.generations.get_mut(&generation) else {
            return Fetch::Gone;
        };
        entry.drop_empty_front();
        let Some(front) = entry.held.front() else {
            return Fetch::Pending;
        };
        if front.packet.eos && front.remaining() == 0 {
            self.retire(generation);
            return Fetch::Eos;
        }

        let available = span(&entry.held);
        let per_sample = elements_per_sample(&front.packet.sri);
        let want = request.count.unwrap_or_else(|| (front.remaining() / per_sample).max(1));
        if available.samples < want && !available.boundary && request.require_full {
            return Fetch::Pending;
        }
        let take = want.min(available.samples);
        if take == 0 && want > 0 {
            if !available.boundary {
                return Fetch::Pending;
            }
            // a partial sample ahead of an SRI change or EOS never completes
            let discarded = entry.discard_to_boundary();
            warn!(stream_id = %entry.stream_id, discarded, "Dropping incomplete sample");
            return self.fetch(generation, request);
        }

        let sri = front.packet.sri.clone();
        let sri_changed = front.packet.sri_changed || entry.carried.is_some();
        let mut flags = front.packet.sri_change_flags | entry.carried.unwrap_or_default();
        let mut flushed = front.packet.input_queue_flushed || entry.carried_flush;
        if !sri_changed {
            flags = SriChangeFlags::NONE;
        }

        let mut buffer = B::default();
        let mut timestamps = Vec::new();
        let mut remaining = take * per_sample;
        let mut block_samples = 0;
        let mut touched = 0;
        for (index, held) in entry.held.iter().enumerate() {
            if remaining == 0 || (index > 0 && held.packet.sri_changed) {
                break;
            }
            touched = index + 1;
            let count = held.remaining().min(remaining);
            if count > 0 {
                timestamps.push(SampleTimestamp {
                    time: held.packet.time + (held.offset / per_sample) as f64 * sri.xdelta,
                    offset: block_samples,
                    synthetic: held.offset > 0,
                });
                buffer.append(&held.packet.buffer.slice(held.offset..held.offset + count));
                block_samples += count / per_sample;
                remaining -= count;
            }
            if index > 0 {
                flushed |= held.packet.input_queue_flushed;
            }
            if held.packet.eos {
                break;
            }
        }

        for held in entry.held.iter_mut().take(touched.max(1)) {
            held.packet.sri_changed = false;
            held.packet.sri_change_flags = SriChangeFlags::NONE;
            held.packet.input_queue_flushed = false;
        }
        entry.carried = None;
        entry.carried_flush = false;

        let mut to_consume = request.consume.unwrap_or(take).min(take) * per_sample;
        let mut reached_eos = false;
        while let Some(front) = entry.held.front_mut() {
            let left = front.remaining();
            if to_consume < left {
                front.offset += to_consume;
                break;
            }
            to_consume -= left;
            let eos = front.packet.eos;
            entry.held.pop_front();
            if eos {
                reached_eos = true;
                break;
            }
            if to_consume == 0 {
                break;
            }
        }
        // an empty EOS right behind a fully consumed read ends the stream now
        let consumed_all = request.consume.is_none_or(|consume| consume >= take);
        if !reached_eos && consumed_all {
            if let Some(front) = entry.held.front().filter(|front| front.packet.eos && front.remaining() == 0) {
                reached_eos = front.packet.eos;
                entry.held.pop_front();
            }
        }
        if reached_eos {
            self.retire(generation);
        }

        Fetch::Block {
            block: DataBlock {
                sri,
                buffer,
                timestamps,
                sri_changed,
                sri_change_flags: flags,
                input_queue_flushed: flushed,
            },
            eos: reached_eos,
        }
    }
}
