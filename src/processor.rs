//! Processor trait for service loops

use tracing::trace;

use crate::Result;
use crate::input::InputPort;
use crate::output::OutputPort;
use crate::types::SampleBuffer;

/// Outcome of one [`Processor::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// Work was done; call again immediately.
    Normal,
    /// Nothing to do; the driver waits before calling again.
    Noop,
    /// Processing is complete; the driver stops.
    Finish,
}

/// One step of a component's processing loop.
///
/// The [`Driver`](crate::Driver) calls `process` repeatedly until it
/// returns [`ProcessResult::Finish`], fails too often, or is cancelled.
#[async_trait::async_trait]
pub trait Processor: Send + 'static {
    async fn process(&mut self) -> Result<ProcessResult>;

    /// Called once after the loop ends, whatever the reason.
    async fn stopped(&mut self) {}
}

/// Forwards every packet of an input port to an output port.
///
/// SRI changes are pushed ahead of the packet that carries them.
#[derive(Debug)]
pub struct Passthrough<B> {
    input: InputPort<B>,
    output: OutputPort<B>,
    finish_on_eos: bool,
}

impl<B: SampleBuffer> Passthrough<B> {
    pub fn new(input: InputPort<B>, output: OutputPort<B>) -> Self {
        Self { input, output, finish_on_eos: false }
    }

    /// Finish after forwarding the first EOS.
    pub fn finish_on_eos(mut self, finish: bool) -> Self {
        self.finish_on_eos = finish;
        self
    }
}

#[async_trait::async_trait]
impl<B: SampleBuffer> Processor for Passthrough<B> {
    async fn process(&mut self) -> Result<ProcessResult> {
        let Some(packet) = self.input.get_packet(crate::Wait::NonBlocking) else {
            return Ok(ProcessResult::Noop);
        };
        trace!(port = %self.input.name(), stream_id = %packet.stream_id, elements = packet.len(), "Forwarding packet");
        if packet.sri_changed {
            self.output.push_sri(packet.sri.clone(), packet.time);
        }
        let eos = packet.eos;
        self.output.push_packet(packet.buffer, packet.time, eos, &packet.stream_id);
        if eos && self.finish_on_eos {
            Ok(ProcessResult::Finish)
        } else {
            Ok(ProcessResult::Normal)
        }
    }

    async fn stopped(&mut self) {
        self.input.block();
    }
}
