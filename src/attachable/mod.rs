//! Attach/detach ports for out-of-band streams such as SDDS and VITA 49.
//!
//! Instead of carrying samples, these ports hand stream definitions (a
//! multicast group and format, say) to their peers, which then receive the
//! data themselves. SRI caching and connection filtering work as on the
//! data ports.
//!
//! The two sides report usage differently: an input port is busy with one
//! attachment and active with more, while an output port is active as soon
//! as anything is attached.

mod definition;
mod input;
mod output;
mod peer;

pub use definition::{
    SddsDataFormat, SddsStreamDefinition, StreamDefinition, Vita49Complexity, Vita49DataFormat,
    Vita49ItemFormat, Vita49StreamDefinition, Vita49Transport,
};
pub use input::{AttachListener, DetachListener, InAttachablePort};
pub use output::OutAttachablePort;
pub use peer::AttachablePeer;

pub type InSddsPort = InAttachablePort<SddsStreamDefinition>;
pub type OutSddsPort = OutAttachablePort<SddsStreamDefinition>;
pub type InVita49Port = InAttachablePort<Vita49StreamDefinition>;
pub type OutVita49Port = OutAttachablePort<Vita49StreamDefinition>;
