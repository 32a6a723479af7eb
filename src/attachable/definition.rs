//! Out-of-band stream definitions.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Describes where an out-of-band stream can be received.
pub trait StreamDefinition: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// Interface identifier of ports carrying this definition.
    const REPO_ID: &'static str;

    /// Stream ID, shared with the stream's SRI.
    fn id(&self) -> &str;
}

/// Sample format of an SDDS stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SddsDataFormat {
    /// Packed bits.
    Sp,
    /// Signed bytes.
    #[default]
    Sb,
    /// Signed 16-bit words.
    Si,
    /// Single precision floats.
    Sf,
    /// Complex packed bits.
    Cp,
    /// Complex signed bytes.
    Cb,
    /// Complex 16-bit words.
    Ci,
    /// Complex single precision floats.
    Cf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SddsStreamDefinition {
    pub id: String,
    pub data_format: SddsDataFormat,
    pub multicast_address: String,
    pub vlan: u32,
    pub port: u16,
    pub sample_rate: u64,
    pub time_tag_valid: bool,
    #[serde(default)]
    pub private_info: String,
}

impl StreamDefinition for SddsStreamDefinition {
    const REPO_ID: &'static str = "IDL:BULKIO/dataSDDS:1.0";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vita49Transport {
    #[default]
    Udp,
    Tcp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vita49Complexity {
    #[default]
    Real,
    ComplexCartesian,
    ComplexPolar,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vita49ItemFormat {
    #[default]
    SignedFixedPoint,
    UnsignedFixedPoint,
    IeeeSingle,
    IeeeDouble,
}

/// Payload format advertised for a VITA 49 stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vita49DataFormat {
    pub packing_method_processing_efficient: bool,
    pub complexity: Vita49Complexity,
    pub data_item_format: Vita49ItemFormat,
    pub repeating: bool,
    pub event_tag_size: u8,
    pub channel_tag_size: u8,
    pub item_packing_field_size: u8,
    pub data_item_size: u8,
    pub repeat_count: u16,
    pub vector_size: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vita49StreamDefinition {
    pub id: String,
    pub ip_address: String,
    pub vlan: u32,
    pub port: u16,
    pub protocol: Vita49Transport,
    pub valid_data_format: bool,
    #[serde(default)]
    pub data_format: Vita49DataFormat,
}

impl StreamDefinition for Vita49StreamDefinition {
    const REPO_ID: &'static str = "IDL:BULKIO/dataVITA49:1.0";

    fn id(&self) -> &str {
        &self.id
    }
}
