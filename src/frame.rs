//! Minimal MAVLink frame representation.
//!
//! Only the header fields needed for filtering are decoded; the payload is
//! carried as the original bytes so the forwarder can relay them verbatim.

const MAVLINK_V1_MAGIC: u8 = 0xFE;
const MAVLINK_V2_MAGIC: u8 = 0xFD;

/// One decoded telemetry frame: sender identity plus the unmodified wire bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Source system id declared in the frame header.
    pub system_id: u8,
    /// Message id from the header, when the header carries one.
    pub message_id: Option<u32>,
    /// The complete datagram as received, untouched.
    pub bytes: Vec<u8>,
}

impl Frame {
    /// Peek at a MAVLink v1/v2 header and extract the source system id.
    ///
    /// Returns `None` for anything that does not start with a known magic
    /// byte or is too short to carry a header. No checksum validation is
    /// performed; that is the downstream parser's job.
    pub fn parse(data: &[u8]) -> Option<Self> {
        match data.first()? {
            &MAVLINK_V2_MAGIC if data.len() >= 10 => Some(Self {
                system_id: data[5],
                message_id: Some(u32::from_le_bytes([data[7], data[8], data[9], 0])),
                bytes: data.to_vec(),
            }),
            &MAVLINK_V1_MAGIC if data.len() >= 6 => Some(Self {
                system_id: data[3],
                message_id: Some(data[5] as u32),
                bytes: data.to_vec(),
            }),
            _ => None,
        }
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
