//! The blocking transport seam.
//!
//! The wire protocol itself lives outside this crate; the driver only
//! needs to hand over framed payloads and read back the persisted image
//! header. Every send blocks until the device acknowledges.

use flint_image::{Command, ImageHeader};

use crate::error::Result;

/// One transport frame, payloads already encoded.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Frame {
    /// Class declaration payload.
    Class(Vec<u8>),
    /// Ordered special-type token list.
    SpecialTypes(Vec<u8>),
    /// Constant blob: token then bytes.
    Constant(Vec<u8>),
    /// String blob: token then encoded characters.
    StringBlob(Vec<u8>),
    /// Pre-allocation hint preceding the blob phases.
    PoolSizes { constants: u32, strings: u32 },
    /// Method declaration payload (locals and arguments included).
    MethodDecl(Vec<u8>),
    /// Method bytecode: token then rewritten body.
    MethodBody(Vec<u8>),
    /// Image header, written last.
    Header(Vec<u8>),
    /// Lifecycle command.
    Command(Command),
}

impl Frame {
    /// Payload bytes as hashed for kernel identity.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Frame::Class(b)
            | Frame::SpecialTypes(b)
            | Frame::Constant(b)
            | Frame::StringBlob(b)
            | Frame::MethodDecl(b)
            | Frame::MethodBody(b)
            | Frame::Header(b) => b.clone(),
            Frame::PoolSizes { constants, strings } => {
                let mut out = Vec::with_capacity(8);
                out.extend_from_slice(&constants.to_le_bytes());
                out.extend_from_slice(&strings.to_le_bytes());
                out
            }
            Frame::Command(cmd) => cmd.to_bytes(),
        }
    }
}

/// Blocking frame transport to one device.
pub trait Transport {
    /// Send one frame; returns when the device has acknowledged it.
    fn send(&mut self, frame: Frame) -> Result<()>;

    /// Read the image header persisted on the device, if any.
    fn read_header(&mut self) -> Result<Option<ImageHeader>>;
}

/// Transport that records every frame, for tests and dry runs.
#[derive(Default, Debug)]
pub struct RecordingTransport {
    pub frames: Vec<Frame>,
    pub persisted_header: Option<ImageHeader>,
    /// Fail after this many sends, if set.
    pub fail_after: Option<usize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of frames matching a predicate.
    pub fn count(&self, pred: impl Fn(&Frame) -> bool) -> usize {
        self.frames.iter().filter(|f| pred(f)).count()
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, frame: Frame) -> Result<()> {
        if let Some(limit) = self.fail_after {
            if self.frames.len() >= limit {
                return Err(crate::error::DeviceError::Transport(
                    "device stopped responding".into(),
                ));
            }
        }
        // Persist the header the way the device would.
        if let Frame::Header(bytes) = &frame {
            self.persisted_header = ImageHeader::from_bytes(bytes);
        }
        self.frames.push(frame);
        Ok(())
    }

    fn read_header(&mut self) -> Result<Option<ImageHeader>> {
        Ok(self.persisted_header)
    }
}
