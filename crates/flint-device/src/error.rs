//! Device-side failure taxonomy.

/// Errors surfaced by the transport or the device during upload.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceError {
    /// The transport failed to carry a frame.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The device answered something the driver cannot parse.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The device refused an image with a mismatched data version.
    #[error("device expects data version {device}, image carries {image}")]
    VersionMismatch { device: u32, image: u32 },

    /// Upload requires a finalized set with a startup method.
    #[error("execution set has no startup method; finalize before upload")]
    NotFinalized,
}

pub type Result<T> = std::result::Result<T, DeviceError>;
