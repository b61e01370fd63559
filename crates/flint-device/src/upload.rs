//! Phase-ordered image upload.
//!
//! Streams a finalized execution set to the device: classes, the
//! special-type list, constant blobs, string blobs, method declarations,
//! method bytecode, then the image header. Every phase filters by snapshot
//! delta, so a program compiled on top of a matching on-device kernel only
//! ships what the kernel does not already hold.

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use flint_compiler::{ExecutionSet, Snapshot};
use flint_image::{
    startup_flags, ClassDecl, Command, ImageHeader, MethodDecl, Token, TokenKind, DATA_VERSION,
    KERNEL_HASH_LEN,
};

use crate::error::{DeviceError, Result};
use crate::transport::{Frame, Transport};

/// Flash-commit cadence: one flush per this many frames.
const FLUSH_INTERVAL: usize = 100;

/// Upload behavior knobs, mirroring the compile settings.
#[derive(Clone, Copy, Default, Debug)]
pub struct UploadOptions {
    /// Issue periodic flush-to-flash commits so device RAM does not fill
    /// before the image completes.
    pub flash_copy: bool,
    /// Header flag: launch the program from flash at boot.
    pub launch_from_flash: bool,
    /// Header flag: restart the program after an abort.
    pub auto_restart: bool,
}

/// What an upload did.
#[derive(Clone, Copy, Debug)]
pub struct UploadReport {
    pub frames_sent: usize,
    /// The on-device kernel matched by content hash and was kept.
    pub kernel_reused: bool,
}

/// Content hash identifying a kernel prefix. All-zero when the set has no
/// kernel snapshot.
pub fn kernel_hash(set: &ExecutionSet) -> [u8; KERNEL_HASH_LEN] {
    let Some(kernel) = set.kernel() else {
        return [0; KERNEL_HASH_LEN];
    };
    let mut hasher = Sha256::new();
    for (_, frame) in collect_frames(set, |t| kernel.contains(t)) {
        hasher.update(frame.payload());
    }
    hasher.finalize().into()
}

/// Streams execution sets over one transport.
pub struct UploadDriver<'t, T: Transport> {
    transport: &'t mut T,
}

impl<'t, T: Transport> UploadDriver<'t, T> {
    pub fn new(transport: &'t mut T) -> Self {
        Self { transport }
    }

    /// Upload `set`. On any device failure the engine is reset so no
    /// partial image is left behind, and the error propagates.
    pub fn upload(&mut self, set: &ExecutionSet, options: UploadOptions) -> Result<UploadReport> {
        match self.try_upload(set, options) {
            Ok(report) => Ok(report),
            Err(err) => {
                warn!(error = %err, "upload failed; resetting engine");
                let _ = self.transport.send(Frame::Command(Command::ResetEngine));
                Err(err)
            }
        }
    }

    fn try_upload(&mut self, set: &ExecutionSet, options: UploadOptions) -> Result<UploadReport> {
        let startup = set.startup_token().ok_or(DeviceError::NotFinalized)?;
        let hash = kernel_hash(set);

        let kernel_reused = match (set.kernel(), self.transport.read_header()?) {
            (Some(_), Some(header)) => {
                header.data_version == DATA_VERSION && header.kernel_hash == hash
            }
            _ => false,
        };

        let source: Option<&Snapshot> = if kernel_reused { set.kernel() } else { None };
        if kernel_reused {
            info!("on-device kernel matches; sending user delta only");
        } else {
            self.transport.send(Frame::Command(Command::ResetEngine))?;
            self.transport.send(Frame::Command(Command::ClearFlash))?;
        }

        // Kernel types become immutable once flashed.
        let mark_kernel_types = !kernel_reused && set.kernel().is_some();

        let mut sent = 0usize;
        let frames = collect_frames(set, |t| source.map_or(true, |s| !s.contains(t)));
        for (token, frame) in frames {
            self.transport.send(frame)?;
            sent += 1;
            if options.flash_copy && sent % FLUSH_INTERVAL == 0 {
                self.transport.send(Frame::Command(Command::CopyToFlash))?;
            }
            if mark_kernel_types {
                if let Some(token) = token {
                    if token.kind() == TokenKind::Type
                        && set.kernel().is_some_and(|k| k.contains(token))
                    {
                        self.transport
                            .send(Frame::Command(Command::MarkReadOnly(token)))?;
                    }
                }
            }
        }

        let mut flags = 0u32;
        if options.launch_from_flash {
            flags |= startup_flags::LAUNCH_FROM_FLASH;
        }
        if options.auto_restart {
            flags |= startup_flags::AUTO_RESTART;
        }
        let header = ImageHeader {
            data_version: DATA_VERSION,
            kernel_hash: hash,
            startup_token: startup,
            startup_flags: flags,
        };
        self.transport.send(Frame::Header(header.to_bytes().to_vec()))?;
        sent += 1;

        debug!(frames = sent, kernel_reused, "upload complete");
        Ok(UploadReport {
            frames_sent: sent,
            kernel_reused,
        })
    }
}

/// Build every frame of the image in phase order, keeping the owning token
/// beside each frame for delta filtering and read-only marking.
fn collect_frames(
    set: &ExecutionSet,
    include: impl Fn(Token) -> bool,
) -> Vec<(Option<Token>, Frame)> {
    let mut frames: Vec<(Option<Token>, Frame)> = Vec::new();

    // Phase 1: class declarations in token order.
    for ty in set.types_by_token() {
        if !include(ty.token) {
            continue;
        }
        let decl = ClassDecl {
            token: ty.token,
            parent: ty.parent,
            instance_size: ty.instance_size,
            static_size: ty.static_size,
            flags: ty.flags,
            members: ty.members.clone(),
            interfaces: ty.interfaces.clone(),
        };
        frames.push((Some(ty.token), Frame::Class(decl.to_bytes())));
    }

    // Phase 2: special-type list, only when the delta introduces one.
    let specials = set.special_types();
    if specials.iter().any(|&t| include(t)) {
        let list = flint_image::SpecialTypeList {
            tokens: specials.to_vec(),
        };
        frames.push((None, Frame::SpecialTypes(list.to_bytes())));
    }

    // Phase 3 payload sums feed the phase 4 pre-allocation hint.
    let mut constant_bytes = 0u32;
    let mut constant_frames = Vec::new();
    for (token, bytes) in set.allocator().blobs() {
        if !include(token) {
            continue;
        }
        constant_bytes += bytes.len() as u32;
        let mut payload = Vec::with_capacity(4 + bytes.len());
        payload.extend_from_slice(&token.as_u32().to_le_bytes());
        payload.extend_from_slice(bytes);
        constant_frames.push((Some(token), Frame::Constant(payload)));
    }

    let mut string_bytes = 0u32;
    let mut string_frames = Vec::new();
    for (token, s) in set.allocator().strings() {
        if !include(token) {
            continue;
        }
        let encoded = s.as_bytes();
        string_bytes += encoded.len() as u32 + 1;
        let mut payload = Vec::with_capacity(4 + encoded.len());
        payload.extend_from_slice(&token.as_u32().to_le_bytes());
        payload.extend_from_slice(encoded);
        string_frames.push((Some(token), Frame::StringBlob(payload)));
    }

    frames.extend(constant_frames);
    frames.push((
        None,
        Frame::PoolSizes {
            constants: constant_bytes,
            strings: string_bytes,
        },
    ));
    frames.extend(string_frames);

    // Phase 5: declarations first, then bytecode, both in token order.
    for m in set.methods_by_token() {
        if !include(m.token) {
            continue;
        }
        let decl = MethodDecl {
            token: m.token,
            flags: m.flags,
            max_stack: m.max_stack,
            native_selector: m.native_selector,
            locals: m.locals.clone(),
            args: m.args.clone(),
        };
        frames.push((Some(m.token), Frame::MethodDecl(decl.to_bytes())));
    }
    for m in set.methods_by_token() {
        if !include(m.token) {
            continue;
        }
        let Some(code) = &m.code else { continue };
        let mut payload = Vec::with_capacity(4 + code.len());
        payload.extend_from_slice(&m.token.as_u32().to_le_bytes());
        payload.extend_from_slice(code);
        frames.push((Some(m.token), Frame::MethodBody(payload)));
    }

    frames
}
