//! Slot kinds: the closed classification of every field, local, and
//! argument slot in the image.
//!
//! A kind carries an intrinsic evaluation size; the declared storage width
//! may be narrower (an `i16` field evaluates as `I32` but stores 2 bytes),
//! so the pair is carried as a [`Slot`].

/// Device pointer width in bytes. The target is a 32-bit core.
pub const POINTER_WIDTH: u16 = 4;

/// Closed set of slot kinds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum SlotKind {
    /// Unsigned 32-bit scalar (also chars, bools widened on the stack, enums).
    U32 = 0,
    /// Signed 32-bit scalar.
    I32 = 1,
    /// Unsigned 64-bit scalar (also date/interval carriers).
    U64 = 2,
    /// Signed 64-bit scalar.
    I64 = 3,
    /// Single-precision float.
    F32 = 4,
    /// Double-precision float.
    F64 = 5,
    /// Boolean storage slot.
    Bool = 6,
    /// Reference to a heap object.
    Object = 7,
    /// Reference to a variable (managed pointer).
    ByRef = 8,
    /// Array with value-typed elements.
    ValueArray = 9,
    /// Array with reference-typed elements.
    RefArray = 10,
    /// Reference kind (by-ref wrapper instantiations).
    Ref = 11,
    /// Function pointer.
    FnPtr = 12,
    /// Value type wider than 8 bytes.
    LargeValue = 13,
    /// Virtual-dispatch member entry. Never a storage slot.
    MethodSlot = 14,
}

impl SlotKind {
    /// Convert from raw discriminant.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::U32),
            1 => Some(Self::I32),
            2 => Some(Self::U64),
            3 => Some(Self::I64),
            4 => Some(Self::F32),
            5 => Some(Self::F64),
            6 => Some(Self::Bool),
            7 => Some(Self::Object),
            8 => Some(Self::ByRef),
            9 => Some(Self::ValueArray),
            10 => Some(Self::RefArray),
            11 => Some(Self::Ref),
            12 => Some(Self::FnPtr),
            13 => Some(Self::LargeValue),
            14 => Some(Self::MethodSlot),
            _ => None,
        }
    }

    /// The intrinsic byte size of the kind when no narrower storage width
    /// is declared. `LargeValue` has no intrinsic size; `MethodSlot`
    /// occupies no storage.
    pub fn intrinsic_size(self) -> u16 {
        match self {
            Self::U32 | Self::I32 | Self::F32 | Self::U64 | Self::I64 | Self::F64 => {
                self.scalar_width()
            }
            Self::Bool => 1,
            Self::Object | Self::ByRef | Self::ValueArray | Self::RefArray | Self::Ref
            | Self::FnPtr => POINTER_WIDTH,
            Self::LargeValue => 0,
            Self::MethodSlot => 0,
        }
    }

    fn scalar_width(self) -> u16 {
        match self {
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
            _ => 0,
        }
    }

    /// Whether a slot of this kind holds a reference the collector must see.
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            Self::Object | Self::ByRef | Self::ValueArray | Self::RefArray | Self::Ref
        )
    }

    /// Whether this kind names an array.
    pub fn is_array(self) -> bool {
        matches!(self, Self::ValueArray | Self::RefArray)
    }
}

/// A classified slot: kind plus declared storage width in bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Slot {
    pub kind: SlotKind,
    pub size: u16,
}

impl Slot {
    pub fn new(kind: SlotKind, size: u16) -> Self {
        Self { kind, size }
    }

    /// A slot with the kind's intrinsic size.
    pub fn of(kind: SlotKind) -> Self {
        Self {
            kind,
            size: kind.intrinsic_size(),
        }
    }

    /// Encode as the 3-byte wire form: kind, size LE16.
    pub fn to_bytes(self) -> [u8; 3] {
        let s = self.size.to_le_bytes();
        [self.kind as u8, s[0], s[1]]
    }

    /// Decode from the 3-byte wire form.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let kind = SlotKind::from_u8(bytes[0])?;
        Some(Self {
            kind,
            size: u16::from_le_bytes([bytes[1], bytes[2]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminant_roundtrip() {
        for v in 0..=14u8 {
            let kind = SlotKind::from_u8(v).unwrap();
            assert_eq!(kind as u8, v);
        }
        assert!(SlotKind::from_u8(15).is_none());
    }

    #[test]
    fn references_are_pointer_wide() {
        for kind in [
            SlotKind::Object,
            SlotKind::ByRef,
            SlotKind::ValueArray,
            SlotKind::RefArray,
            SlotKind::Ref,
        ] {
            assert!(kind.is_reference());
            assert_eq!(kind.intrinsic_size(), POINTER_WIDTH);
        }
        assert!(!SlotKind::I64.is_reference());
    }

    #[test]
    fn slot_wire_roundtrip() {
        let slot = Slot::new(SlotKind::I32, 2);
        let bytes = slot.to_bytes();
        assert_eq!(Slot::from_bytes(&bytes), Some(slot));
    }

    #[test]
    fn narrow_storage_keeps_kind() {
        // i16 field: evaluates as I32, stores 2 bytes.
        let slot = Slot::new(SlotKind::I32, 2);
        assert_eq!(slot.kind.intrinsic_size(), 4);
        assert_eq!(slot.size, 2);
    }
}
