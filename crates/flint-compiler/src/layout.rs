//! Slot classification and type layout.
//!
//! Every field, local, and argument is classified into a slot kind with an
//! explicit storage size. Type layout follows from the field slots:
//! instance size inherits from the base, static size does not, and two
//! carrier types get their field order pinned to the device runtime's
//! hard-coded expectations.

use flint_image::{Slot, SlotKind, POINTER_WIDTH};

use crate::error::{CompileError, Result};
use crate::meta::well_known;
use crate::meta::{GenericContext, ImageReader, SrcFieldId, SrcTypeId, TypeSig};

/// Round `v` up to a multiple of `align`.
fn round_up(v: u32, align: u32) -> u32 {
    (v + align - 1) & !(align - 1)
}

/// Storage a field occupies inside a non-value class: small slots round to
/// 4, wider slots align to 8.
fn class_field_size(slot: Slot) -> u32 {
    let size = slot.size as u32;
    if size <= 4 {
        4
    } else {
        round_up(size, 8)
    }
}

/// Classifies signatures and computes type sizes.
pub struct LayoutEngine<'r> {
    reader: &'r dyn ImageReader,
}

impl<'r> LayoutEngine<'r> {
    pub fn new(reader: &'r dyn ImageReader) -> Self {
        Self { reader }
    }

    /// Classify a signature into kind + storage size.
    pub fn classify(&self, sig: &TypeSig) -> Result<Slot> {
        self.classify_in(sig, &GenericContext::default())
    }

    /// Classify under a generic context.
    pub fn classify_in(&self, sig: &TypeSig, ctx: &GenericContext) -> Result<Slot> {
        let slot = match sig {
            TypeSig::Bool => Slot::new(SlotKind::Bool, 1),
            TypeSig::Char => Slot::new(SlotKind::U32, 2),
            TypeSig::I1 => Slot::new(SlotKind::I32, 1),
            TypeSig::I2 => Slot::new(SlotKind::I32, 2),
            TypeSig::I4 => Slot::new(SlotKind::I32, 4),
            TypeSig::I8 => Slot::new(SlotKind::I64, 8),
            TypeSig::U1 => Slot::new(SlotKind::U32, 1),
            TypeSig::U2 => Slot::new(SlotKind::U32, 2),
            TypeSig::U4 => Slot::new(SlotKind::U32, 4),
            TypeSig::U8 => Slot::new(SlotKind::U64, 8),
            TypeSig::R4 => Slot::new(SlotKind::F32, 4),
            TypeSig::R8 => Slot::new(SlotKind::F64, 8),
            TypeSig::String | TypeSig::Object | TypeSig::Class(_) => {
                Slot::new(SlotKind::Object, POINTER_WIDTH)
            }
            TypeSig::ByRef(_) => Slot::new(SlotKind::ByRef, POINTER_WIDTH),
            TypeSig::FnPtr => Slot::new(SlotKind::FnPtr, POINTER_WIDTH),
            TypeSig::Array(elem) => {
                let elem_slot = self.classify_in(elem, ctx)?;
                if elem_slot.kind.is_reference() {
                    Slot::new(SlotKind::RefArray, POINTER_WIDTH)
                } else {
                    Slot::new(SlotKind::ValueArray, elem_slot.size)
                }
            }
            TypeSig::Value(ty) => self.classify_value(*ty, &GenericContext::default())?,
            TypeSig::Inst(template, args) => {
                let info = self.reader.type_info(*template);
                let full = info.full_name();
                if full == well_known::BYREF_WRAPPER {
                    Slot::new(SlotKind::Ref, POINTER_WIDTH)
                } else if full == well_known::SLICE {
                    Slot::new(SlotKind::LargeValue, POINTER_WIDTH + 4)
                } else if info.attrs.is_value_type {
                    let inner = GenericContext {
                        type_args: args.iter().map(|a| ctx.instantiate(a)).collect(),
                        method_args: Vec::new(),
                    };
                    self.classify_value(*template, &inner)?
                } else {
                    Slot::new(SlotKind::Object, POINTER_WIDTH)
                }
            }
            TypeSig::TypeParam(_) | TypeSig::MethodParam(_) => {
                let bound = ctx.instantiate(sig);
                if bound == *sig {
                    return Err(CompileError::UnboundGeneric {
                        context: format!("{sig:?}"),
                    });
                }
                self.classify_in(&bound, ctx)?
            }
            TypeSig::Void => {
                return Err(CompileError::Unsizeable {
                    what: "void".into(),
                })
            }
        };
        Ok(slot)
    }

    /// Classify a value type by its own layout.
    fn classify_value(&self, ty: SrcTypeId, ctx: &GenericContext) -> Result<Slot> {
        let info = self.reader.type_info(ty);
        if info.attrs.is_enum {
            return Ok(Slot::new(SlotKind::U32, 4));
        }
        let full = info.full_name();
        if full == well_known::DATE_TIME || full == well_known::TIME_SPAN {
            return Ok(Slot::new(SlotKind::U64, 8));
        }

        let instance_fields: Vec<SrcFieldId> = info
            .fields
            .iter()
            .copied()
            .filter(|&f| !self.reader.field_info(f).is_static)
            .collect();

        // Single-field value types pack tightly; reference-bearing or
        // multi-field ones align every field to pointer width.
        let mut slots = Vec::with_capacity(instance_fields.len());
        for &f in &instance_fields {
            slots.push(self.classify_in(&self.reader.field_info(f).sig, ctx)?);
        }
        let align4 = instance_fields.len() > 1 || slots.iter().any(|s| s.kind.is_reference());

        let mut total: u32 = 0;
        for slot in &slots {
            if align4 {
                total = round_up(total, 4);
            }
            total += slot.size as u32;
        }
        if align4 {
            total = round_up(total, 4);
        }
        if let Some(declared) = info.layout_size {
            total = total.max(declared.max(4));
        }

        Ok(if total <= 4 {
            Slot::new(SlotKind::U32, 4)
        } else if total <= 8 {
            Slot::new(SlotKind::U64, 8)
        } else {
            Slot::new(SlotKind::LargeValue, round_up(total, 4) as u16)
        })
    }

    /// Instance size: the base type's instance size plus this type's own
    /// field contributions.
    pub fn instance_size(&self, ty: SrcTypeId) -> Result<u32> {
        let info = self.reader.type_info(ty);
        let base = match info.base {
            Some(base) => self.instance_size(base)?,
            None => 0,
        };
        let mut own = 0;
        for &f in &info.fields {
            let field = self.reader.field_info(f);
            if field.is_static {
                continue;
            }
            own += class_field_size(self.classify(&field.sig)?);
        }
        Ok(base + own)
    }

    /// Static size: this type's own static fields only. Never inherited.
    pub fn static_size(&self, ty: SrcTypeId) -> Result<u32> {
        let info = self.reader.type_info(ty);
        let mut total = 0;
        for &f in &info.fields {
            let field = self.reader.field_info(f);
            if !field.is_static {
                continue;
            }
            total += class_field_size(self.classify(&field.sig)?);
        }
        Ok(total)
    }

    /// Instance fields in the layout-stable order the image uses.
    ///
    /// Two carrier types have field-order contracts with the device
    /// runtime: the string carrier stores its length before the first
    /// character of payload, and the exception carrier keeps the message
    /// at slot zero.
    pub fn ordered_instance_fields(&self, ty: SrcTypeId) -> Vec<SrcFieldId> {
        let info = self.reader.type_info(ty);
        let mut fields: Vec<SrcFieldId> = info
            .fields
            .iter()
            .copied()
            .filter(|&f| !self.reader.field_info(f).is_static)
            .collect();

        let full = info.full_name();
        if full == well_known::STRING {
            let length = fields
                .iter()
                .position(|&f| matches!(self.reader.field_info(f).sig, TypeSig::I4 | TypeSig::U4));
            let first_char = fields
                .iter()
                .position(|&f| matches!(self.reader.field_info(f).sig, TypeSig::Char));
            if let (Some(len), Some(ch)) = (length, first_char) {
                if ch < len {
                    fields.swap(ch, len);
                }
            }
        } else if full == well_known::EXCEPTION {
            let message = fields
                .iter()
                .position(|&f| matches!(self.reader.field_info(f).sig, TypeSig::String));
            if let Some(msg) = message {
                let f = fields.remove(msg);
                fields.insert(0, f);
            }
        }
        fields
    }
}
