//! Linear bytecode rewriting.
//!
//! One pass over a method body: classify each instruction by its operand
//! form, renumber every token-bearing operand into the image token space,
//! and record what the method references. The parse advances by the
//! operand-length table alone; a byte that is not a defined opcode is a
//! hard error, an operand that is not a resolvable token is only an error
//! where the instruction form requires one.

use indexmap::IndexSet;
use tracing::warn;

use flint_image::{extended_form, operand_form, rejected_name, OperandForm, Token, PREFIX};

use crate::error::{CompileError, Result};
use crate::meta::{
    method_context, resolve_operand, GenericContext, ImageReader, SrcFieldId, SrcMethodId, SrcRef,
    SrcTypeId,
};
use crate::replace::{redirect_method, redirect_type, ReplacementRegistry};
use crate::tokens::TokenAllocator;

/// Upper bound on a rewritten body; the method-declaration frame carries a
/// 14-bit length.
pub const MAX_BODY_BYTES: usize = (1 << 14) - 1;

/// Opcode bytes the rewriter special-cases.
const LDSTR: u8 = 0x72;
const NEWARR: u8 = 0x8D;
const LDTOKEN: u8 = 0xD0;

/// What one method's bytecode references, with the body already patched.
#[derive(Default, Debug)]
pub struct RewriteOutcome {
    pub code: Vec<u8>,
    /// Call targets after replacement redirection.
    pub methods: IndexSet<SrcMethodId>,
    pub fields: IndexSet<SrcFieldId>,
    pub types: IndexSet<SrcTypeId>,
    /// Element types of arrays the method constructs.
    pub array_elements: IndexSet<SrcTypeId>,
    /// Fields whose embedded initializer payload was registered, with the
    /// blob token the payload received.
    pub blob_inits: Vec<(SrcFieldId, Token)>,
}

/// Rewrites one method body at a time against shared allocation state.
pub struct Rewriter<'a> {
    reader: &'a dyn ImageReader,
    registry: &'a ReplacementRegistry,
    allocator: &'a mut TokenAllocator,
}

impl<'a> Rewriter<'a> {
    pub fn new(
        reader: &'a dyn ImageReader,
        registry: &'a ReplacementRegistry,
        allocator: &'a mut TokenAllocator,
    ) -> Self {
        Self {
            reader,
            registry,
            allocator,
        }
    }

    /// Rewrite `method`'s body in place and report its references.
    pub fn rewrite(&mut self, method: SrcMethodId) -> Result<RewriteOutcome> {
        let name = self.method_name(method);
        let body = self
            .reader
            .method_body(method)
            .ok_or_else(|| CompileError::MissingImplementation {
                method: name.clone(),
            })?;
        if body.code.len() > MAX_BODY_BYTES {
            return Err(CompileError::OversizedMethod {
                method: name,
                size: body.code.len(),
                limit: MAX_BODY_BYTES,
            });
        }

        let ctx = method_context(self.reader, method);
        let mut code = body.code.clone();
        let mut out = RewriteOutcome::default();

        let mut pos = 0usize;
        while pos < code.len() {
            let offset = pos;
            let op = code[pos];
            pos += 1;

            let (form, ext_op) = if op == PREFIX {
                let second = *code.get(pos).ok_or_else(|| CompileError::UndefinedOpcode {
                    method: name.clone(),
                    opcode: op,
                    offset,
                })?;
                pos += 1;
                let form = extended_form(second).ok_or(CompileError::UndefinedOpcode {
                    method: name.clone(),
                    opcode: second,
                    offset,
                })?;
                (form, Some(second))
            } else {
                let form = operand_form(op).ok_or(CompileError::UndefinedOpcode {
                    method: name.clone(),
                    opcode: op,
                    offset,
                })?;
                (form, None)
            };

            if let Some(mnemonic) = match ext_op {
                Some(second) => rejected_name(second, true),
                None => rejected_name(op, false),
            } {
                return Err(CompileError::UnsupportedOpcode {
                    method: name.clone(),
                    mnemonic,
                });
            }

            match form {
                OperandForm::Switch => {
                    let count = read_u32(&code, pos, &name)? as usize;
                    pos += 4 + 4 * count;
                }
                form if form.bears_token() => {
                    let raw = read_u32(&code, pos, &name)?;
                    let patched = self.patch_operand(op, form, raw, &ctx, &name, &mut out)?;
                    code[pos..pos + 4].copy_from_slice(&patched.to_le_bytes());
                    pos += 4;
                }
                form => {
                    // fixed_len is Some for everything but Switch.
                    pos += form.fixed_len().unwrap_or(0);
                }
            }
            if pos > code.len() {
                return Err(CompileError::UndefinedOpcode {
                    method: name.clone(),
                    opcode: op,
                    offset,
                });
            }
        }

        out.code = code;
        Ok(out)
    }

    /// Renumber one token-bearing operand, recording the reference.
    fn patch_operand(
        &mut self,
        op: u8,
        form: OperandForm,
        raw: u32,
        ctx: &GenericContext,
        method_name: &str,
        out: &mut RewriteOutcome,
    ) -> Result<u32> {
        match form {
            OperandForm::StringTok => {
                let literal = self.reader.string_literal(raw).ok_or_else(|| {
                    CompileError::UnresolvedReference {
                        method: method_name.to_owned(),
                        raw,
                    }
                })?;
                debug_assert_eq!(op, LDSTR);
                Ok(self.allocator.string_token(literal).as_u32())
            }
            OperandForm::MethodTok => {
                let Some(SrcRef::Method(m)) = resolve_operand(self.reader, ctx, raw) else {
                    return Err(CompileError::UnresolvedReference {
                        method: method_name.to_owned(),
                        raw,
                    });
                };
                Ok(self.patch_method(m, out)?.as_u32())
            }
            OperandForm::FieldTok => {
                let Some(SrcRef::Field(f)) = resolve_operand(self.reader, ctx, raw) else {
                    return Err(CompileError::UnresolvedReference {
                        method: method_name.to_owned(),
                        raw,
                    });
                };
                let (_, token) = self.patch_field(f, out)?;
                Ok(token.as_u32())
            }
            OperandForm::TypeTok => {
                let Some(SrcRef::Type(t)) = resolve_operand(self.reader, ctx, raw) else {
                    return Err(CompileError::UnresolvedReference {
                        method: method_name.to_owned(),
                        raw,
                    });
                };
                let target = redirect_type(self.reader, self.registry, t);
                if op == NEWARR {
                    out.array_elements.insert(target);
                }
                out.types.insert(target);
                Ok(self.allocator.type_token(target).as_u32())
            }
            OperandForm::AnyTok => {
                debug_assert_eq!(op, LDTOKEN);
                match resolve_operand(self.reader, ctx, raw) {
                    Some(SrcRef::Type(t)) => {
                        let target = redirect_type(self.reader, self.registry, t);
                        out.types.insert(target);
                        Ok(self.allocator.type_token(target).as_u32())
                    }
                    Some(SrcRef::Method(m)) => Ok(self.patch_method(m, out)?.as_u32()),
                    Some(SrcRef::Field(f)) => {
                        // A field operand here denotes an embedded
                        // static-array initializer; register the payload
                        // as constant data keyed to the field's token. The
                        // payload comes from the resolved field, which on a
                        // fully-replaced type is the substitute's.
                        let (field, token) = self.patch_field(f, out)?;
                        if let Some(payload) = self.reader.field_blob(field) {
                            let blob = self.allocator.blob_token(payload);
                            out.blob_inits.push((field, blob));
                        }
                        Ok(token.as_u32())
                    }
                    None => Err(CompileError::UnresolvedReference {
                        method: method_name.to_owned(),
                        raw,
                    }),
                }
            }
            _ => unreachable!("non-token form in patch_operand"),
        }
    }

    fn patch_method(&mut self, m: SrcMethodId, out: &mut RewriteOutcome) -> Result<Token> {
        let target = redirect_method(self.reader, self.registry, m)?;
        out.methods.insert(target);
        // Small types consisting only of fields would otherwise be missed.
        let declaring = self.reader.method_info(target).declaring;
        out.types
            .insert(redirect_type(self.reader, self.registry, declaring));
        Ok(self.allocator.method_token(target))
    }

    /// Patch a field reference, hopping to the replacement type's
    /// same-named field when the declaring type is substituted. Returns
    /// the resolved handle with the token so callers never touch the
    /// original again.
    fn patch_field(
        &mut self,
        f: SrcFieldId,
        out: &mut RewriteOutcome,
    ) -> Result<(SrcFieldId, Token)> {
        let info = self.reader.field_info(f);
        let declaring = info.declaring;
        let mut target_field = f;

        if let Some(repl) = self.registry.for_type(self.reader, declaring) {
            if repl.replace_type {
                let substitute = repl.substitute;
                let matches: Vec<SrcFieldId> = self
                    .reader
                    .type_info(substitute)
                    .fields
                    .iter()
                    .copied()
                    .filter(|&sf| self.reader.field_info(sf).name == info.name)
                    .collect();
                if matches.len() > 1 {
                    warn!(
                        field = %info.name,
                        substitute = %self.reader.type_info(substitute).full_name(),
                        "ambiguous field name on replacement type; taking first declaration"
                    );
                }
                target_field = *matches.first().ok_or_else(|| {
                    CompileError::MissingReplacementTarget {
                        substitute: self.reader.type_info(substitute).full_name(),
                        target: self.reader.type_info(declaring).full_name(),
                        member: info.name.clone(),
                    }
                })?;
            }
        }

        out.fields.insert(target_field);
        // The declaring type is always added to the type-reference list.
        let owner = self.reader.field_info(target_field).declaring;
        out.types
            .insert(redirect_type(self.reader, self.registry, owner));
        Ok((target_field, self.allocator.field_token(target_field)))
    }

    fn method_name(&self, method: SrcMethodId) -> String {
        let info = self.reader.method_info(method);
        format!(
            "{}::{}",
            self.reader.type_info(info.declaring).full_name(),
            info.name
        )
    }
}

fn read_u32(code: &[u8], pos: usize, method: &str) -> Result<u32> {
    let bytes = code
        .get(pos..pos + 4)
        .ok_or_else(|| CompileError::UndefinedOpcode {
            method: method.to_owned(),
            opcode: code[pos.saturating_sub(1)],
            offset: pos,
        })?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
