//! Entry-rooted dependency discovery.
//!
//! Starting from the entry method, admits every reachable method and type
//! into the execution set. Admission is cycle-safe: a method is walked only
//! once. After the worklist drains, a completion pass picks up virtual
//! implementations and type initializers that no bytecode names directly;
//! it iterates until stable, at least twice, because implementations can
//! become reachable only after their interfaces are pulled in.

use std::collections::VecDeque;

use tracing::{debug, warn};

use flint_image::{MethodFlags, Slot, SlotKind, Token};

use crate::dispatch;
use crate::error::{CompileError, Result};
use crate::layout::LayoutEngine;
use crate::meta::{
    find_method_by_name, has_static_fields, method_context, well_known, GenericContext,
    ImageReader, MethodInfo, SrcMethodId, SrcTypeId, TypeSig,
};
use crate::replace::{redirect_method, redirect_type, ReplacementRegistry};
use crate::rewrite::Rewriter;
use crate::set::{ExecutionSet, MethodRecord};
use crate::settings::CompileSettings;
use crate::synth;

/// Bodies beyond this size are rejected at discovery time, before the
/// rewriter's own tighter limit applies.
const MAX_WALK_BODY: usize = u16::MAX as usize;

/// Discovers the transitive closure of the entry method.
pub struct DependencyWalker<'a> {
    reader: &'a dyn ImageReader,
    registry: &'a ReplacementRegistry,
    settings: &'a CompileSettings,
    set: &'a mut ExecutionSet,
    queue: VecDeque<SrcMethodId>,
}

impl<'a> DependencyWalker<'a> {
    pub fn new(
        reader: &'a dyn ImageReader,
        registry: &'a ReplacementRegistry,
        settings: &'a CompileSettings,
        set: &'a mut ExecutionSet,
    ) -> Self {
        Self {
            reader,
            registry,
            settings,
            set,
            queue: VecDeque::new(),
        }
    }

    /// Walk the program from `entry` until the reachable set stabilizes.
    pub fn walk(&mut self, entry: SrcMethodId) -> Result<()> {
        for name in &self.settings.additional_suppressions {
            match self.reader.find_type(name) {
                Some(ty) => self.set.suppress(ty),
                None => warn!(type_name = %name, "suppression names an unknown type"),
            }
        }

        self.validate_entry(entry)?;
        self.set.set_entry(entry);
        self.queue.push_back(entry);
        self.drain()?;
        self.complete()?;
        Ok(())
    }

    fn validate_entry(&self, entry: SrcMethodId) -> Result<()> {
        let info = self.reader.method_info(entry);
        let name = self.method_name(info);
        if !info.attrs.is_static {
            return Err(CompileError::BadEntryPoint {
                method: name,
                reason: "entry must be static".into(),
            });
        }
        if info.generic_arity > 0 {
            return Err(CompileError::BadEntryPoint {
                method: name,
                reason: "entry must not be generic".into(),
            });
        }
        if self.settings.launch_program_from_flash {
            let ok = match info.sig.params.as_slice() {
                [] => true,
                [TypeSig::Array(elem)] => **elem == TypeSig::String,
                _ => false,
            };
            if !ok {
                return Err(CompileError::BadEntryPoint {
                    method: name,
                    reason: "flash launch needs () or (string[]) parameters".into(),
                });
            }
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        while let Some(method) = self.queue.pop_front() {
            self.admit(method)?;
        }
        Ok(())
    }

    /// Admit one method: allocate its token, rewrite its body, queue what
    /// it references.
    fn admit(&mut self, method: SrcMethodId) -> Result<()> {
        let method = redirect_method(self.reader, self.registry, method)?;
        if self.set.contains_method(method) {
            return Ok(());
        }
        let info = self.reader.method_info(method).clone();
        let declaring = redirect_type(self.reader, self.registry, info.declaring);
        if self.set.is_suppressed(declaring) {
            warn!(method = %self.method_name(&info), "call into suppressed type dropped");
            return Ok(());
        }

        // Constructors and methods of static-field-owning types pull their
        // declaring type in even when no bytecode names it.
        if info.attrs.is_ctor
            || info.attrs.is_initializer
            || has_static_fields(self.reader, info.declaring)
        {
            self.ensure_type(info.declaring);
        }

        let token = self.set.allocator_mut().method_token(method);
        let mut flags = MethodFlags {
            is_static: info.attrs.is_static,
            is_virtual: info.attrs.is_virtual,
            is_ctor: info.attrs.is_ctor || info.attrs.is_initializer,
            returns_void: info.sig.returns_void(),
            is_native: false,
            is_synthesized: false,
        };

        // Abstract methods contribute no body and are not walked.
        if info.attrs.is_abstract {
            self.set.admit_method(MethodRecord {
                src: method,
                token,
                full_name: self.method_name(&info),
                flags,
                max_stack: 0,
                native_selector: 0,
                code: None,
                locals: Vec::new(),
                args: Vec::new(),
            });
            return Ok(());
        }

        let ctx = method_context(self.reader, method);

        // A positive native selector means the device already has the
        // implementation; nothing to walk.
        if let Some(selector) = self.registry.native_selector(method) {
            flags.is_native = true;
            self.set.admit_method(MethodRecord {
                src: method,
                token,
                full_name: self.method_name(&info),
                flags,
                max_stack: 0,
                native_selector: selector,
                code: None,
                locals: Vec::new(),
                args: self.arg_slots(&info, &ctx)?,
            });
            return Ok(());
        }

        if self.reader.method_body(method).is_none() {
            return self.synthesize_missing(method, token, &info, flags);
        }

        let body_len = self.reader.method_body(method).map(|b| b.code.len());
        if let Some(len) = body_len {
            if len > MAX_WALK_BODY {
                return Err(CompileError::OversizedMethod {
                    method: self.method_name(&info),
                    size: len,
                    limit: MAX_WALK_BODY,
                });
            }
        }

        let outcome = {
            let mut rewriter =
                Rewriter::new(self.reader, self.registry, self.set.allocator_mut());
            rewriter.rewrite(method)?
        };

        let body = self
            .reader
            .method_body(method)
            .expect("body presence checked above");
        let layout = LayoutEngine::new(self.reader);
        let locals = body
            .locals
            .iter()
            .map(|sig| layout.classify_in(sig, &ctx))
            .collect::<Result<Vec<_>>>()?;

        debug!(method = %self.method_name(&info), token = %token, "admitted");
        self.set.admit_method(MethodRecord {
            src: method,
            token,
            full_name: self.method_name(&info),
            flags,
            max_stack: body.max_stack,
            native_selector: 0,
            code: Some(outcome.code),
            locals,
            args: self.arg_slots(&info, &ctx)?,
        });

        if info.attrs.is_initializer {
            self.set
                .note_initializer_calls(method, outcome.methods.clone());
        }
        for (field, blob) in outcome.blob_inits {
            self.set.note_blob_init(field, blob);
        }
        for ty in outcome.array_elements {
            self.set.note_array_element(ty);
        }
        for ty in outcome.types {
            self.ensure_type(ty);
        }
        for callee in outcome.methods {
            if !self.set.contains_method(callee) {
                self.queue.push_back(callee);
            }
        }
        Ok(())
    }

    /// Concrete method with no bytecode: synthesize delegate plumbing, or
    /// warn and drop. The drop becomes fatal only if a caller needs the
    /// token later.
    fn synthesize_missing(
        &mut self,
        method: SrcMethodId,
        token: Token,
        info: &MethodInfo,
        mut flags: MethodFlags,
    ) -> Result<()> {
        if !self.is_delegate_type(info.declaring) {
            warn!(
                method = %self.method_name(info),
                "concrete method has no implementation; dropped"
            );
            return Ok(());
        }

        let root = self
            .delegate_root()
            .ok_or_else(|| CompileError::MissingImplementation {
                method: self.method_name(info),
            })?;
        self.ensure_type(root);
        let (target_field, pointer_field) = self.delegate_fields(root)?;
        let ctx = method_context(self.reader, method);

        flags.is_synthesized = true;
        let record = if info.attrs.is_ctor {
            // The closed-static helper is pulled into the set first.
            let helper = find_method_by_name(self.reader, root, well_known::DELEGATE_CTOR_HELPER)
                .next()
                .ok_or_else(|| CompileError::MissingImplementation {
                    method: self.method_name(info),
                })?;
            self.admit(helper)?;
            let helper_token = self.set.allocator_mut().method_token(helper);
            MethodRecord {
                src: method,
                token,
                full_name: self.method_name(info),
                flags,
                max_stack: 3,
                native_selector: 0,
                code: Some(synth::delegate_ctor(helper_token)),
                locals: Vec::new(),
                args: self.arg_slots(info, &ctx)?,
            }
        } else {
            let argc = info.sig.params.len() as u8;
            let flags = synth::delegate_invoke_flags(info.sig.returns_void());
            MethodRecord {
                src: method,
                token,
                full_name: self.method_name(info),
                flags,
                max_stack: u16::from(argc) + 2,
                native_selector: 0,
                code: Some(synth::delegate_invoke(target_field, pointer_field, argc)),
                locals: Vec::new(),
                args: self.arg_slots(info, &ctx)?,
            }
        };
        self.set.admit_method(record);
        Ok(())
    }

    fn delegate_root(&self) -> Option<SrcTypeId> {
        self.reader
            .find_type(well_known::MULTICAST_DELEGATE)
            .or_else(|| self.reader.find_type(well_known::DELEGATE))
    }

    fn delegate_fields(&mut self, root: SrcTypeId) -> Result<(Token, Token)> {
        let info = self.reader.type_info(root);
        let mut target = None;
        let mut pointer = None;
        for &f in &info.fields {
            let field = self.reader.field_info(f);
            if field.name == well_known::DELEGATE_TARGET_FIELD {
                target = Some(f);
            } else if field.name == well_known::DELEGATE_POINTER_FIELD {
                pointer = Some(f);
            }
        }
        match (target, pointer) {
            (Some(t), Some(p)) => Ok((
                self.set.allocator_mut().field_token(t),
                self.set.allocator_mut().field_token(p),
            )),
            _ => Err(CompileError::MissingImplementation {
                method: format!("{}::<delegate fields>", info.full_name()),
            }),
        }
    }

    fn is_delegate_type(&self, ty: SrcTypeId) -> bool {
        let mut current = self.reader.type_info(ty).base;
        while let Some(base) = current {
            let info = self.reader.type_info(base);
            let full = info.full_name();
            if full == well_known::MULTICAST_DELEGATE || full == well_known::DELEGATE {
                return true;
            }
            current = info.base;
        }
        false
    }

    /// Admit a type shell, processing replacement. A partially-replaced
    /// type is deliberately admitted twice, original and substitute under
    /// one token, whichever side is reached first; the finalize pass
    /// de-duplicates by matching on that token.
    fn ensure_type(&mut self, ty: SrcTypeId) {
        let target = redirect_type(self.reader, self.registry, ty);
        if self.set.is_suppressed(target) || self.set.contains_type(target) {
            return;
        }

        let partial_pair = if let Some(repl) = self.registry.for_type(self.reader, target) {
            (!repl.replace_type).then_some((target, repl.substitute))
        } else if let Some(original) = self.registry.original_of(target) {
            match self.registry.for_type(self.reader, original) {
                Some(repl) if !repl.replace_type => Some((original, target)),
                _ => None,
            }
        } else {
            None
        };

        let Some((original, substitute)) = partial_pair else {
            let token = self.set.allocator_mut().type_token(target);
            let full_name = self.reader.type_info(target).full_name();
            debug!(type_name = %full_name, token = %token, "type admitted");
            self.set.admit_type(target, token, full_name);
            return;
        };

        let token = self.set.allocator_mut().type_token(original);
        let full_name = self.reader.type_info(original).full_name();
        debug!(type_name = %full_name, token = %token, "type admitted (partial pair)");
        self.set.admit_type(original, token, full_name);
        self.set.allocator_mut().alias_type(substitute, original);
        if !self.set.contains_type(substitute) {
            let sub_name = self.reader.type_info(substitute).full_name();
            self.set.admit_type(substitute, token, sub_name);
        }
    }

    /// Completion: pick up virtual implementations dispatched through
    /// bases/interfaces already in the set, type initializers, and the
    /// array enumerator factory. Repeats until nothing new appears.
    fn complete(&mut self) -> Result<()> {
        let mut rounds = 0;
        loop {
            let before_methods = self.set.method_ids().len();
            let before_types = self.set.type_ids().len();

            for ty in self.types_in_inheritance_order() {
                self.admit_overriding_methods(ty)?;
                self.admit_initializer(ty)?;
            }
            self.inject_array_enumerators()?;
            self.drain()?;

            rounds += 1;
            let grew = self.set.method_ids().len() != before_methods
                || self.set.type_ids().len() != before_types;
            if !grew && rounds >= 2 {
                return Ok(());
            }
        }
    }

    /// Interfaces first, then bases before derived, names breaking ties.
    fn types_in_inheritance_order(&self) -> Vec<SrcTypeId> {
        let mut types = self.set.type_ids();
        let depth = |ty: SrcTypeId| -> u32 {
            let mut d = 0;
            let mut current = self.reader.type_info(ty).base;
            while let Some(base) = current {
                d += 1;
                current = self.reader.type_info(base).base;
            }
            d
        };
        types.sort_by_key(|&ty| {
            let info = self.reader.type_info(ty);
            (!info.attrs.is_interface, depth(ty), info.full_name())
        });
        types
    }

    /// Concrete methods overriding something already in the set get
    /// dispatched through it, even if no bytecode names them directly.
    fn admit_overriding_methods(&mut self, ty: SrcTypeId) -> Result<()> {
        let methods = self.reader.type_info(ty).methods.clone();
        for m in methods {
            if self.set.contains_method(m) {
                continue;
            }
            let info = self.reader.method_info(m);
            if info.attrs.is_abstract || info.attrs.is_static {
                continue;
            }
            let overridden = dispatch::overrides_of(self.reader, ty, m, self.set.suppressed_types());
            if overridden.iter().any(|o| self.set.contains_method(*o)) {
                self.queue.push_back(m);
            }
        }
        Ok(())
    }

    fn admit_initializer(&mut self, ty: SrcTypeId) -> Result<()> {
        if self.set.is_suppressed(ty) {
            return Ok(());
        }
        let initializer = self
            .reader
            .type_info(ty)
            .methods
            .iter()
            .copied()
            .find(|&m| self.reader.method_info(m).attrs.is_initializer);
        if let Some(init) = initializer {
            if !self.set.contains_method(init) {
                self.queue.push_back(init);
            }
        }
        Ok(())
    }

    /// For each array element type, pull in the array-of-T enumerator
    /// factory and the enumerable interface it implements; the finalize
    /// pass binds the pair by token.
    fn inject_array_enumerators(&mut self) -> Result<()> {
        if self.set.array_elements().is_empty() {
            return Ok(());
        }
        let Some(helper) = self.reader.find_type(well_known::ARRAY_HELPER) else {
            return Ok(());
        };
        let Some(iface) = self.reader.find_type(well_known::ENUMERABLE) else {
            return Ok(());
        };
        let factory = find_method_by_name(self.reader, helper, well_known::ARRAY_ENUMERATOR_FACTORY)
            .next();
        let producer =
            find_method_by_name(self.reader, iface, well_known::ENUMERABLE_PRODUCER).next();
        if let (Some(factory), Some(producer)) = (factory, producer) {
            self.ensure_type(iface);
            if !self.set.contains_method(factory) {
                self.queue.push_back(factory);
            }
            if !self.set.contains_method(producer) {
                self.queue.push_back(producer);
            }
        }
        Ok(())
    }

    fn arg_slots(&self, info: &MethodInfo, ctx: &GenericContext) -> Result<Vec<Slot>> {
        let layout = LayoutEngine::new(self.reader);
        let mut slots = Vec::with_capacity(info.sig.params.len() + 1);
        if !info.attrs.is_static {
            slots.push(Slot::of(SlotKind::Object));
        }
        for param in &info.sig.params {
            slots.push(layout.classify_in(param, ctx)?);
        }
        Ok(slots)
    }

    fn method_name(&self, info: &MethodInfo) -> String {
        format!(
            "{}::{}",
            self.reader.type_info(info.declaring).full_name(),
            info.name
        )
    }
}
