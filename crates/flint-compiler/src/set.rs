//! The execution set: everything the image will contain.
//!
//! Descriptors are created on first reachability and keyed by source
//! handle; every cross-reference is a token, never a pointer back into the
//! arena. The set is mutable during the walk, crystallized by
//! [`ExecutionSet::finalize`], and read-only for the upload driver.

use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use tracing::info;

use flint_image::{ClassFlags, MemberEntry, MethodFlags, Slot, SlotKind, Token};

use crate::dispatch;
use crate::error::{CompileError, Result};
use crate::init_order::{self, InitRecord};
use crate::layout::LayoutEngine;
use crate::meta::well_known;
use crate::meta::{ImageReader, SrcFieldId, SrcMethodId, SrcTypeId, TypeSig};
use crate::replace::ReplacementRegistry;
use crate::settings::CompileSettings;
use crate::synth::StartupStub;
use crate::tokens::{Owner, TokenAllocator};

/// A type admitted to the image.
#[derive(Clone, Debug)]
pub struct TypeRecord {
    pub src: SrcTypeId,
    pub token: Token,
    pub full_name: String,
    pub parent: Option<Token>,
    pub flags: ClassFlags,
    pub instance_size: u32,
    pub static_size: u32,
    pub members: Vec<MemberEntry>,
    pub interfaces: Vec<Token>,
}

/// A method admitted to the image.
#[derive(Clone, Debug)]
pub struct MethodRecord {
    pub src: SrcMethodId,
    pub token: Token,
    pub full_name: String,
    pub flags: MethodFlags,
    pub max_stack: u16,
    pub native_selector: u16,
    /// Rewritten bytecode; `None` for abstract and native methods.
    pub code: Option<Vec<u8>>,
    pub locals: Vec<Slot>,
    pub args: Vec<Slot>,
}

/// A field admitted to the image.
#[derive(Clone, Debug)]
pub struct FieldRecord {
    pub src: SrcFieldId,
    pub token: Token,
    pub name: String,
    pub slot: Slot,
    pub is_static: bool,
    /// Token of the embedded initializer payload, if any.
    pub init_blob: Option<Token>,
    /// Compile-time constant bytes (enum literals, folded initializers).
    pub constant: Option<Vec<u8>>,
}

/// Token boundary between a kernel prefix and the user program.
#[derive(Clone, Default, Debug)]
pub struct Snapshot {
    pub tokens: IndexSet<Token>,
    pub string_tokens: IndexSet<Token>,
    pub special_types: Vec<Token>,
}

impl Snapshot {
    pub fn contains(&self, token: Token) -> bool {
        self.tokens.contains(&token) || self.string_tokens.contains(&token)
    }
}

/// Handles minted for methods the compiler itself emits. Kept far above
/// any handle a metadata reader hands out.
const SYNTHETIC_BASE: u32 = 0xFFFF_0000;

/// The full compilation result.
#[derive(Clone, Debug)]
pub struct ExecutionSet {
    allocator: TokenAllocator,
    types: IndexMap<SrcTypeId, TypeRecord>,
    methods: IndexMap<SrcMethodId, MethodRecord>,
    fields: IndexMap<SrcFieldId, FieldRecord>,
    /// Types forbidden from inclusion (and from initialization).
    suppressed: IndexSet<SrcTypeId>,
    entry: Option<SrcMethodId>,
    /// Element types of arrays constructed anywhere in the program.
    array_elements: IndexSet<SrcTypeId>,
    /// Call lists of admitted initializers, for the sequencer.
    initializer_calls: HashMap<SrcMethodId, IndexSet<SrcMethodId>>,
    /// Embedded initializer payloads keyed by field.
    blob_inits: HashMap<SrcFieldId, Token>,
    init_sequence: Vec<InitRecord>,
    startup_token: Option<Token>,
    special_types: Vec<Token>,
    kernel: Option<Snapshot>,
    next_synthetic: u32,
    finalized: bool,
}

impl Default for ExecutionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionSet {
    pub fn new() -> Self {
        Self {
            allocator: TokenAllocator::new(),
            types: IndexMap::new(),
            methods: IndexMap::new(),
            fields: IndexMap::new(),
            suppressed: IndexSet::new(),
            entry: None,
            array_elements: IndexSet::new(),
            initializer_calls: HashMap::new(),
            blob_inits: HashMap::new(),
            init_sequence: Vec::new(),
            startup_token: None,
            special_types: Vec::new(),
            kernel: None,
            next_synthetic: SYNTHETIC_BASE,
            finalized: false,
        }
    }

    pub fn allocator(&self) -> &TokenAllocator {
        &self.allocator
    }

    pub fn allocator_mut(&mut self) -> &mut TokenAllocator {
        debug_assert!(!self.finalized, "finalized set is read-only");
        &mut self.allocator
    }

    pub fn entry(&self) -> Option<SrcMethodId> {
        self.entry
    }

    pub fn set_entry(&mut self, entry: SrcMethodId) {
        self.entry = Some(entry);
    }

    pub fn suppress(&mut self, ty: SrcTypeId) {
        self.suppressed.insert(ty);
    }

    pub fn is_suppressed(&self, ty: SrcTypeId) -> bool {
        self.suppressed.contains(&ty)
    }

    pub fn suppressed_types(&self) -> &IndexSet<SrcTypeId> {
        &self.suppressed
    }

    pub fn contains_type(&self, ty: SrcTypeId) -> bool {
        self.types.contains_key(&ty)
    }

    pub fn contains_method(&self, method: SrcMethodId) -> bool {
        self.methods.contains_key(&method)
    }

    /// Admit a type shell; layout and members are computed at finalize.
    pub fn admit_type(&mut self, src: SrcTypeId, token: Token, full_name: String) {
        self.types.entry(src).or_insert(TypeRecord {
            src,
            token,
            full_name,
            parent: None,
            flags: ClassFlags::default(),
            instance_size: 0,
            static_size: 0,
            members: Vec::new(),
            interfaces: Vec::new(),
        });
    }

    pub fn admit_method(&mut self, record: MethodRecord) {
        self.methods.entry(record.src).or_insert(record);
    }

    pub fn note_array_element(&mut self, ty: SrcTypeId) {
        self.array_elements.insert(ty);
    }

    pub fn array_elements(&self) -> &IndexSet<SrcTypeId> {
        &self.array_elements
    }

    pub fn note_initializer_calls(&mut self, init: SrcMethodId, calls: IndexSet<SrcMethodId>) {
        self.initializer_calls.insert(init, calls);
    }

    pub fn note_blob_init(&mut self, field: SrcFieldId, blob: Token) {
        self.blob_inits.insert(field, blob);
    }

    /// Types currently admitted, in admission order.
    pub fn type_ids(&self) -> Vec<SrcTypeId> {
        self.types.keys().copied().collect()
    }

    /// Methods currently admitted, in admission order.
    pub fn method_ids(&self) -> Vec<SrcMethodId> {
        self.methods.keys().copied().collect()
    }

    pub fn method(&self, src: SrcMethodId) -> Option<&MethodRecord> {
        self.methods.get(&src)
    }

    pub fn type_record(&self, src: SrcTypeId) -> Option<&TypeRecord> {
        self.types.get(&src)
    }

    /// Capture the tokens assigned so far.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tokens: self
                .allocator
                .assigned()
                .filter(|t| !matches!(t.kind(), flint_image::TokenKind::String))
                .collect(),
            string_tokens: self.allocator.assigned_strings().collect(),
            special_types: self.special_types.clone(),
        }
    }

    /// Freeze the current contents as the kernel prefix.
    pub fn mark_kernel(&mut self) {
        self.kernel = Some(self.snapshot());
    }

    pub fn kernel(&self) -> Option<&Snapshot> {
        self.kernel.as_ref()
    }

    pub fn startup_token(&self) -> Option<Token> {
        self.startup_token
    }

    pub fn special_types(&self) -> &[Token] {
        &self.special_types
    }

    pub fn initializer_order(&self) -> &[InitRecord] {
        &self.init_sequence
    }

    fn mint_synthetic(&mut self) -> SrcMethodId {
        let id = SrcMethodId(self.next_synthetic);
        self.next_synthetic += 1;
        id
    }

    /// Crystallize the image: dispatch resolution, initializer ordering,
    /// partial-replacement dedup, startup synthesis, memory estimate.
    pub fn finalize(
        &mut self,
        reader: &dyn ImageReader,
        registry: &ReplacementRegistry,
        settings: &CompileSettings,
    ) -> Result<()> {
        if self.finalized {
            return Ok(());
        }

        self.dedup_partial_replacements(registry);
        self.build_type_records(reader)?;
        self.bind_array_enumerators(reader);
        self.sequence_initializers(reader, settings);
        self.synthesize_startup(reader)?;
        self.collect_special_types(reader);
        self.log_memory_estimate();

        self.finalized = true;
        Ok(())
    }

    /// A partially-replaced type is walked both as the original and as the
    /// substitute; both records share one token. Keep the original.
    fn dedup_partial_replacements(&mut self, registry: &ReplacementRegistry) {
        let duplicates: Vec<SrcTypeId> = self
            .types
            .keys()
            .copied()
            .filter(|&src| {
                registry
                    .original_of(src)
                    .is_some_and(|original| original != src && self.types.contains_key(&original))
            })
            .collect();
        for substitute in duplicates {
            self.types.shift_remove(&substitute);
        }
    }

    fn build_type_records(&mut self, reader: &dyn ImageReader) -> Result<()> {
        let layout = LayoutEngine::new(reader);
        let method_set: IndexSet<SrcMethodId> = self.methods.keys().copied().collect();
        let type_ids: Vec<SrcTypeId> = self.types.keys().copied().collect();

        for src in type_ids {
            let info = reader.type_info(src);
            let mut members: Vec<MemberEntry> = Vec::new();

            // Fields first, instance fields in layout-stable order.
            let mut field_ids = layout.ordered_instance_fields(src);
            field_ids.extend(
                info.fields
                    .iter()
                    .copied()
                    .filter(|&f| reader.field_info(f).is_static),
            );
            for f in field_ids {
                let field = reader.field_info(f);
                let slot = layout.classify(&field.sig)?;
                let token = self.allocator.field_token(f);
                self.fields.entry(f).or_insert(FieldRecord {
                    src: f,
                    token,
                    name: field.name.clone(),
                    slot,
                    is_static: field.is_static,
                    init_blob: self.blob_inits.get(&f).copied(),
                    constant: field.constant.clone(),
                });
                members.push(MemberEntry {
                    slot,
                    token,
                    base_tokens: Vec::new(),
                });
            }

            // Constructors next, then methods earning a dispatch slot.
            let mut ctor_entries = Vec::new();
            let mut slot_entries = Vec::new();
            for (&m, record) in &self.methods {
                // Compiler-minted methods have no metadata behind them.
                if m.0 >= SYNTHETIC_BASE {
                    continue;
                }
                let m_info = reader.method_info(m);
                if m_info.declaring != src {
                    continue;
                }
                if m_info.attrs.is_ctor {
                    ctor_entries.push(MemberEntry {
                        slot: Slot::new(SlotKind::MethodSlot, 0),
                        token: record.token,
                        base_tokens: Vec::new(),
                    });
                    continue;
                }
                if m_info.attrs.is_static || m_info.attrs.is_abstract {
                    continue;
                }
                let overridden = dispatch::overrides_of(reader, src, m, &self.suppressed);
                let base_tokens: Vec<Token> = overridden
                    .iter()
                    .filter(|o| method_set.contains(*o))
                    .filter_map(|o| self.allocator.existing_method_token(*o))
                    .collect();
                if !overridden.is_empty() && !base_tokens.is_empty() {
                    slot_entries.push(MemberEntry {
                        slot: Slot::new(SlotKind::MethodSlot, 0),
                        token: record.token,
                        base_tokens,
                    });
                }
            }
            members.extend(ctor_entries);
            members.extend(slot_entries);

            let parent = info
                .base
                .and_then(|base| self.allocator.existing_type_token(base));
            let interfaces: Vec<Token> = info
                .interfaces
                .iter()
                .filter(|i| self.types.contains_key(*i))
                .filter_map(|i| self.allocator.existing_type_token(*i))
                .collect();

            let record = self
                .types
                .get_mut(&src)
                .expect("type id came from this table");
            record.parent = parent;
            record.flags = ClassFlags {
                value_type: info.attrs.is_value_type,
                enumeration: info.attrs.is_enum,
                array: false,
            };
            record.instance_size = layout.instance_size(src)?;
            record.static_size = layout.static_size(src)?;
            record.members = members;
            record.interfaces = interfaces;
        }
        Ok(())
    }

    /// Arrays implement enumerable-of-T through an injected factory: bind
    /// the helper's producer to the interface's producer by token on every
    /// element type seen in the program.
    fn bind_array_enumerators(&mut self, reader: &dyn ImageReader) {
        let Some(helper_ty) = reader.find_type(well_known::ARRAY_HELPER) else {
            return;
        };
        let Some(iface_ty) = reader.find_type(well_known::ENUMERABLE) else {
            return;
        };
        let factory = reader
            .type_info(helper_ty)
            .methods
            .iter()
            .copied()
            .find(|&m| reader.method_info(m).name == well_known::ARRAY_ENUMERATOR_FACTORY);
        let producer = reader
            .type_info(iface_ty)
            .methods
            .iter()
            .copied()
            .find(|&m| reader.method_info(m).name == well_known::ENUMERABLE_PRODUCER);
        let (Some(factory), Some(producer)) = (factory, producer) else {
            return;
        };
        let (Some(factory_token), Some(producer_token)) = (
            self.allocator.existing_method_token(factory),
            self.allocator.existing_method_token(producer),
        ) else {
            return;
        };

        let elements: Vec<SrcTypeId> = self.array_elements.iter().copied().collect();
        for element in elements {
            if let Some(record) = self.types.get_mut(&element) {
                record.members.push(MemberEntry {
                    slot: Slot::new(SlotKind::MethodSlot, 0),
                    token: factory_token,
                    base_tokens: vec![producer_token],
                });
            }
        }
    }

    fn sequence_initializers(&mut self, reader: &dyn ImageReader, settings: &CompileSettings) {
        let mut records = Vec::new();
        for &src in self.methods.keys() {
            if src.0 >= SYNTHETIC_BASE {
                continue;
            }
            let info = reader.method_info(src);
            if !info.attrs.is_initializer {
                continue;
            }
            if self.suppressed.contains(&info.declaring) {
                continue;
            }
            if !self.types.contains_key(&info.declaring) {
                continue;
            }
            let ty_info = reader.type_info(info.declaring);
            records.push(InitRecord {
                ty: info.declaring,
                method: src,
                full_name: ty_info.full_name(),
                dependencies: ty_info.initializer_dependencies.clone(),
                calls: self
                    .initializer_calls
                    .get(&src)
                    .cloned()
                    .unwrap_or_default(),
            });
        }
        self.init_sequence = init_order::sequence(reader, records, &settings.sequencer);
    }

    fn synthesize_startup(&mut self, reader: &dyn ImageReader) -> Result<()> {
        let entry = self.entry.ok_or_else(|| CompileError::BadEntryPoint {
            method: "<none>".into(),
            reason: "no entry method chosen".into(),
        })?;
        let entry_record =
            self.methods
                .get(&entry)
                .ok_or_else(|| CompileError::TokenNotAssigned {
                    what: "entry method".into(),
                })?;
        let entry_token = entry_record.token;
        let entry_info = reader.method_info(entry);
        let entry_takes_args = matches!(
            entry_info.sig.params.as_slice(),
            [TypeSig::Array(elem)] if **elem == TypeSig::String
        );
        let entry_returns_value = !entry_info.sig.returns_void();

        let string_type = if entry_takes_args {
            let ty = reader.find_type(well_known::STRING).ok_or_else(|| {
                CompileError::BadEntryPoint {
                    method: entry_record.full_name.clone(),
                    reason: "argument array needs the string carrier type".into(),
                }
            })?;
            self.allocator.type_token(ty)
        } else {
            entry_token
        };

        let initializers: Vec<Token> = self
            .init_sequence
            .iter()
            .filter_map(|r| self.allocator.existing_method_token(r.method))
            .collect();

        let stub = StartupStub {
            initializers,
            user_entry: entry_token,
            entry_takes_args,
            string_type,
            entry_returns_value,
        };
        let code = stub.emit();
        let src = self.mint_synthetic();
        let token = self.allocator.method_token(src);
        self.methods.insert(
            src,
            MethodRecord {
                src,
                token,
                full_name: "<startup>".into(),
                flags: StartupStub::flags(),
                max_stack: 2,
                native_selector: 0,
                code: Some(code),
                locals: Vec::new(),
                args: Vec::new(),
            },
        );
        self.startup_token = Some(token);
        Ok(())
    }

    fn collect_special_types(&mut self, reader: &dyn ImageReader) {
        // Position in this list is the device's vocabulary; order is fixed.
        let names = [
            well_known::OBJECT,
            well_known::STRING,
            well_known::EXCEPTION,
            well_known::MULTICAST_DELEGATE,
            well_known::DATE_TIME,
            well_known::TIME_SPAN,
        ];
        self.special_types = names
            .iter()
            .filter_map(|name| reader.find_type(name))
            .filter_map(|ty| self.allocator.existing_type_token(ty))
            .collect();
    }

    fn log_memory_estimate(&self) {
        let code: usize = self
            .methods
            .values()
            .filter_map(|m| m.code.as_ref().map(Vec::len))
            .sum();
        let strings: usize = self.allocator.strings().map(|(_, s)| s.len() + 1).sum();
        let blobs: usize = self.allocator.blobs().map(|(_, b)| b.len()).sum();
        let statics: u32 = self.types.values().map(|t| t.static_size).sum();
        info!(
            code_bytes = code,
            string_bytes = strings,
            constant_bytes = blobs,
            static_bytes = statics,
            types = self.types.len(),
            methods = self.methods.len(),
            "estimated device memory"
        );
    }

    /// Class records in token order, the upload driver's phase-1 order.
    pub fn types_by_token(&self) -> Vec<&TypeRecord> {
        let mut records: Vec<&TypeRecord> = self.types.values().collect();
        records.sort_by_key(|r| r.token);
        records
    }

    /// Method records in token order.
    pub fn methods_by_token(&self) -> Vec<&MethodRecord> {
        let mut records: Vec<&MethodRecord> = self.methods.values().collect();
        records.sort_by_key(|r| r.token);
        records
    }

    /// Field records in token order.
    pub fn fields_by_token(&self) -> Vec<&FieldRecord> {
        let mut records: Vec<&FieldRecord> = self.fields.values().collect();
        records.sort_by_key(|r| r.token);
        records
    }

    /// Human-readable name behind a token, for diagnostics and device
    /// stack traces.
    pub fn token_name(&self, token: Token) -> Option<String> {
        match self.allocator.resolve(token)? {
            Owner::Type(t) => self.types.get(&t).map(|r| r.full_name.clone()),
            Owner::Method(m) => self.methods.get(&m).map(|r| r.full_name.clone()),
            Owner::Field(f) => self.fields.get(&f).map(|r| r.name.clone()),
            Owner::String(s) => Some(format!("{s:?}")),
            Owner::Blob(b) => Some(format!("<{} constant bytes>", b.len())),
        }
    }
}
