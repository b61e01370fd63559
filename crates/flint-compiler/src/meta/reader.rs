//! The program-image reader seam.
//!
//! Raw metadata access is abstracted behind [`ImageReader`]: given a method
//! it returns bytecode, locals, and arguments; given a raw token plus
//! generic context it returns the pointed-to handle. The compiler owns
//! nothing behind this trait.

use super::sig::{GenericContext, Signature, TypeSig};

/// Opaque handle to a type in the source metadata.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SrcTypeId(pub u32);

/// Opaque handle to a method in the source metadata.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SrcMethodId(pub u32);

/// Opaque handle to a field in the source metadata.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SrcFieldId(pub u32);

/// What a raw bytecode operand resolved to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SrcRef {
    Type(SrcTypeId),
    Method(SrcMethodId),
    Field(SrcFieldId),
}

/// Type attributes relevant to the pipeline.
#[derive(Clone, Copy, Default, Debug)]
pub struct TypeAttrs {
    pub is_value_type: bool,
    pub is_enum: bool,
    pub is_interface: bool,
    pub is_abstract: bool,
}

/// Everything the compiler needs to know about a type.
#[derive(Clone, Debug)]
pub struct TypeInfo {
    pub name: String,
    pub namespace: String,
    /// Defining assembly, used to tell apart per-assembly copies of
    /// duplicated internal types.
    pub assembly: String,
    pub base: Option<SrcTypeId>,
    pub attrs: TypeAttrs,
    /// Instance and static fields, declaration order.
    pub fields: Vec<SrcFieldId>,
    /// All declared methods, declaration order.
    pub methods: Vec<SrcMethodId>,
    pub interfaces: Vec<SrcTypeId>,
    /// Explicit interface-method-to-implementation pairs. Authoritative:
    /// where an entry exists, name-based matching must not run.
    pub interface_map: Vec<(SrcMethodId, SrcMethodId)>,
    /// Declared layout size, if a layout attribute carries one.
    pub layout_size: Option<u32>,
    /// Generic parameter count; zero for non-generic types.
    pub generic_arity: u16,
    /// Types this type's initializer declares a dependency on.
    pub initializer_dependencies: Vec<SrcTypeId>,
}

impl TypeInfo {
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// Method attributes relevant to the pipeline.
#[derive(Clone, Copy, Default, Debug)]
pub struct MethodAttrs {
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_abstract: bool,
    /// `newslot`: introduces a fresh slot, overrides nothing by name.
    pub is_newslot: bool,
    pub is_private: bool,
    pub is_ctor: bool,
    pub is_initializer: bool,
    pub is_special: bool,
}

/// Everything the compiler needs to know about a method.
#[derive(Clone, Debug)]
pub struct MethodInfo {
    pub name: String,
    pub declaring: SrcTypeId,
    pub sig: Signature,
    pub attrs: MethodAttrs,
    pub generic_arity: u16,
}

impl MethodInfo {
    /// Operator methods compare by name only.
    pub fn is_operator(&self) -> bool {
        self.name.starts_with("op_")
    }
}

/// Everything the compiler needs to know about a field.
#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: String,
    pub declaring: SrcTypeId,
    pub sig: TypeSig,
    pub is_static: bool,
    /// Compile-time constant payload (enum literals, folded initializers).
    pub constant: Option<Vec<u8>>,
}

/// A method body as the reader hands it over: unrewritten bytecode plus
/// slot types.
#[derive(Clone, Debug)]
pub struct MethodBody {
    pub max_stack: u16,
    pub code: Vec<u8>,
    pub locals: Vec<TypeSig>,
    /// Exception-handling clause count; clauses themselves stay with the
    /// reader.
    pub eh_clauses: u16,
}

/// Read-side interface over the source program's metadata.
///
/// Handle-taking accessors may panic on handles that did not come from this
/// reader; [`ImageReader::resolve`] is the only entry point for untrusted
/// raw values and returns `None` instead.
pub trait ImageReader {
    fn type_info(&self, ty: SrcTypeId) -> &TypeInfo;
    fn method_info(&self, method: SrcMethodId) -> &MethodInfo;
    fn field_info(&self, field: SrcFieldId) -> &FieldInfo;

    /// The method's bytecode, or `None` when it has no body (abstract,
    /// native, or stripped).
    fn method_body(&self, method: SrcMethodId) -> Option<&MethodBody>;

    /// Generic arguments bound on an instantiated type handle. Empty for
    /// non-generic types and for open definitions, whose parameters stay
    /// unresolvable.
    fn type_generic_args(&self, ty: SrcTypeId) -> &[TypeSig];

    /// Generic arguments bound on an instantiated method handle.
    fn method_generic_args(&self, method: SrcMethodId) -> &[TypeSig];

    /// Resolve a raw bytecode operand under a generic context. Scanning is
    /// permitted to over-read, so a failed resolution is `None`, never an
    /// error.
    fn resolve(&self, raw: u32, ctx: &GenericContext) -> Option<SrcRef>;

    /// The string literal behind a raw string-token operand.
    fn string_literal(&self, raw: u32) -> Option<&str>;

    /// The embedded static-initializer payload of a field, extracted via
    /// the runtime's blob-init helper. The payload length is encoded in the
    /// synthetic name of the field's value type.
    fn field_blob(&self, field: SrcFieldId) -> Option<&[u8]>;

    /// All types, every assembly, declaration order.
    fn all_types(&self) -> Vec<SrcTypeId>;

    /// Look up a type by full name anywhere in the program.
    fn find_type(&self, full_name: &str) -> Option<SrcTypeId>;

    /// Look up a type by full name in one named assembly. Duplicated
    /// internal types resolve differently per assembly.
    fn find_type_in(&self, assembly: &str, full_name: &str) -> Option<SrcTypeId>;
}

/// Reader-level helpers shared across pipeline stages.
pub(crate) fn find_method_by_name<'r>(
    reader: &'r dyn ImageReader,
    ty: SrcTypeId,
    name: &str,
) -> impl Iterator<Item = SrcMethodId> + 'r {
    let name = name.to_owned();
    reader
        .type_info(ty)
        .methods
        .clone()
        .into_iter()
        .filter(move |&m| reader.method_info(m).name == name)
}

/// Whether a type declares any static fields. Callee types owning statics
/// must enter the set even when no bytecode names their fields.
pub(crate) fn has_static_fields(reader: &dyn ImageReader, ty: SrcTypeId) -> bool {
    reader
        .type_info(ty)
        .fields
        .iter()
        .any(|&f| reader.field_info(f).is_static)
}
