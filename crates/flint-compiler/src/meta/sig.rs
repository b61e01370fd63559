//! Structural type signatures.
//!
//! Method identity is signature equality within a type, with two escape
//! hatches: signatures mentioning substituted internal types compare by
//! type name, and operator methods compare by name only (handled one level
//! up, in method matching).

use super::reader::{ImageReader, SrcTypeId};

/// A structural reference to a type as it appears in signatures, locals,
/// and field types.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeSig {
    Void,
    Bool,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    /// The text-string carrier type.
    String,
    /// `System.Object`.
    Object,
    /// A reference type by handle.
    Class(SrcTypeId),
    /// A value type by handle.
    Value(SrcTypeId),
    /// Single-dimension, zero-based array.
    Array(Box<TypeSig>),
    /// Managed pointer to a variable.
    ByRef(Box<TypeSig>),
    FnPtr,
    /// Generic parameter of the declaring type.
    TypeParam(u16),
    /// Generic parameter of the method.
    MethodParam(u16),
    /// Instantiation of a generic template.
    Inst(SrcTypeId, Vec<TypeSig>),
}

impl TypeSig {
    pub fn array(elem: TypeSig) -> Self {
        Self::Array(Box::new(elem))
    }

    pub fn byref(inner: TypeSig) -> Self {
        Self::ByRef(Box::new(inner))
    }

    /// The named type handle this signature points at, if any.
    pub fn type_id(&self) -> Option<SrcTypeId> {
        match self {
            Self::Class(t) | Self::Value(t) | Self::Inst(t, _) => Some(*t),
            _ => None,
        }
    }

    /// Whether a slot of this signature holds a reference.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Self::String | Self::Object | Self::Class(_) | Self::Array(_) | Self::ByRef(_)
        )
    }
}

/// A method signature: parameter types and return type. Does not include
/// the implicit `this`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Signature {
    pub params: Vec<TypeSig>,
    pub ret: TypeSig,
}

impl Signature {
    pub fn new(params: Vec<TypeSig>, ret: TypeSig) -> Self {
        Self { params, ret }
    }

    pub fn returns_void(&self) -> bool {
        self.ret == TypeSig::Void
    }
}

/// Generic arguments in scope while resolving references inside a method.
///
/// References inside generic definitions cannot be resolved without this.
#[derive(Clone, Default, Debug)]
pub struct GenericContext {
    pub type_args: Vec<TypeSig>,
    pub method_args: Vec<TypeSig>,
}

impl GenericContext {
    /// Substitute generic parameters with the arguments in scope.
    /// Parameters with no binding are returned unchanged.
    pub fn instantiate(&self, sig: &TypeSig) -> TypeSig {
        match sig {
            TypeSig::TypeParam(i) => self
                .type_args
                .get(*i as usize)
                .cloned()
                .unwrap_or_else(|| sig.clone()),
            TypeSig::MethodParam(i) => self
                .method_args
                .get(*i as usize)
                .cloned()
                .unwrap_or_else(|| sig.clone()),
            TypeSig::Array(elem) => TypeSig::array(self.instantiate(elem)),
            TypeSig::ByRef(inner) => TypeSig::byref(self.instantiate(inner)),
            TypeSig::Inst(template, args) => TypeSig::Inst(
                *template,
                args.iter().map(|a| self.instantiate(a)).collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Structural equality with the by-name escape hatch: two named types match
/// when their handles are equal or, failing that, when their full names are
/// equal. Substituted internal types are duplicated across assemblies, so
/// handle identity alone is too strict.
pub fn type_sig_matches(reader: &dyn ImageReader, a: &TypeSig, b: &TypeSig) -> bool {
    match (a, b) {
        (TypeSig::Array(x), TypeSig::Array(y)) | (TypeSig::ByRef(x), TypeSig::ByRef(y)) => {
            type_sig_matches(reader, x, y)
        }
        (TypeSig::Inst(t, xs), TypeSig::Inst(u, ys)) => {
            (t == u || named_equal(reader, *t, *u))
                && xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys)
                    .all(|(x, y)| type_sig_matches(reader, x, y))
        }
        (TypeSig::Class(t), TypeSig::Class(u)) | (TypeSig::Value(t), TypeSig::Value(u)) => {
            t == u || named_equal(reader, *t, *u)
        }
        _ => a == b,
    }
}

fn named_equal(reader: &dyn ImageReader, a: SrcTypeId, b: SrcTypeId) -> bool {
    reader.type_info(a).full_name() == reader.type_info(b).full_name()
}

/// Signature equality under [`type_sig_matches`].
pub fn sig_matches(reader: &dyn ImageReader, a: &Signature, b: &Signature) -> bool {
    a.params.len() == b.params.len()
        && type_sig_matches(reader, &a.ret, &b.ret)
        && a.params
            .iter()
            .zip(&b.params)
            .all(|(x, y)| type_sig_matches(reader, x, y))
}
