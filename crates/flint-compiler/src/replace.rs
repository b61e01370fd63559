//! Platform-type substitution registry.
//!
//! Substitutes are microcontroller-friendly reimplementations of platform
//! types, declared as data: each record names a target type, a substitute
//! type, and three booleans; each substituted member carries either a
//! native-method selector or "use this body". The registry resolves the
//! declarations once at construction and is immutable afterwards.

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::error::{CompileError, Result};
use crate::meta::find_method_by_name;
use crate::meta::well_known;
use crate::meta::{ImageReader, SrcMethodId, SrcTypeId};
use crate::meta::{sig_matches, Signature};

/// How a substituted method is realized on the device.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Hook {
    /// No native hook; upload the substitute's body.
    UseBody,
    /// Positive selector of a built-in device implementation.
    Native(u16),
}

/// One substituted member, named on the substitute type.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MemberDecl {
    /// Method name on the substitute type. All overloads with this name
    /// participate; each must match a target member.
    pub name: String,
    pub hook: Hook,
}

/// One substitution record.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReplacementDecl {
    /// Full name of the platform type being replaced.
    pub target: String,
    /// Full name of the substitute type.
    pub substitute: String,
    /// Replace the entire type rather than specific members.
    pub replace_type: bool,
    /// Extend the replacement to subclasses of the target.
    pub include_subclasses: bool,
    /// Match private target members too.
    pub include_privates: bool,
    #[serde(default)]
    pub members: Vec<MemberDecl>,
}

/// Resolved type-level replacement.
#[derive(Clone, Copy, Debug)]
pub struct TypeReplacement {
    pub substitute: SrcTypeId,
    pub replace_type: bool,
    pub include_subclasses: bool,
    pub include_privates: bool,
}

/// Resolved method-level replacement, keyed by the target method.
#[derive(Clone, Copy, Debug)]
pub struct MethodReplacement {
    pub substitute: SrcMethodId,
    pub hook: Hook,
}

/// The resolved substitution tables.
#[derive(Default, Debug)]
pub struct ReplacementRegistry {
    types: IndexMap<SrcTypeId, TypeReplacement>,
    methods: IndexMap<SrcMethodId, MethodReplacement>,
    /// Substitute type -> the original it stands for.
    originals: IndexMap<SrcTypeId, SrcTypeId>,
    /// Selectors keyed by the *substitute* method, for methods that have
    /// a native hook instead of a body.
    selectors: IndexMap<SrcMethodId, u16>,
}

impl ReplacementRegistry {
    /// Resolve a declaration list against the program.
    ///
    /// The interop shim is special-cased: its replacement is installed
    /// against every copy found in the declared system assemblies.
    pub fn build(reader: &dyn ImageReader, decls: &[ReplacementDecl]) -> Result<Self> {
        let mut registry = Self::default();
        for decl in decls {
            let substitute =
                reader
                    .find_type(&decl.substitute)
                    .ok_or_else(|| CompileError::MissingReplacementTarget {
                        substitute: decl.substitute.clone(),
                        target: decl.target.clone(),
                        member: "<type>".into(),
                    })?;

            let mut targets = Vec::new();
            if decl.target == well_known::INTEROP_SHIM {
                for assembly in well_known::SYSTEM_ASSEMBLIES {
                    if let Some(ty) = reader.find_type_in(assembly, &decl.target) {
                        targets.push(ty);
                    }
                }
            } else if let Some(ty) = reader.find_type(&decl.target) {
                targets.push(ty);
            }
            if targets.is_empty() {
                return Err(CompileError::MissingReplacementTarget {
                    substitute: decl.substitute.clone(),
                    target: decl.target.clone(),
                    member: "<type>".into(),
                });
            }

            for target in targets {
                registry.install(reader, decl, target, substitute)?;
            }
        }
        Ok(registry)
    }

    fn install(
        &mut self,
        reader: &dyn ImageReader,
        decl: &ReplacementDecl,
        target: SrcTypeId,
        substitute: SrcTypeId,
    ) -> Result<()> {
        debug!(
            target = %decl.target,
            substitute = %decl.substitute,
            full = decl.replace_type,
            "installing replacement"
        );
        self.types.insert(
            target,
            TypeReplacement {
                substitute,
                replace_type: decl.replace_type,
                include_subclasses: decl.include_subclasses,
                include_privates: decl.include_privates,
            },
        );
        self.originals.insert(substitute, target);

        for member in &decl.members {
            let mut matched_any = false;
            for sub_method in find_method_by_name(reader, substitute, &member.name) {
                let sub_info = reader.method_info(sub_method);
                let found = locate_target_member(
                    reader,
                    target,
                    &member.name,
                    &sub_info.sig,
                    sub_info.is_operator(),
                    decl.include_privates,
                );
                let Some(target_method) = found else {
                    return Err(CompileError::MissingReplacementTarget {
                        substitute: decl.substitute.clone(),
                        target: decl.target.clone(),
                        member: member.name.clone(),
                    });
                };
                self.methods.insert(
                    target_method,
                    MethodReplacement {
                        substitute: sub_method,
                        hook: member.hook,
                    },
                );
                if let Hook::Native(selector) = member.hook {
                    self.selectors.insert(sub_method, selector);
                }
                matched_any = true;
            }
            if !matched_any {
                // The substitute names a member it does not itself declare.
                return Err(CompileError::MissingReplacementTarget {
                    substitute: decl.substitute.clone(),
                    target: decl.target.clone(),
                    member: member.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Type-level replacement for `ty`, honoring subclass inclusion.
    pub fn for_type(&self, reader: &dyn ImageReader, ty: SrcTypeId) -> Option<&TypeReplacement> {
        if let Some(repl) = self.types.get(&ty) {
            return Some(repl);
        }
        // Walk the base chain looking for a replacement that includes
        // subclasses.
        let mut current = reader.type_info(ty).base;
        while let Some(base) = current {
            if let Some(repl) = self.types.get(&base) {
                if repl.include_subclasses {
                    return Some(repl);
                }
            }
            current = reader.type_info(base).base;
        }
        None
    }

    /// Method-level replacement for a target method.
    pub fn for_method(&self, method: SrcMethodId) -> Option<&MethodReplacement> {
        self.methods.get(&method)
    }

    /// Native selector of a substitute method, if it has a hook.
    pub fn native_selector(&self, method: SrcMethodId) -> Option<u16> {
        self.selectors.get(&method).copied()
    }

    /// The original a substitute type stands for.
    pub fn original_of(&self, substitute: SrcTypeId) -> Option<SrcTypeId> {
        self.originals.get(&substitute).copied()
    }

    /// Whether `ty` is fully replaced (never appears in the image).
    pub fn is_fully_replaced(&self, reader: &dyn ImageReader, ty: SrcTypeId) -> bool {
        self.for_type(reader, ty).is_some_and(|r| r.replace_type)
    }
}

/// Redirect a call target through the registry: method-level replacement
/// first, then the declaring type's full replacement (locating the
/// counterpart member on the substitute). A full type replacement with no
/// counterpart member is a declaration bug and fails loudly.
pub fn redirect_method(
    reader: &dyn ImageReader,
    registry: &ReplacementRegistry,
    method: SrcMethodId,
) -> Result<SrcMethodId> {
    if let Some(repl) = registry.for_method(method) {
        return Ok(repl.substitute);
    }
    let info = reader.method_info(method);
    if let Some(type_repl) = registry.for_type(reader, info.declaring) {
        if type_repl.replace_type {
            let found = locate_target_member(
                reader,
                type_repl.substitute,
                &info.name,
                &info.sig,
                info.is_operator(),
                true,
            );
            return found.ok_or_else(|| CompileError::MissingReplacementTarget {
                substitute: reader.type_info(type_repl.substitute).full_name(),
                target: reader.type_info(info.declaring).full_name(),
                member: info.name.clone(),
            });
        }
    }
    Ok(method)
}

/// Redirect a type through the registry: fully-replaced types never appear
/// in the image, their substitute does.
pub fn redirect_type(
    reader: &dyn ImageReader,
    registry: &ReplacementRegistry,
    ty: SrcTypeId,
) -> SrcTypeId {
    match registry.for_type(reader, ty) {
        Some(repl) if repl.replace_type => repl.substitute,
        _ => ty,
    }
}

/// Locate the target member matching a substitute member: signature
/// equality, or name-only for operators.
fn locate_target_member(
    reader: &dyn ImageReader,
    target: SrcTypeId,
    name: &str,
    sig: &Signature,
    is_operator: bool,
    include_privates: bool,
) -> Option<SrcMethodId> {
    for candidate in find_method_by_name(reader, target, name) {
        let info = reader.method_info(candidate);
        if info.attrs.is_private && !include_privates {
            continue;
        }
        if is_operator || sig_matches(reader, &info.sig, sig) {
            return Some(candidate);
        }
    }
    None
}
