//! In-memory program builder backing the pipeline tests.
//!
//! Builds a small metadata universe and implements [`ImageReader`] over
//! it, so tests can assemble bytecode with known raw operands and drive
//! the real pipeline end to end without any on-disk program.

use std::collections::HashMap;

use crate::meta::{
    FieldInfo, GenericContext, ImageReader, MethodAttrs, MethodBody, MethodInfo, Signature,
    SrcFieldId, SrcMethodId, SrcRef, SrcTypeId, TypeAttrs, TypeInfo, TypeSig,
};

/// Raw operand values handed out to test bytecode.
const RAW_REF_BASE: u32 = 0x7000_0000;
const RAW_STR_BASE: u32 = 0x7800_0000;

/// A buildable, queryable test program.
#[derive(Default)]
pub struct ProgramBuilder {
    types: Vec<TypeInfo>,
    methods: Vec<MethodInfo>,
    fields: Vec<FieldInfo>,
    bodies: HashMap<u32, MethodBody>,
    refs: HashMap<u32, SrcRef>,
    strings: HashMap<u32, String>,
    blobs: HashMap<u32, Vec<u8>>,
    type_args: HashMap<u32, Vec<TypeSig>>,
    method_args: HashMap<u32, Vec<TypeSig>>,
    next_ref: u32,
    next_str: u32,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, namespace: &str, name: &str, attrs: TypeAttrs) -> SrcTypeId {
        let id = SrcTypeId(self.types.len() as u32);
        self.types.push(TypeInfo {
            name: name.to_owned(),
            namespace: namespace.to_owned(),
            assembly: "test".to_owned(),
            base: None,
            attrs,
            fields: Vec::new(),
            methods: Vec::new(),
            interfaces: Vec::new(),
            interface_map: Vec::new(),
            layout_size: None,
            generic_arity: 0,
            initializer_dependencies: Vec::new(),
        });
        id
    }

    pub fn add_class(&mut self, namespace: &str, name: &str) -> SrcTypeId {
        self.add_type(namespace, name, TypeAttrs::default())
    }

    pub fn add_value_type(&mut self, namespace: &str, name: &str) -> SrcTypeId {
        self.add_type(
            namespace,
            name,
            TypeAttrs {
                is_value_type: true,
                ..Default::default()
            },
        )
    }

    pub fn add_interface(&mut self, namespace: &str, name: &str) -> SrcTypeId {
        self.add_type(
            namespace,
            name,
            TypeAttrs {
                is_interface: true,
                is_abstract: true,
                ..Default::default()
            },
        )
    }

    pub fn set_base(&mut self, ty: SrcTypeId, base: SrcTypeId) {
        self.types[ty.0 as usize].base = Some(base);
    }

    pub fn set_assembly(&mut self, ty: SrcTypeId, assembly: &str) {
        self.types[ty.0 as usize].assembly = assembly.to_owned();
    }

    pub fn set_layout_size(&mut self, ty: SrcTypeId, size: u32) {
        self.types[ty.0 as usize].layout_size = Some(size);
    }

    pub fn implement_interface(&mut self, ty: SrcTypeId, iface: SrcTypeId) {
        self.types[ty.0 as usize].interfaces.push(iface);
    }

    pub fn map_interface_method(
        &mut self,
        ty: SrcTypeId,
        iface_method: SrcMethodId,
        impl_method: SrcMethodId,
    ) {
        self.types[ty.0 as usize]
            .interface_map
            .push((iface_method, impl_method));
    }

    pub fn add_initializer_dependency(&mut self, ty: SrcTypeId, on: SrcTypeId) {
        self.types[ty.0 as usize].initializer_dependencies.push(on);
    }

    pub fn add_field(
        &mut self,
        ty: SrcTypeId,
        name: &str,
        sig: TypeSig,
        is_static: bool,
    ) -> SrcFieldId {
        let id = SrcFieldId(self.fields.len() as u32);
        self.fields.push(FieldInfo {
            name: name.to_owned(),
            declaring: ty,
            sig,
            is_static,
            constant: None,
        });
        self.types[ty.0 as usize].fields.push(id);
        id
    }

    pub fn add_method(
        &mut self,
        ty: SrcTypeId,
        name: &str,
        sig: Signature,
        attrs: MethodAttrs,
    ) -> SrcMethodId {
        let id = SrcMethodId(self.methods.len() as u32);
        self.methods.push(MethodInfo {
            name: name.to_owned(),
            declaring: ty,
            sig,
            attrs,
            generic_arity: 0,
        });
        self.types[ty.0 as usize].methods.push(id);
        id
    }

    /// A static method with no parameters.
    pub fn add_static_method(&mut self, ty: SrcTypeId, name: &str, ret: TypeSig) -> SrcMethodId {
        self.add_method(
            ty,
            name,
            Signature::new(vec![], ret),
            MethodAttrs {
                is_static: true,
                ..Default::default()
            },
        )
    }

    pub fn set_generic_arity(&mut self, method: SrcMethodId, arity: u16) {
        self.methods[method.0 as usize].generic_arity = arity;
    }

    /// Bind generic arguments on an instantiated type handle.
    pub fn bind_type_args(&mut self, ty: SrcTypeId, args: Vec<TypeSig>) {
        self.types[ty.0 as usize].generic_arity = args.len() as u16;
        self.type_args.insert(ty.0, args);
    }

    /// Bind generic arguments on an instantiated method handle.
    pub fn bind_method_args(&mut self, method: SrcMethodId, args: Vec<TypeSig>) {
        self.methods[method.0 as usize].generic_arity = args.len() as u16;
        self.method_args.insert(method.0, args);
    }

    pub fn set_body(&mut self, method: SrcMethodId, max_stack: u16, code: Vec<u8>) {
        self.set_body_with_locals(method, max_stack, Vec::new(), code);
    }

    pub fn set_body_with_locals(
        &mut self,
        method: SrcMethodId,
        max_stack: u16,
        locals: Vec<TypeSig>,
        code: Vec<u8>,
    ) {
        self.bodies.insert(
            method.0,
            MethodBody {
                max_stack,
                code,
                locals,
                eh_clauses: 0,
            },
        );
    }

    pub fn set_constant(&mut self, field: SrcFieldId, bytes: Vec<u8>) {
        self.fields[field.0 as usize].constant = Some(bytes);
    }

    pub fn set_blob(&mut self, field: SrcFieldId, bytes: Vec<u8>) {
        self.blobs.insert(field.0, bytes);
    }

    /// Register a raw operand value resolving to `target`.
    pub fn raw(&mut self, target: SrcRef) -> u32 {
        let raw = RAW_REF_BASE + self.next_ref;
        self.next_ref += 1;
        self.refs.insert(raw, target);
        raw
    }

    /// Register a raw string-token operand.
    pub fn raw_string(&mut self, s: &str) -> u32 {
        let raw = RAW_STR_BASE + self.next_str;
        self.next_str += 1;
        self.strings.insert(raw, s.to_owned());
        raw
    }
}

impl ImageReader for ProgramBuilder {
    fn type_info(&self, ty: SrcTypeId) -> &TypeInfo {
        &self.types[ty.0 as usize]
    }

    fn method_info(&self, method: SrcMethodId) -> &MethodInfo {
        &self.methods[method.0 as usize]
    }

    fn field_info(&self, field: SrcFieldId) -> &FieldInfo {
        &self.fields[field.0 as usize]
    }

    fn method_body(&self, method: SrcMethodId) -> Option<&MethodBody> {
        self.bodies.get(&method.0)
    }

    fn type_generic_args(&self, ty: SrcTypeId) -> &[TypeSig] {
        self.type_args.get(&ty.0).map_or(&[], Vec::as_slice)
    }

    fn method_generic_args(&self, method: SrcMethodId) -> &[TypeSig] {
        self.method_args.get(&method.0).map_or(&[], Vec::as_slice)
    }

    fn resolve(&self, raw: u32, _ctx: &GenericContext) -> Option<SrcRef> {
        self.refs.get(&raw).copied()
    }

    fn string_literal(&self, raw: u32) -> Option<&str> {
        self.strings.get(&raw).map(String::as_str)
    }

    fn field_blob(&self, field: SrcFieldId) -> Option<&[u8]> {
        self.blobs.get(&field.0).map(Vec::as_slice)
    }

    fn all_types(&self) -> Vec<SrcTypeId> {
        (0..self.types.len() as u32).map(SrcTypeId).collect()
    }

    fn find_type(&self, full_name: &str) -> Option<SrcTypeId> {
        self.types
            .iter()
            .position(|t| t.full_name() == full_name)
            .map(|i| SrcTypeId(i as u32))
    }

    fn find_type_in(&self, assembly: &str, full_name: &str) -> Option<SrcTypeId> {
        self.types
            .iter()
            .position(|t| t.assembly == assembly && t.full_name() == full_name)
            .map(|i| SrcTypeId(i as u32))
    }
}

/// Tiny bytecode assembler for test bodies.
#[derive(Default)]
pub struct Asm {
    code: Vec<u8>,
}

impl Asm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, op: u8) -> Self {
        self.code.push(op);
        self
    }

    fn with_u32(mut self, op: u8, operand: u32) -> Self {
        self.code.push(op);
        self.code.extend_from_slice(&operand.to_le_bytes());
        self
    }

    pub fn ldarg_0(self) -> Self {
        self.op(0x02)
    }

    pub fn ldarg_1(self) -> Self {
        self.op(0x03)
    }

    pub fn ldc_i4_0(self) -> Self {
        self.op(0x16)
    }

    pub fn ldc_i4_1(self) -> Self {
        self.op(0x17)
    }

    pub fn ldc_i4_2(self) -> Self {
        self.op(0x18)
    }

    pub fn ldc_i4(self, v: i32) -> Self {
        self.with_u32(0x20, v as u32)
    }

    pub fn pop(self) -> Self {
        self.op(0x26)
    }

    pub fn ret(self) -> Self {
        self.op(0x2A)
    }

    pub fn call(self, raw: u32) -> Self {
        self.with_u32(0x28, raw)
    }

    pub fn callvirt(self, raw: u32) -> Self {
        self.with_u32(0x6F, raw)
    }

    pub fn newobj(self, raw: u32) -> Self {
        self.with_u32(0x73, raw)
    }

    pub fn ldstr(self, raw: u32) -> Self {
        self.with_u32(0x72, raw)
    }

    pub fn ldfld(self, raw: u32) -> Self {
        self.with_u32(0x7B, raw)
    }

    pub fn stfld(self, raw: u32) -> Self {
        self.with_u32(0x7D, raw)
    }

    pub fn ldsfld(self, raw: u32) -> Self {
        self.with_u32(0x7E, raw)
    }

    pub fn stsfld(self, raw: u32) -> Self {
        self.with_u32(0x80, raw)
    }

    pub fn newarr(self, raw: u32) -> Self {
        self.with_u32(0x8D, raw)
    }

    pub fn ldtoken(self, raw: u32) -> Self {
        self.with_u32(0xD0, raw)
    }

    pub fn castclass(self, raw: u32) -> Self {
        self.with_u32(0x74, raw)
    }

    pub fn box_(self, raw: u32) -> Self {
        self.with_u32(0x8C, raw)
    }

    pub fn ldelem_i4(self) -> Self {
        self.op(0x94)
    }

    pub fn stelem_i4(self) -> Self {
        self.op(0x9E)
    }

    pub fn dup(self) -> Self {
        self.op(0x25)
    }

    pub fn div(self) -> Self {
        self.op(0x5B)
    }

    pub fn switch(mut self, targets: &[i32]) -> Self {
        self.code.push(0x45);
        self.code
            .extend_from_slice(&(targets.len() as u32).to_le_bytes());
        for t in targets {
            self.code.extend_from_slice(&(*t as u32).to_le_bytes());
        }
        self
    }

    pub fn br_s(mut self, disp: i8) -> Self {
        self.code.push(0x2B);
        self.code.push(disp as u8);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.code
    }
}
