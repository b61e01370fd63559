//! Flat token allocation.
//!
//! Each reachable entity gets a monotonic index inside its kind's
//! sub-range on first request; repeated requests return the same token.
//! Insertion order is allocation order is upload order, so the tables
//! double as the image's string and constant pools.
//!
//! A partially-replaced type is processed twice, once as the original and
//! once as the substitute; aliasing the substitute's handle onto the
//! original's token is what lets the end-of-compile dedup match the pair.

use indexmap::IndexMap;
use std::collections::HashMap;

use flint_image::{Token, TokenKind};

use crate::meta::{SrcFieldId, SrcMethodId, SrcRef, SrcTypeId};

/// Inverse-lookup result: the descriptor or payload a token names.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Owner<'a> {
    Type(SrcTypeId),
    Method(SrcMethodId),
    Field(SrcFieldId),
    String(&'a str),
    Blob(&'a [u8]),
}

/// Assigns image tokens and answers inverse lookups.
#[derive(Clone, Default, Debug)]
pub struct TokenAllocator {
    types: IndexMap<SrcTypeId, Token>,
    methods: IndexMap<SrcMethodId, Token>,
    fields: IndexMap<SrcFieldId, Token>,
    strings: IndexMap<String, Token>,
    blobs: IndexMap<Vec<u8>, Token>,
    /// Substitute handle -> canonical handle for partially-replaced types.
    type_aliases: HashMap<SrcTypeId, SrcTypeId>,
}

impl TokenAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `substitute` shares the canonical type's token.
    pub fn alias_type(&mut self, substitute: SrcTypeId, canonical: SrcTypeId) {
        self.type_aliases.insert(substitute, canonical);
    }

    /// The canonical handle behind a possibly-aliased one.
    pub fn canonical_type(&self, ty: SrcTypeId) -> SrcTypeId {
        *self.type_aliases.get(&ty).unwrap_or(&ty)
    }

    pub fn type_token(&mut self, ty: SrcTypeId) -> Token {
        let canonical = self.canonical_type(ty);
        let next = self.types.len() as u32;
        *self
            .types
            .entry(canonical)
            .or_insert_with(|| Token::new(TokenKind::Type, next))
    }

    pub fn method_token(&mut self, method: SrcMethodId) -> Token {
        let next = self.methods.len() as u32;
        *self
            .methods
            .entry(method)
            .or_insert_with(|| Token::new(TokenKind::Method, next))
    }

    pub fn field_token(&mut self, field: SrcFieldId) -> Token {
        let next = self.fields.len() as u32;
        *self
            .fields
            .entry(field)
            .or_insert_with(|| Token::new(TokenKind::Field, next))
    }

    /// Intern a string literal into the image string table.
    pub fn string_token(&mut self, s: &str) -> Token {
        if let Some(&tok) = self.strings.get(s) {
            return tok;
        }
        let tok = Token::new(TokenKind::String, self.strings.len() as u32);
        self.strings.insert(s.to_owned(), tok);
        tok
    }

    /// Intern a constant payload into the image blob table.
    pub fn blob_token(&mut self, bytes: &[u8]) -> Token {
        if let Some(&tok) = self.blobs.get(bytes) {
            return tok;
        }
        let tok = Token::new(TokenKind::Blob, self.blobs.len() as u32);
        self.blobs.insert(bytes.to_vec(), tok);
        tok
    }

    /// Token already assigned to a type, without allocating.
    pub fn existing_type_token(&self, ty: SrcTypeId) -> Option<Token> {
        self.types.get(&self.canonical_type(ty)).copied()
    }

    pub fn existing_method_token(&self, method: SrcMethodId) -> Option<Token> {
        self.methods.get(&method).copied()
    }

    pub fn existing_field_token(&self, field: SrcFieldId) -> Option<Token> {
        self.fields.get(&field).copied()
    }

    /// Inverse resolution: the owner of an assigned token.
    ///
    /// Indices are allocation-ordered, so the token's own index addresses
    /// the kind table directly.
    pub fn resolve(&self, token: Token) -> Option<Owner<'_>> {
        let i = token.index() as usize;
        match token.kind() {
            TokenKind::Type => self.types.get_index(i).map(|(&ty, _)| Owner::Type(ty)),
            TokenKind::Method => self.methods.get_index(i).map(|(&m, _)| Owner::Method(m)),
            TokenKind::Field => self.fields.get_index(i).map(|(&f, _)| Owner::Field(f)),
            TokenKind::String => self
                .strings
                .get_index(i)
                .map(|(s, _)| Owner::String(s.as_str())),
            TokenKind::Blob => self
                .blobs
                .get_index(i)
                .map(|(b, _)| Owner::Blob(b.as_slice())),
        }
    }

    /// Inverse resolution narrowed to descriptors.
    pub fn resolve_ref(&self, token: Token) -> Option<SrcRef> {
        match self.resolve(token)? {
            Owner::Type(t) => Some(SrcRef::Type(t)),
            Owner::Method(m) => Some(SrcRef::Method(m)),
            Owner::Field(f) => Some(SrcRef::Field(f)),
            Owner::String(_) | Owner::Blob(_) => None,
        }
    }

    /// Interned strings in token order.
    pub fn strings(&self) -> impl Iterator<Item = (Token, &str)> {
        self.strings.iter().map(|(s, &tok)| (tok, s.as_str()))
    }

    /// Interned constant payloads in token order.
    pub fn blobs(&self) -> impl Iterator<Item = (Token, &[u8])> {
        self.blobs.iter().map(|(b, &tok)| (tok, b.as_slice()))
    }

    /// Every token assigned so far, all kinds.
    pub fn assigned(&self) -> impl Iterator<Item = Token> + '_ {
        self.types
            .values()
            .chain(self.methods.values())
            .chain(self.fields.values())
            .chain(self.strings.values())
            .chain(self.blobs.values())
            .copied()
    }

    /// Tokens of the string sub-range only.
    pub fn assigned_strings(&self) -> impl Iterator<Item = Token> + '_ {
        self.strings.values().copied()
    }
}

#[cfg(test)]
mod tokens_tests {
    use super::*;

    #[test]
    fn repeated_requests_are_stable() {
        let mut alloc = TokenAllocator::new();
        let a = alloc.method_token(SrcMethodId(7));
        let b = alloc.method_token(SrcMethodId(7));
        assert_eq!(a, b);
        assert_eq!(a.index(), 0);
    }

    #[test]
    fn distinct_descriptors_never_share() {
        let mut alloc = TokenAllocator::new();
        let a = alloc.field_token(SrcFieldId(1));
        let b = alloc.field_token(SrcFieldId(2));
        assert_ne!(a, b);
    }

    #[test]
    fn kinds_use_separate_ranges() {
        let mut alloc = TokenAllocator::new();
        let ty = alloc.type_token(SrcTypeId(0));
        let m = alloc.method_token(SrcMethodId(0));
        assert_ne!(ty, m);
        assert_eq!(ty.kind(), TokenKind::Type);
        assert_eq!(m.kind(), TokenKind::Method);
    }

    #[test]
    fn inverse_roundtrip() {
        let mut alloc = TokenAllocator::new();
        let ty = alloc.type_token(SrcTypeId(3));
        let m = alloc.method_token(SrcMethodId(4));
        let s = alloc.string_token("hello");
        assert_eq!(alloc.resolve(ty), Some(Owner::Type(SrcTypeId(3))));
        assert_eq!(alloc.resolve(m), Some(Owner::Method(SrcMethodId(4))));
        assert_eq!(alloc.resolve(s), Some(Owner::String("hello")));
        // Round-trip: allocating again yields the resolved token.
        assert_eq!(alloc.string_token("hello"), s);
    }

    #[test]
    fn string_interning_deduplicates() {
        let mut alloc = TokenAllocator::new();
        let a = alloc.string_token("x");
        let b = alloc.string_token("x");
        let c = alloc.string_token("y");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn blob_interning_deduplicates() {
        let mut alloc = TokenAllocator::new();
        let a = alloc.blob_token(&[1, 2, 3]);
        let b = alloc.blob_token(&[1, 2, 3]);
        assert_eq!(a, b);
        assert_eq!(alloc.resolve(a), Some(Owner::Blob(&[1u8, 2, 3][..])));
    }

    #[test]
    fn aliased_type_shares_token() {
        let mut alloc = TokenAllocator::new();
        let original = SrcTypeId(1);
        let substitute = SrcTypeId(9);
        let tok = alloc.type_token(original);
        alloc.alias_type(substitute, original);
        assert_eq!(alloc.type_token(substitute), tok);
        // Inverse keeps the original descriptor.
        assert_eq!(alloc.resolve(tok), Some(Owner::Type(original)));
    }

    #[test]
    fn unassigned_token_resolves_to_none() {
        let alloc = TokenAllocator::new();
        let tok = Token::new(TokenKind::Method, 5);
        assert_eq!(alloc.resolve(tok), None);
    }
}
