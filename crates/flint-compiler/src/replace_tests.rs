use crate::error::CompileError;
use crate::meta::{MethodAttrs, Signature, TypeSig};
use crate::replace::{
    redirect_method, redirect_type, Hook, MemberDecl, ReplacementDecl, ReplacementRegistry,
};
use crate::test_utils::ProgramBuilder;

fn static_attrs() -> MethodAttrs {
    MethodAttrs {
        is_static: true,
        ..Default::default()
    }
}

#[test]
fn member_with_no_target_match_fails_loudly() {
    let mut p = ProgramBuilder::new();
    let target = p.add_class("System", "Console");
    p.add_method(
        target,
        "Write",
        Signature::new(vec![TypeSig::String], TypeSig::Void),
        static_attrs(),
    );
    let substitute = p.add_class("Device", "Console");
    // Signature differs from every target overload.
    p.add_method(
        substitute,
        "Write",
        Signature::new(vec![TypeSig::I4], TypeSig::Void),
        static_attrs(),
    );

    let decls = [ReplacementDecl {
        target: "System.Console".into(),
        substitute: "Device.Console".into(),
        replace_type: false,
        include_subclasses: false,
        include_privates: false,
        members: vec![MemberDecl {
            name: "Write".into(),
            hook: Hook::UseBody,
        }],
    }];
    let err = ReplacementRegistry::build(&p, &decls).unwrap_err();
    match err {
        CompileError::MissingReplacementTarget {
            substitute, member, ..
        } => {
            assert_eq!(substitute, "Device.Console");
            assert_eq!(member, "Write");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn private_target_needs_include_privates() {
    let mut p = ProgramBuilder::new();
    let target = p.add_class("System", "Buffer");
    p.add_method(
        target,
        "Grow",
        Signature::new(vec![], TypeSig::Void),
        MethodAttrs {
            is_static: true,
            is_private: true,
            ..Default::default()
        },
    );
    let substitute = p.add_class("Device", "Buffer");
    p.add_method(
        substitute,
        "Grow",
        Signature::new(vec![], TypeSig::Void),
        static_attrs(),
    );

    let mut decl = ReplacementDecl {
        target: "System.Buffer".into(),
        substitute: "Device.Buffer".into(),
        replace_type: false,
        include_subclasses: false,
        include_privates: false,
        members: vec![MemberDecl {
            name: "Grow".into(),
            hook: Hook::UseBody,
        }],
    };
    assert!(ReplacementRegistry::build(&p, std::slice::from_ref(&decl)).is_err());

    decl.include_privates = true;
    assert!(ReplacementRegistry::build(&p, std::slice::from_ref(&decl)).is_ok());
}

#[test]
fn operator_members_match_by_name() {
    let mut p = ProgramBuilder::new();
    let target = p.add_class("System", "Decimal");
    let target_op = p.add_method(
        target,
        "op_Addition",
        Signature::new(vec![TypeSig::Value(target), TypeSig::Value(target)], TypeSig::Value(target)),
        static_attrs(),
    );
    let substitute = p.add_class("Device", "Decimal");
    p.add_method(
        substitute,
        "op_Addition",
        Signature::new(vec![TypeSig::I8, TypeSig::I8], TypeSig::I8),
        static_attrs(),
    );

    let decls = [ReplacementDecl {
        target: "System.Decimal".into(),
        substitute: "Device.Decimal".into(),
        replace_type: false,
        include_subclasses: false,
        include_privates: false,
        members: vec![MemberDecl {
            name: "op_Addition".into(),
            hook: Hook::UseBody,
        }],
    }];
    let registry = ReplacementRegistry::build(&p, &decls).unwrap();
    assert!(registry.for_method(target_op).is_some());
}

#[test]
fn subclass_inclusion_extends_down_the_chain() {
    let mut p = ProgramBuilder::new();
    let base = p.add_class("System", "Stream");
    let derived = p.add_class("System", "FileStream");
    p.set_base(derived, base);
    let unrelated = p.add_class("System", "Socket");
    let substitute = p.add_class("Device", "Stream");

    let decls = [ReplacementDecl {
        target: "System.Stream".into(),
        substitute: "Device.Stream".into(),
        replace_type: true,
        include_subclasses: true,
        include_privates: false,
        members: vec![],
    }];
    let registry = ReplacementRegistry::build(&p, &decls).unwrap();

    assert_eq!(redirect_type(&p, &registry, base), substitute);
    assert_eq!(redirect_type(&p, &registry, derived), substitute);
    assert_eq!(redirect_type(&p, &registry, unrelated), unrelated);
}

#[test]
fn without_subclass_inclusion_only_the_target_is_hit() {
    let mut p = ProgramBuilder::new();
    let base = p.add_class("System", "Stream");
    let derived = p.add_class("System", "FileStream");
    p.set_base(derived, base);
    let substitute = p.add_class("Device", "Stream");

    let decls = [ReplacementDecl {
        target: "System.Stream".into(),
        substitute: "Device.Stream".into(),
        replace_type: true,
        include_subclasses: false,
        include_privates: false,
        members: vec![],
    }];
    let registry = ReplacementRegistry::build(&p, &decls).unwrap();

    assert_eq!(redirect_type(&p, &registry, base), substitute);
    assert_eq!(redirect_type(&p, &registry, derived), derived);
}

#[test]
fn interop_shim_installs_against_every_assembly_copy() {
    let mut p = ProgramBuilder::new();
    let copy_a = p.add_class("System.Runtime.InteropServices", "NativeShim");
    p.set_assembly(copy_a, "System.Runtime");
    let copy_b = p.add_class("System.Runtime.InteropServices", "NativeShim");
    p.set_assembly(copy_b, "System.Private.CoreLib");
    let substitute = p.add_class("Device", "NativeShim");

    let decls = [ReplacementDecl {
        target: "System.Runtime.InteropServices.NativeShim".into(),
        substitute: "Device.NativeShim".into(),
        replace_type: true,
        include_subclasses: false,
        include_privates: false,
        members: vec![],
    }];
    let registry = ReplacementRegistry::build(&p, &decls).unwrap();

    // Both copies redirect to the one substitute.
    assert_eq!(redirect_type(&p, &registry, copy_a), substitute);
    assert_eq!(redirect_type(&p, &registry, copy_b), substitute);
}

#[test]
fn full_type_replacement_redirects_unlisted_methods_by_signature() {
    let mut p = ProgramBuilder::new();
    let target = p.add_class("System", "Console");
    let target_write = p.add_method(
        target,
        "Write",
        Signature::new(vec![TypeSig::String], TypeSig::Void),
        static_attrs(),
    );
    let substitute = p.add_class("Device", "Console");
    let sub_write = p.add_method(
        substitute,
        "Write",
        Signature::new(vec![TypeSig::String], TypeSig::Void),
        static_attrs(),
    );

    let decls = [ReplacementDecl {
        target: "System.Console".into(),
        substitute: "Device.Console".into(),
        replace_type: true,
        include_subclasses: false,
        include_privates: false,
        members: vec![],
    }];
    let registry = ReplacementRegistry::build(&p, &decls).unwrap();

    assert_eq!(redirect_method(&p, &registry, target_write).unwrap(), sub_write);
    // A method with no counterpart on the substitute is a declaration bug.
    let orphan = p.add_method(
        target,
        "Beep",
        Signature::new(vec![], TypeSig::Void),
        static_attrs(),
    );
    assert!(redirect_method(&p, &registry, orphan).is_err());
}

#[test]
fn declarations_deserialize_from_the_build_table() {
    let json = r#"{
        "target": "System.Console",
        "substitute": "Device.Console",
        "replace-type": false,
        "include-subclasses": false,
        "include-privates": true,
        "members": [
            { "name": "Write", "hook": "use-body" },
            { "name": "Beep", "hook": { "native": 12 } }
        ]
    }"#;
    let decl: ReplacementDecl = serde_json::from_str(json).unwrap();
    assert_eq!(decl.target, "System.Console");
    assert!(decl.include_privates);
    assert_eq!(decl.members.len(), 2);
    assert!(matches!(decl.members[1].hook, Hook::Native(12)));
}
