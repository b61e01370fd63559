use crate::error::CompileError;
use crate::meta::{MethodAttrs, Signature, SrcRef, TypeSig};
use crate::replace::{Hook, MemberDecl, ReplacementDecl, ReplacementRegistry};
use crate::set::ExecutionSet;
use crate::settings::CompileSettings;
use crate::test_utils::{Asm, ProgramBuilder};
use crate::walk::DependencyWalker;

fn registry(p: &ProgramBuilder) -> ReplacementRegistry {
    ReplacementRegistry::build(p, &[]).unwrap()
}

fn walk(
    p: &ProgramBuilder,
    reg: &ReplacementRegistry,
    settings: &CompileSettings,
    entry: crate::meta::SrcMethodId,
) -> crate::error::Result<ExecutionSet> {
    let mut set = ExecutionSet::new();
    DependencyWalker::new(p, reg, settings, &mut set).walk(entry)?;
    Ok(set)
}

#[test]
fn constant_return_reaches_exactly_one_method() {
    let mut p = ProgramBuilder::new();
    let ty = p.add_class("App", "Program");
    let entry = p.add_static_method(ty, "F", TypeSig::I4);
    p.set_body(entry, 1, Asm::new().ldc_i4_1().ret().build());

    let reg = registry(&p);
    let set = walk(&p, &reg, &CompileSettings::default(), entry).unwrap();

    assert_eq!(set.method_ids(), vec![entry]);
    let record = set.method(entry).unwrap();
    // body ends in ldc.i4.1, ret
    let code = record.code.as_ref().unwrap();
    assert_eq!(&code[code.len() - 2..], &[0x17, 0x2A]);
}

#[test]
fn transitive_calls_are_admitted_once() {
    let mut p = ProgramBuilder::new();
    let ty = p.add_class("App", "Program");
    let entry = p.add_static_method(ty, "Main", TypeSig::Void);
    let a = p.add_static_method(ty, "A", TypeSig::Void);
    let b = p.add_static_method(ty, "B", TypeSig::Void);
    let raw_a = p.raw(SrcRef::Method(a));
    let raw_b = p.raw(SrcRef::Method(b));
    let raw_entry = p.raw(SrcRef::Method(entry));
    p.set_body(entry, 1, Asm::new().call(raw_a).ret().build());
    // A calls B and (cyclically) the entry; the cycle must not loop.
    p.set_body(a, 1, Asm::new().call(raw_b).call(raw_entry).ret().build());
    p.set_body(b, 1, Asm::new().ret().build());

    let reg = registry(&p);
    let set = walk(&p, &reg, &CompileSettings::default(), entry).unwrap();

    let mut ids = set.method_ids();
    ids.sort();
    assert_eq!(ids, vec![entry, a, b]);
}

#[test]
fn constructor_pulls_declaring_type() {
    let mut p = ProgramBuilder::new();
    let widget = p.add_class("App", "Widget");
    let ctor = p.add_method(
        widget,
        ".ctor",
        Signature::new(vec![], TypeSig::Void),
        MethodAttrs {
            is_ctor: true,
            ..Default::default()
        },
    );
    p.set_body(ctor, 1, Asm::new().ret().build());

    let program = p.add_class("App", "Program");
    let entry = p.add_static_method(program, "Main", TypeSig::Void);
    let raw = p.raw(SrcRef::Method(ctor));
    p.set_body(entry, 1, Asm::new().newobj(raw).pop().ret().build());

    let reg = registry(&p);
    let set = walk(&p, &reg, &CompileSettings::default(), entry).unwrap();

    assert!(set.contains_type(widget));
    assert!(set.contains_method(ctor));
}

#[test]
fn callee_with_static_fields_pulls_type() {
    let mut p = ProgramBuilder::new();
    let counter = p.add_class("App", "Counter");
    p.add_field(counter, "count", TypeSig::I4, true);
    let bump = p.add_static_method(counter, "Bump", TypeSig::Void);
    p.set_body(bump, 1, Asm::new().ret().build());

    let program = p.add_class("App", "Program");
    let entry = p.add_static_method(program, "Main", TypeSig::Void);
    let raw = p.raw(SrcRef::Method(bump));
    p.set_body(entry, 1, Asm::new().call(raw).ret().build());

    let reg = registry(&p);
    let set = walk(&p, &reg, &CompileSettings::default(), entry).unwrap();
    // No bytecode names Counter itself, but its statics need a home.
    assert!(set.contains_type(counter));
}

#[test]
fn native_selector_method_is_not_walked() {
    let mut p = ProgramBuilder::new();
    let math = p.add_class("System", "Math");
    let sqrt = p.add_method(
        math,
        "Sqrt",
        Signature::new(vec![TypeSig::R8], TypeSig::R8),
        MethodAttrs {
            is_static: true,
            ..Default::default()
        },
    );
    let dev_math = p.add_class("Device", "Math");
    let dev_sqrt = p.add_method(
        dev_math,
        "Sqrt",
        Signature::new(vec![TypeSig::R8], TypeSig::R8),
        MethodAttrs {
            is_static: true,
            ..Default::default()
        },
    );
    // A body that would blow up if walked.
    p.set_body(dev_sqrt, 1, Asm::new().call(0xBAD0_0000).ret().build());

    let program = p.add_class("App", "Program");
    let entry = p.add_static_method(program, "Main", TypeSig::Void);
    let raw = p.raw(SrcRef::Method(sqrt));
    p.set_body(entry, 2, Asm::new().call(raw).pop().ret().build());

    let decls = [ReplacementDecl {
        target: "System.Math".into(),
        substitute: "Device.Math".into(),
        replace_type: false,
        include_subclasses: false,
        include_privates: false,
        members: vec![MemberDecl {
            name: "Sqrt".into(),
            hook: Hook::Native(7),
        }],
    }];
    let reg = ReplacementRegistry::build(&p, &decls).unwrap();
    let set = walk(&p, &reg, &CompileSettings::default(), entry).unwrap();

    let record = set.method(dev_sqrt).unwrap();
    assert!(record.code.is_none());
    assert_eq!(record.native_selector, 7);
    assert!(record.flags.is_native);
}

#[test]
fn missing_body_is_dropped_with_warning() {
    let mut p = ProgramBuilder::new();
    let ty = p.add_class("App", "Program");
    let entry = p.add_static_method(ty, "Main", TypeSig::Void);
    let ghost = p.add_static_method(ty, "Ghost", TypeSig::Void);
    let raw = p.raw(SrcRef::Method(ghost));
    p.set_body(entry, 1, Asm::new().call(raw).ret().build());

    let reg = registry(&p);
    let set = walk(&p, &reg, &CompileSettings::default(), entry).unwrap();
    // Non-fatal: the ghost is simply absent.
    assert!(!set.contains_method(ghost));
    assert!(set.contains_method(entry));
}

#[test]
fn completion_admits_override_of_reachable_virtual() {
    let mut p = ProgramBuilder::new();
    let base = p.add_class("App", "Shape");
    let base_area = p.add_method(
        base,
        "Area",
        Signature::new(vec![], TypeSig::I4),
        MethodAttrs {
            is_virtual: true,
            ..Default::default()
        },
    );
    p.set_body(base_area, 1, Asm::new().ldc_i4_0().ret().build());

    let derived = p.add_class("App", "Circle");
    p.set_base(derived, base);
    let derived_area = p.add_method(
        derived,
        "Area",
        Signature::new(vec![], TypeSig::I4),
        MethodAttrs {
            is_virtual: true,
            ..Default::default()
        },
    );
    p.set_body(derived_area, 1, Asm::new().ldc_i4_1().ret().build());
    let ctor = p.add_method(
        derived,
        ".ctor",
        Signature::new(vec![], TypeSig::Void),
        MethodAttrs {
            is_ctor: true,
            ..Default::default()
        },
    );
    p.set_body(ctor, 1, Asm::new().ret().build());

    let program = p.add_class("App", "Program");
    let entry = p.add_static_method(program, "Main", TypeSig::I4);
    let raw_ctor = p.raw(SrcRef::Method(ctor));
    let raw_area = p.raw(SrcRef::Method(base_area));
    p.set_body(
        entry,
        2,
        Asm::new().newobj(raw_ctor).callvirt(raw_area).ret().build(),
    );

    let reg = registry(&p);
    let set = walk(&p, &reg, &CompileSettings::default(), entry).unwrap();

    // No bytecode names Circle::Area, but a virtual call on a Circle
    // object dispatches to it.
    assert!(set.contains_method(derived_area));
}

#[test]
fn completion_admits_type_initializers() {
    let mut p = ProgramBuilder::new();
    let counter = p.add_class("App", "Counter");
    p.add_field(counter, "count", TypeSig::I4, true);
    let cctor = p.add_method(
        counter,
        ".cctor",
        Signature::new(vec![], TypeSig::Void),
        MethodAttrs {
            is_static: true,
            is_initializer: true,
            ..Default::default()
        },
    );
    p.set_body(cctor, 1, Asm::new().ret().build());
    let bump = p.add_static_method(counter, "Bump", TypeSig::Void);
    p.set_body(bump, 1, Asm::new().ret().build());

    let program = p.add_class("App", "Program");
    let entry = p.add_static_method(program, "Main", TypeSig::Void);
    let raw = p.raw(SrcRef::Method(bump));
    p.set_body(entry, 1, Asm::new().call(raw).ret().build());

    let reg = registry(&p);
    let set = walk(&p, &reg, &CompileSettings::default(), entry).unwrap();
    assert!(set.contains_method(cctor));
}

#[test]
fn suppressed_type_initializer_stays_out() {
    let mut p = ProgramBuilder::new();
    let heavy = p.add_class("App", "Heavy");
    p.add_field(heavy, "cache", TypeSig::I4, true);
    let cctor = p.add_method(
        heavy,
        ".cctor",
        Signature::new(vec![], TypeSig::Void),
        MethodAttrs {
            is_static: true,
            is_initializer: true,
            ..Default::default()
        },
    );
    p.set_body(cctor, 1, Asm::new().ret().build());

    let program = p.add_class("App", "Program");
    let entry = p.add_static_method(program, "Main", TypeSig::Void);
    p.set_body(entry, 1, Asm::new().ret().build());

    let reg = registry(&p);
    let settings = CompileSettings {
        additional_suppressions: vec!["App.Heavy".into()],
        ..Default::default()
    };
    let set = walk(&p, &reg, &settings, entry).unwrap();
    assert!(!set.contains_method(cctor));
    assert!(!set.contains_type(heavy));
}

#[test]
fn non_static_entry_is_rejected() {
    let mut p = ProgramBuilder::new();
    let ty = p.add_class("App", "Program");
    let entry = p.add_method(
        ty,
        "Main",
        Signature::new(vec![], TypeSig::Void),
        MethodAttrs::default(),
    );
    p.set_body(entry, 1, Asm::new().ret().build());

    let reg = registry(&p);
    let err = walk(&p, &reg, &CompileSettings::default(), entry).unwrap_err();
    assert!(matches!(err, CompileError::BadEntryPoint { .. }));
}

#[test]
fn generic_entry_is_rejected() {
    let mut p = ProgramBuilder::new();
    let ty = p.add_class("App", "Program");
    let entry = p.add_static_method(ty, "Main", TypeSig::Void);
    p.set_generic_arity(entry, 1);
    p.set_body(entry, 1, Asm::new().ret().build());

    let reg = registry(&p);
    let err = walk(&p, &reg, &CompileSettings::default(), entry).unwrap_err();
    assert!(matches!(err, CompileError::BadEntryPoint { .. }));
}

#[test]
fn flash_launch_rejects_wrong_parameter_shape() {
    let mut p = ProgramBuilder::new();
    let ty = p.add_class("App", "Program");
    let entry = p.add_method(
        ty,
        "Main",
        Signature::new(vec![TypeSig::I4], TypeSig::Void),
        MethodAttrs {
            is_static: true,
            ..Default::default()
        },
    );
    p.set_body(entry, 1, Asm::new().ret().build());

    let reg = registry(&p);
    let settings = CompileSettings {
        launch_program_from_flash: true,
        ..Default::default()
    };
    let err = walk(&p, &reg, &settings, entry).unwrap_err();
    assert!(matches!(err, CompileError::BadEntryPoint { .. }));
}

#[test]
fn oversized_body_rejected_during_walk() {
    let mut p = ProgramBuilder::new();
    let ty = p.add_class("App", "Program");
    let entry = p.add_static_method(ty, "Main", TypeSig::Void);
    p.set_body(entry, 1, vec![0x00; (u16::MAX as usize) + 1]);

    let reg = registry(&p);
    let err = walk(&p, &reg, &CompileSettings::default(), entry).unwrap_err();
    assert!(matches!(err, CompileError::OversizedMethod { .. }));
}

#[test]
fn generic_slots_classify_under_bound_arguments() {
    use flint_image::SlotKind;

    let mut p = ProgramBuilder::new();
    // An instantiated container handle: Holder`1 bound to i64.
    let holder = p.add_class("App", "Holder`1");
    p.bind_type_args(holder, vec![TypeSig::I8]);
    let get = p.add_method(
        holder,
        "Get",
        Signature::new(vec![TypeSig::TypeParam(0)], TypeSig::Void),
        MethodAttrs {
            is_static: true,
            ..Default::default()
        },
    );
    p.set_body_with_locals(get, 1, vec![TypeSig::TypeParam(0)], Asm::new().ret().build());

    let program = p.add_class("App", "Program");
    let entry = p.add_static_method(program, "Main", TypeSig::Void);
    let raw = p.raw(SrcRef::Method(get));
    p.set_body(entry, 2, Asm::new().ldc_i4_0().call(raw).ret().build());

    let reg = registry(&p);
    let set = walk(&p, &reg, &CompileSettings::default(), entry).unwrap();

    // The type parameter resolves through the handle's bound arguments.
    let record = set.method(get).unwrap();
    assert_eq!(record.locals[0].kind, SlotKind::I64);
    assert_eq!(record.locals[0].size, 8);
    assert_eq!(record.args[0].kind, SlotKind::I64);
}

#[test]
fn unbound_generic_slot_is_rejected() {
    let mut p = ProgramBuilder::new();
    // An open definition: no arguments bound on the handle.
    let holder = p.add_class("App", "Holder`1");
    let get = p.add_method(
        holder,
        "Get",
        Signature::new(vec![], TypeSig::Void),
        MethodAttrs {
            is_static: true,
            ..Default::default()
        },
    );
    p.set_body_with_locals(get, 1, vec![TypeSig::TypeParam(0)], Asm::new().ret().build());

    let reg = registry(&p);
    let err = walk(&p, &reg, &CompileSettings::default(), get).unwrap_err();
    assert!(matches!(err, CompileError::UnboundGeneric { .. }));
}

#[test]
fn delegate_ctor_and_invoke_are_synthesized() {
    let mut p = ProgramBuilder::new();
    let delegate_root = p.add_class("System", "MulticastDelegate");
    p.add_field(delegate_root, "m_target", TypeSig::Object, false);
    p.add_field(delegate_root, "m_functionPointer", TypeSig::FnPtr, false);
    let helper = p.add_method(
        delegate_root,
        "CtorClosedStatic",
        Signature::new(
            vec![TypeSig::Object, TypeSig::Object, TypeSig::FnPtr],
            TypeSig::Void,
        ),
        MethodAttrs {
            is_static: true,
            ..Default::default()
        },
    );
    p.set_body(helper, 3, Asm::new().ret().build());

    let handler = p.add_class("App", "Handler");
    p.set_base(handler, delegate_root);
    let ctor = p.add_method(
        handler,
        ".ctor",
        Signature::new(vec![TypeSig::Object, TypeSig::FnPtr], TypeSig::Void),
        MethodAttrs {
            is_ctor: true,
            ..Default::default()
        },
    );
    let invoke = p.add_method(
        handler,
        "Invoke",
        Signature::new(vec![TypeSig::I4], TypeSig::Void),
        MethodAttrs {
            is_virtual: true,
            ..Default::default()
        },
    );
    // Neither ctor nor Invoke has a body: both are auto-generated.

    let program = p.add_class("App", "Program");
    let entry = p.add_static_method(program, "Main", TypeSig::Void);
    let raw_ctor = p.raw(SrcRef::Method(ctor));
    let raw_invoke = p.raw(SrcRef::Method(invoke));
    p.set_body(
        entry,
        3,
        Asm::new()
            .newobj(raw_ctor)
            .dup()
            .ldc_i4_1()
            .callvirt(raw_invoke)
            .pop()
            .ret()
            .build(),
    );

    let reg = registry(&p);
    let set = walk(&p, &reg, &CompileSettings::default(), entry).unwrap();

    let ctor_record = set.method(ctor).unwrap();
    assert!(ctor_record.flags.is_synthesized);
    assert!(ctor_record.code.is_some());
    // The closed-static helper was pulled into the set first.
    assert!(set.contains_method(helper));

    let invoke_record = set.method(invoke).unwrap();
    assert!(invoke_record.flags.is_synthesized);
    assert!(invoke_record.flags.is_virtual);
    assert!(invoke_record.flags.returns_void);
}

#[test]
fn fully_replaced_type_never_enters_the_set() {
    let mut p = ProgramBuilder::new();
    let target = p.add_class("System", "Console");
    let target_write = p.add_method(
        target,
        "Write",
        Signature::new(vec![TypeSig::String], TypeSig::Void),
        MethodAttrs {
            is_static: true,
            ..Default::default()
        },
    );
    let substitute = p.add_class("Device", "Console");
    let sub_write = p.add_method(
        substitute,
        "Write",
        Signature::new(vec![TypeSig::String], TypeSig::Void),
        MethodAttrs {
            is_static: true,
            ..Default::default()
        },
    );
    p.set_body(sub_write, 1, Asm::new().ret().build());

    let program = p.add_class("App", "Program");
    let entry = p.add_static_method(program, "Main", TypeSig::Void);
    let raw_str = p.raw_string("hi");
    let raw_write = p.raw(SrcRef::Method(target_write));
    p.set_body(
        entry,
        2,
        Asm::new().ldstr(raw_str).call(raw_write).ret().build(),
    );

    let decls = [ReplacementDecl {
        target: "System.Console".into(),
        substitute: "Device.Console".into(),
        replace_type: true,
        include_subclasses: false,
        include_privates: false,
        members: vec![],
    }];
    let reg = ReplacementRegistry::build(&p, &decls).unwrap();
    let set = walk(&p, &reg, &CompileSettings::default(), entry).unwrap();

    assert!(!set.contains_type(target));
    assert!(!set.contains_method(target_write));
    assert!(set.contains_method(sub_write));
}
