use flint_image::{SlotKind, POINTER_WIDTH};

use crate::layout::LayoutEngine;
use crate::meta::{TypeAttrs, TypeSig};
use crate::test_utils::ProgramBuilder;

#[test]
fn primitives_widen_but_keep_storage_width() {
    let p = ProgramBuilder::new();
    let layout = LayoutEngine::new(&p);

    let i2 = layout.classify(&TypeSig::I2).unwrap();
    assert_eq!(i2.kind, SlotKind::I32);
    assert_eq!(i2.size, 2);

    let i8_ = layout.classify(&TypeSig::I8).unwrap();
    assert_eq!(i8_.kind, SlotKind::I64);
    assert_eq!(i8_.size, 8);

    let ch = layout.classify(&TypeSig::Char).unwrap();
    assert_eq!(ch.kind, SlotKind::U32);
    assert_eq!(ch.size, 2);
}

#[test]
fn references_are_pointer_width() {
    let mut p = ProgramBuilder::new();
    let cls = p.add_class("App", "Widget");
    let layout = LayoutEngine::new(&p);

    for sig in [TypeSig::String, TypeSig::Object, TypeSig::Class(cls)] {
        let slot = layout.classify(&sig).unwrap();
        assert_eq!(slot.kind, SlotKind::Object);
        assert_eq!(slot.size, POINTER_WIDTH);
    }
}

#[test]
fn arrays_split_by_element_kind() {
    let p = ProgramBuilder::new();
    let layout = LayoutEngine::new(&p);

    let refs = layout.classify(&TypeSig::array(TypeSig::String)).unwrap();
    assert_eq!(refs.kind, SlotKind::RefArray);
    assert_eq!(refs.size, POINTER_WIDTH);

    let vals = layout.classify(&TypeSig::array(TypeSig::I2)).unwrap();
    assert_eq!(vals.kind, SlotKind::ValueArray);
    assert_eq!(vals.size, 2);
}

#[test]
fn enums_are_u32() {
    let mut p = ProgramBuilder::new();
    let e = p.add_type(
        "App",
        "Mode",
        TypeAttrs {
            is_value_type: true,
            is_enum: true,
            ..Default::default()
        },
    );
    let layout = LayoutEngine::new(&p);
    let slot = layout.classify(&TypeSig::Value(e)).unwrap();
    assert_eq!(slot.kind, SlotKind::U32);
    assert_eq!(slot.size, 4);
}

#[test]
fn date_and_interval_carriers_are_u64() {
    let mut p = ProgramBuilder::new();
    let dt = p.add_value_type("System", "DateTime");
    let ts = p.add_value_type("System", "TimeSpan");
    let layout = LayoutEngine::new(&p);
    for ty in [dt, ts] {
        let slot = layout.classify(&TypeSig::Value(ty)).unwrap();
        assert_eq!(slot.kind, SlotKind::U64);
        assert_eq!(slot.size, 8);
    }
}

#[test]
fn small_value_types_collapse_to_scalars() {
    let mut p = ProgramBuilder::new();
    // one i16 field: total 2 <= 4
    let small = p.add_value_type("App", "Small");
    p.add_field(small, "v", TypeSig::I2, false);
    // two i32 fields: total 8
    let medium = p.add_value_type("App", "Medium");
    p.add_field(medium, "a", TypeSig::I4, false);
    p.add_field(medium, "b", TypeSig::I4, false);
    // three i32 fields: total 12
    let large = p.add_value_type("App", "Large");
    p.add_field(large, "a", TypeSig::I4, false);
    p.add_field(large, "b", TypeSig::I4, false);
    p.add_field(large, "c", TypeSig::I4, false);

    let layout = LayoutEngine::new(&p);
    let s = layout.classify(&TypeSig::Value(small)).unwrap();
    assert_eq!((s.kind, s.size), (SlotKind::U32, 4));
    let m = layout.classify(&TypeSig::Value(medium)).unwrap();
    assert_eq!((m.kind, m.size), (SlotKind::U64, 8));
    let l = layout.classify(&TypeSig::Value(large)).unwrap();
    assert_eq!((l.kind, l.size), (SlotKind::LargeValue, 12));
}

#[test]
fn multi_field_value_type_aligns_to_pointer_width() {
    let mut p = ProgramBuilder::new();
    // i16 + i32: packed would be 6, aligned is 4 + 4 = 8
    let ty = p.add_value_type("App", "Mixed");
    p.add_field(ty, "a", TypeSig::I2, false);
    p.add_field(ty, "b", TypeSig::I4, false);

    let layout = LayoutEngine::new(&p);
    let slot = layout.classify(&TypeSig::Value(ty)).unwrap();
    assert_eq!((slot.kind, slot.size), (SlotKind::U64, 8));
}

#[test]
fn single_field_value_type_packs_tightly() {
    let mut p = ProgramBuilder::new();
    let ty = p.add_value_type("App", "Wrapper");
    p.add_field(ty, "v", TypeSig::U1, false);

    let layout = LayoutEngine::new(&p);
    let slot = layout.classify(&TypeSig::Value(ty)).unwrap();
    // total 1 <= 4, so U32 with 4-byte storage
    assert_eq!((slot.kind, slot.size), (SlotKind::U32, 4));
}

#[test]
fn declared_layout_size_is_a_floor() {
    let mut p = ProgramBuilder::new();
    let ty = p.add_value_type("App", "Padded");
    p.add_field(ty, "v", TypeSig::U1, false);
    p.set_layout_size(ty, 16);

    let layout = LayoutEngine::new(&p);
    let slot = layout.classify(&TypeSig::Value(ty)).unwrap();
    assert_eq!((slot.kind, slot.size), (SlotKind::LargeValue, 16));
}

#[test]
fn byref_wrapper_and_slice_templates() {
    let mut p = ProgramBuilder::new();
    let byref = p.add_value_type("System", "ByReference`1");
    let span = p.add_value_type("System", "Span`1");
    let layout = LayoutEngine::new(&p);

    let r = layout
        .classify(&TypeSig::Inst(byref, vec![TypeSig::I4]))
        .unwrap();
    assert_eq!((r.kind, r.size), (SlotKind::Ref, POINTER_WIDTH));

    let s = layout
        .classify(&TypeSig::Inst(span, vec![TypeSig::I4]))
        .unwrap();
    assert_eq!((s.kind, s.size), (SlotKind::LargeValue, POINTER_WIDTH + 4));
}

#[test]
fn instance_size_inherits_static_size_does_not() {
    let mut p = ProgramBuilder::new();
    let base = p.add_class("App", "Base");
    p.add_field(base, "x", TypeSig::I4, false);
    p.add_field(base, "s", TypeSig::I4, true);
    let derived = p.add_class("App", "Derived");
    p.set_base(derived, base);
    p.add_field(derived, "y", TypeSig::I8, false);
    p.add_field(derived, "t", TypeSig::I4, true);

    let layout = LayoutEngine::new(&p);
    assert_eq!(layout.instance_size(base).unwrap(), 4);
    assert_eq!(layout.instance_size(derived).unwrap(), 4 + 8);
    assert_eq!(layout.static_size(base).unwrap(), 4);
    assert_eq!(layout.static_size(derived).unwrap(), 4);
}

#[test]
fn class_fields_round_to_4_or_8() {
    let mut p = ProgramBuilder::new();
    let cls = p.add_class("App", "Holder");
    p.add_field(cls, "flag", TypeSig::Bool, false); // 1 -> 4
    p.add_field(cls, "wide", TypeSig::I8, false); // 8 -> 8

    let layout = LayoutEngine::new(&p);
    assert_eq!(layout.instance_size(cls).unwrap(), 4 + 8);
}

#[test]
fn string_carrier_length_precedes_payload() {
    let mut p = ProgramBuilder::new();
    let string = p.add_class("System", "String");
    let first_char = p.add_field(string, "firstChar", TypeSig::Char, false);
    let length = p.add_field(string, "length", TypeSig::I4, false);

    let layout = LayoutEngine::new(&p);
    let ordered = layout.ordered_instance_fields(string);
    assert_eq!(ordered, vec![length, first_char]);
}

#[test]
fn exception_carrier_message_is_first() {
    let mut p = ProgramBuilder::new();
    let exception = p.add_class("System", "Exception");
    let hresult = p.add_field(exception, "hresult", TypeSig::I4, false);
    let message = p.add_field(exception, "message", TypeSig::String, false);

    let layout = LayoutEngine::new(&p);
    let ordered = layout.ordered_instance_fields(exception);
    assert_eq!(ordered, vec![message, hresult]);
}

#[test]
fn unbound_generic_cannot_be_classified() {
    let p = ProgramBuilder::new();
    let layout = LayoutEngine::new(&p);
    assert!(layout.classify(&TypeSig::TypeParam(0)).is_err());
}
