//! Full names of platform types with hard-coded contracts.
//!
//! The device runtime recognizes these by position in the special-type
//! list; the compiler recognizes them by name.

/// Text-string carrier. Field order contract: length precedes payload.
pub const STRING: &str = "System.String";
/// Exception carrier. Field order contract: message at slot 0.
pub const EXCEPTION: &str = "System.Exception";
/// Root object type.
pub const OBJECT: &str = "System.Object";
/// Delegate base every delegate type derives from.
pub const MULTICAST_DELEGATE: &str = "System.MulticastDelegate";
/// Delegate root holding the target/pointer fields.
pub const DELEGATE: &str = "System.Delegate";
/// Date carrier, stored as 8-byte unsigned.
pub const DATE_TIME: &str = "System.DateTime";
/// Interval carrier, stored as 8-byte unsigned.
pub const TIME_SPAN: &str = "System.TimeSpan";
/// By-reference wrapper template; instantiations carry as references.
pub const BYREF_WRAPPER: &str = "System.ByReference`1";
/// Slice template; instantiations carry as pointer + length.
pub const SLICE: &str = "System.Span`1";
/// Enumerable-of-T interface arrays implement through the injected factory.
pub const ENUMERABLE: &str = "System.Collections.Generic.IEnumerable`1";
/// Helper type carrying the array-of-T enumerator factory.
pub const ARRAY_HELPER: &str = "System.SZArrayHelper";
/// Factory method name on [`ARRAY_HELPER`].
pub const ARRAY_ENUMERATOR_FACTORY: &str = "GetEnumerator";
/// Enumerator-producing method name on [`ENUMERABLE`].
pub const ENUMERABLE_PRODUCER: &str = "GetEnumerator";
/// Interop shim duplicated across system assemblies.
pub const INTEROP_SHIM: &str = "System.Runtime.InteropServices.NativeShim";
/// Private implementation-details carrier of folded field initializers.
pub const IMPL_DETAILS: &str = "<PrivateImplementationDetails>";
/// Closed-static binding helper on the delegate base.
pub const DELEGATE_CTOR_HELPER: &str = "CtorClosedStatic";
/// Target-object field on the delegate root.
pub const DELEGATE_TARGET_FIELD: &str = "m_target";
/// Method-pointer field on the delegate root.
pub const DELEGATE_POINTER_FIELD: &str = "m_functionPointer";

/// System assemblies an interop-shim copy may live in.
pub const SYSTEM_ASSEMBLIES: &[&str] = &[
    "System.Runtime",
    "System.Private.CoreLib",
    "System.Runtime.InteropServices",
];

/// Namespace prefix separating platform types from user types for the
/// initializer sequencer.
pub const PLATFORM_NAMESPACE: &str = "System";
