//! Builtin library
//!
//! One module per global: the installer of each populates its
//! constructor and prototype on a realm created by `install_realm`.
//! Method semantics follow the observable algorithms of ES2017.

pub mod array;
pub mod boolean;
pub mod error;
pub mod function;
pub mod global;
pub mod iterator;
pub mod math;
pub mod number;
pub mod object;
pub mod promise;
pub mod string;
pub mod symbol;

use crate::context::{Realm, VmInstance};
use crate::runtime::environment::EnvRecord;
use crate::runtime::function::{FunctionData, NativeFn};
use crate::runtime::object::{ErrorKind, ObjectKind};
use crate::runtime::property::{PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::value::{ObjectRef, Value};

/// Build a realm: allocate every intrinsic, then let each builtin
/// module fill in its methods and hang its constructor off the global.
pub fn install_realm(vm: &mut VmInstance) -> Realm {
    let object_prototype = vm.alloc_object(None, ObjectKind::Plain);
    let function_prototype = {
        let data = FunctionData::native(function::prototype_itself);
        vm.alloc_object(
            Some(object_prototype),
            ObjectKind::Function(Box::new(data)),
        )
    };
    let global = vm.alloc_object(Some(object_prototype), ObjectKind::Plain);
    let global_lexical = vm.heap.alloc_env(EnvRecord::named(None));

    let array_prototype = vm.alloc_array(Some(object_prototype), 0);
    let empty = vm.heap.alloc_str("");
    let string_prototype =
        vm.alloc_object(Some(object_prototype), ObjectKind::StringWrapper(empty));
    let number_prototype =
        vm.alloc_object(Some(object_prototype), ObjectKind::NumberWrapper(0.0));
    let boolean_prototype =
        vm.alloc_object(Some(object_prototype), ObjectKind::BooleanWrapper(false));
    let symbol_prototype = vm.alloc_object(Some(object_prototype), ObjectKind::Plain);
    let iterator_prototype = vm.alloc_object(Some(object_prototype), ObjectKind::Plain);
    let array_iterator_prototype =
        vm.alloc_object(Some(iterator_prototype), ObjectKind::Plain);
    let string_iterator_prototype =
        vm.alloc_object(Some(iterator_prototype), ObjectKind::Plain);
    let promise_prototype = vm.alloc_object(Some(object_prototype), ObjectKind::Plain);

    let base_error = vm.alloc_object(Some(object_prototype), ObjectKind::Plain);
    let error_prototypes = [
        base_error,
        vm.alloc_object(Some(base_error), ObjectKind::Plain),
        vm.alloc_object(Some(base_error), ObjectKind::Plain),
        vm.alloc_object(Some(base_error), ObjectKind::Plain),
        vm.alloc_object(Some(base_error), ObjectKind::Plain),
        vm.alloc_object(Some(base_error), ObjectKind::Plain),
        vm.alloc_object(Some(base_error), ObjectKind::Plain),
    ];

    let object_constructor =
        native_function(vm, function_prototype, object::constructor, "Object", 1);
    let array_constructor =
        native_function(vm, function_prototype, array::constructor, "Array", 1);
    let promise_constructor =
        native_function(vm, function_prototype, promise::constructor, "Promise", 1);
    let eval_function = native_function(vm, function_prototype, global::eval, "eval", 1);

    let realm = Realm {
        global,
        global_lexical,
        object_prototype,
        function_prototype,
        array_prototype,
        string_prototype,
        number_prototype,
        boolean_prototype,
        symbol_prototype,
        iterator_prototype,
        array_iterator_prototype,
        string_iterator_prototype,
        promise_prototype,
        error_prototypes,
        object_constructor,
        array_constructor,
        promise_constructor,
        eval_function,
    };

    object::install(vm, &realm);
    function::install(vm, &realm);
    array::install(vm, &realm);
    string::install(vm, &realm);
    number::install(vm, &realm);
    boolean::install(vm, &realm);
    symbol::install(vm, &realm);
    error::install(vm, &realm);
    iterator::install(vm, &realm);
    promise::install(vm, &realm);
    math::install(vm, &realm);
    global::install(vm, &realm);
    realm
}

// Installer plumbing shared by the builtin modules.

pub(crate) fn native_function(
    vm: &mut VmInstance,
    function_prototype: ObjectRef,
    f: NativeFn,
    name: &str,
    length: u8,
) -> ObjectRef {
    let data = FunctionData::native(f);
    let func = vm.alloc_object(
        Some(function_prototype),
        ObjectKind::Function(Box::new(data)),
    );
    let name_ref = vm.heap.alloc_str(name);
    let name_key = PropertyKey::Atom(vm.wk.name);
    vm.define_own_property(
        func,
        name_key,
        PropertyDescriptor::data(Value::string(name_ref), PropertyAttributes::CONFIGURABLE),
    );
    let length_key = PropertyKey::Atom(vm.wk.length);
    vm.define_own_property(
        func,
        length_key,
        PropertyDescriptor::data(
            Value::number(length as f64),
            PropertyAttributes::CONFIGURABLE,
        ),
    );
    func
}

pub(crate) fn define_method(
    vm: &mut VmInstance,
    realm: &Realm,
    target: ObjectRef,
    name: &str,
    length: u8,
    f: NativeFn,
) -> ObjectRef {
    let func = native_function(vm, realm.function_prototype, f, name, length);
    let key = {
        let atom = vm.atoms.intern(name);
        PropertyKey::Atom(atom)
    };
    vm.define_own_property(
        target,
        key,
        PropertyDescriptor::data(Value::object(func), PropertyAttributes::BUILTIN),
    );
    func
}

pub(crate) fn define_value(
    vm: &mut VmInstance,
    target: ObjectRef,
    name: &str,
    value: Value,
    attrs: PropertyAttributes,
) {
    let key = {
        let atom = vm.atoms.intern(name);
        PropertyKey::Atom(atom)
    };
    vm.define_own_property(target, key, PropertyDescriptor::data(value, attrs));
}

pub(crate) fn define_symbol_method(
    vm: &mut VmInstance,
    realm: &Realm,
    target: ObjectRef,
    sym: crate::value::SymbolRef,
    name: &str,
    length: u8,
    f: NativeFn,
) {
    let func = native_function(vm, realm.function_prototype, f, name, length);
    vm.define_own_property(
        target,
        PropertyKey::Symbol(sym),
        PropertyDescriptor::data(Value::object(func), PropertyAttributes::BUILTIN),
    );
}

/// Wire a constructor/prototype pair and expose the constructor on the
/// global object.
pub(crate) fn link_constructor(
    vm: &mut VmInstance,
    realm: &Realm,
    ctor: ObjectRef,
    prototype: ObjectRef,
    global_name: &str,
) {
    let proto_key = PropertyKey::Atom(vm.wk.prototype);
    vm.define_own_property(
        ctor,
        proto_key,
        PropertyDescriptor::data(Value::object(prototype), PropertyAttributes::empty()),
    );
    let ctor_key = PropertyKey::Atom(vm.wk.constructor);
    vm.define_own_property(
        prototype,
        ctor_key,
        PropertyDescriptor::data(Value::object(ctor), PropertyAttributes::BUILTIN),
    );
    define_value(
        vm,
        realm.global,
        global_name,
        Value::object(ctor),
        PropertyAttributes::BUILTIN,
    );
}

/// Error kind order matching `Realm::error_prototype`.
pub(crate) const ERROR_KINDS: [ErrorKind; 7] = [
    ErrorKind::Error,
    ErrorKind::TypeError,
    ErrorKind::RangeError,
    ErrorKind::ReferenceError,
    ErrorKind::SyntaxError,
    ErrorKind::UriError,
    ErrorKind::EvalError,
];
