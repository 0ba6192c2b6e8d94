//! Hook registries and lookup.
//!
//! Hooks are keyed by a `Class;->name` pattern matched as a substring of
//! the invoke trace line. Registration order is lookup order, so
//! class-qualified patterns must be registered before catch-all ones. The
//! registries are built per engine; callers may register their own hooks
//! on top before executing.

use crate::errors::VmResult;
use crate::interp::Vm;
use crate::mocks::{context, reflection, util};
use crate::session::MockConfig;
use crate::value::{HostValue, Instance, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// A host-side replacement for a framework or runtime method.
///
/// Receives the engine, the argument values (receiver first for instance
/// methods) and the trace line; returns the call result, `None` for void.
pub type HookFn = fn(&mut Vm<'_>, &[Value], &str) -> VmResult<Option<Value>>;

pub struct HookRegistry {
    statics: Vec<(&'static str, HookFn)>,
    virtuals: Vec<(&'static str, HookFn)>,
    directs: Vec<(&'static str, HookFn)>,
    static_fields: Vec<(String, Value)>,
}

impl HookRegistry {
    #[must_use]
    pub fn new(config: &MockConfig) -> Self {
        let mut registry = Self {
            statics: Vec::new(),
            virtuals: Vec::new(),
            directs: Vec::new(),
            static_fields: Vec::new(),
        };
        registry.install_builtins(config);
        registry
    }

    pub fn register_static(&mut self, pattern: &'static str, hook: HookFn) {
        self.statics.push((pattern, hook));
    }

    pub fn register_virtual(&mut self, pattern: &'static str, hook: HookFn) {
        self.virtuals.push((pattern, hook));
    }

    pub fn register_direct(&mut self, pattern: &'static str, hook: HookFn) {
        self.directs.push((pattern, hook));
    }

    pub fn set_static_field(&mut self, sig: impl Into<String>, value: Value) {
        self.static_fields.push((sig.into(), value));
    }

    #[must_use]
    pub fn static_hook(&self, trace: &str) -> Option<HookFn> {
        Self::find(&self.statics, trace)
    }

    #[must_use]
    pub fn virtual_hook(&self, trace: &str) -> Option<HookFn> {
        Self::find(&self.virtuals, trace)
    }

    #[must_use]
    pub fn direct_hook(&self, trace: &str) -> Option<HookFn> {
        Self::find(&self.directs, trace)
    }

    /// Mock value of a static field, keyed by exact `Class;->name`.
    #[must_use]
    pub fn static_field(&self, sig: &str) -> Option<Value> {
        self.static_fields
            .iter()
            .find(|(pattern, _)| pattern == sig)
            .map(|(_, value)| value.clone())
    }

    fn find(hooks: &[(&'static str, HookFn)], trace: &str) -> Option<HookFn> {
        hooks
            .iter()
            .find(|(pattern, _)| trace.contains(pattern))
            .map(|(_, hook)| *hook)
    }

    #[allow(clippy::too_many_lines)]
    fn install_builtins(&mut self, config: &MockConfig) {
        // string and builder surface
        self.register_virtual("Ljava/lang/StringBuilder;->append", util::sb_append);
        self.register_virtual("Ljava/lang/StringBuilder;->toString", util::to_string);
        self.register_virtual("Ljava/lang/StringBuilder;->length", util::string_length);
        self.register_virtual("Ljava/lang/String;->toString", util::to_string);
        self.register_virtual("Ljava/lang/String;->length", util::string_length);
        self.register_virtual("Ljava/lang/String;->charAt", util::char_at);
        self.register_virtual("Ljava/lang/String;->toCharArray", util::to_char_array);
        self.register_virtual("Ljava/lang/String;->getBytes", util::get_bytes);
        self.register_virtual("Ljava/lang/String;->intern", util::intern);
        self.register_virtual("Ljava/lang/CharSequence;->toString", util::to_string);
        self.register_virtual("->clone()", util::clone_value);
        self.register_virtual("Ljava/io/PrintStream;->println", util::println);

        // boxed numerics
        self.register_virtual("Ljava/lang/Integer;->intValue", util::int_value);
        self.register_virtual("Ljava/lang/Long;->longValue", util::long_value);
        self.register_virtual("Ljava/lang/Boolean;->booleanValue", util::boolean_value);

        // collections
        self.register_virtual("Ljava/util/List;->iterator", util::list_iterator);
        self.register_virtual("Ljava/util/ArrayList;->iterator", util::list_iterator);
        self.register_virtual("Ljava/util/List;->size", util::list_size);
        self.register_virtual("Ljava/util/ArrayList;->size", util::list_size);
        self.register_virtual("Ljava/util/List;->get", util::list_get);
        self.register_virtual("Ljava/util/ArrayList;->get", util::list_get);
        self.register_virtual("Ljava/util/Iterator;->hasNext", util::iter_has_next);
        self.register_virtual("Ljava/util/Iterator;->next", util::iter_next);

        // app identity
        self.register_virtual("Context;->getPackageManager", context::get_package_manager);
        self.register_virtual("Context;->getPackageName", context::get_package_name);
        self.register_virtual("PackageManager;->getPackageInfo", context::get_package_info);
        self.register_virtual(
            "PackageManager;->getInstalledPackages",
            context::get_installed_packages,
        );
        self.register_virtual("Signature;->toByteArray", context::signature_to_byte_array);
        self.register_virtual(
            "Signature;->toCharsString",
            context::signature_to_chars_string,
        );
        self.register_virtual("Signature;->hashCode", context::signature_hash_code);

        // reflection returns placeholders without executing
        self.register_virtual("Ljava/lang/Class;->getMethod", reflection::class_get_method);
        self.register_virtual("Ljava/lang/Class;->getField", reflection::class_get_field);
        self.register_virtual("Ljava/lang/reflect/Method;->invoke", reflection::method_invoke);
        self.register_virtual("Ljava/lang/reflect/Field;->get", reflection::field_get);
        self.register_virtual("Throwable;->getCause", reflection::throwable_get_cause);

        self.register_static("Ljava/lang/String;->valueOf", util::string_value_of);
        self.register_static("Ljava/lang/Integer;->parseInt", util::parse_int);
        self.register_static("Ljava/lang/Long;->parseLong", util::parse_long);
        self.register_static("Ljava/lang/Integer;->valueOf", util::box_int);
        self.register_static("Ljava/lang/Long;->valueOf", util::box_long);
        self.register_static("Ljava/lang/Boolean;->valueOf", util::box_boolean);
        self.register_static("Ljava/lang/Math;->abs", util::math_abs);
        self.register_static("Ljava/lang/Math;->max", util::math_max);
        self.register_static("Ljava/lang/Math;->min", util::math_min);
        self.register_static("Ljava/util/Arrays;->copyOf", util::arrays_copy_of);
        self.register_static("Ljava/lang/System;->arraycopy", util::system_arraycopy);
        self.register_static("Landroid/text/TextUtils;->isEmpty", util::text_utils_is_empty);
        self.register_static("Landroid/util/Base64;->decode", util::base64_decode);
        self.register_static("Ljava/lang/Class;->forName", reflection::class_for_name);

        self.register_direct("Ljava/lang/String;-><init>", util::string_init);
        self.register_direct("Ljava/lang/StringBuilder;-><init>", util::sb_init);

        self.set_static_field(
            "Landroid/os/Build$VERSION;->SDK_INT",
            Value::Int(config.sdk_int),
        );
        self.set_static_field("Ljava/lang/Boolean;->TRUE", boxed_bool(true));
        self.set_static_field("Ljava/lang/Boolean;->FALSE", boxed_bool(false));
        for (sig, desc) in [
            ("Ljava/lang/Integer;->TYPE", "I"),
            ("Ljava/lang/Long;->TYPE", "J"),
            ("Ljava/lang/Boolean;->TYPE", "Z"),
            ("Ljava/lang/Byte;->TYPE", "B"),
            ("Ljava/lang/Character;->TYPE", "C"),
            ("Ljava/lang/Short;->TYPE", "S"),
            ("Ljava/lang/Float;->TYPE", "F"),
            ("Ljava/lang/Double;->TYPE", "D"),
            ("Ljava/lang/Void;->TYPE", "V"),
        ] {
            self.set_static_field(sig, Value::Class(desc.to_string()));
        }
    }
}

fn boxed_bool(b: bool) -> Value {
    Value::Object(Rc::new(RefCell::new(Instance::with_payload(
        "Ljava/lang/Boolean;",
        HostValue::Bool(b),
    ))))
}
