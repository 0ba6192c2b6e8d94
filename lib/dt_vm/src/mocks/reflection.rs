//! Reflection surface.
//!
//! Reflection never executes anything here: lookups return placeholder
//! instances that carry the requested names, and `Method.invoke` only
//! recognizes the handful of identity getters obfuscators reach through
//! reflection for. Everything else is null.

use crate::errors::VmResult;
use crate::interp::Vm;
use crate::mocks::factories;
use crate::value::{HostValue, Value};

fn named_placeholder(class: &str, fields: &[(&str, Option<String>)]) -> Value {
    let value = Value::object(class);
    if let Value::Object(obj) = &value {
        let mut obj = obj.borrow_mut();
        for (key, name) in fields {
            if let Some(name) = name {
                obj.fields
                    .insert((*key).to_string(), Value::string(name.clone()));
            }
        }
    }
    value
}

fn field_text(value: &Value, key: &str) -> Option<String> {
    match value {
        Value::Object(obj) => obj.borrow().fields.get(key).and_then(Value::host_str),
        _ => None,
    }
}

/// `Class.forName(String)`.
pub(crate) fn class_for_name(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let name = args.first().and_then(Value::host_str);
    Ok(Some(named_placeholder(
        "Ljava/lang/Class;",
        &[("name", name)],
    )))
}

/// `Class.getMethod(String, Class...)`.
pub(crate) fn class_get_method(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let class_name = args.first().and_then(|c| field_text(c, "name"));
    let method_name = args.get(1).and_then(Value::host_str);
    Ok(Some(named_placeholder(
        "Ljava/lang/reflect/Method;",
        &[("class", class_name), ("name", method_name)],
    )))
}

/// `Class.getField(String)`.
pub(crate) fn class_get_field(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let class_name = args.first().and_then(|c| field_text(c, "name"));
    let field_name = args.get(1).and_then(Value::host_str);
    Ok(Some(named_placeholder(
        "Ljava/lang/reflect/Field;",
        &[("class", class_name), ("name", field_name)],
    )))
}

/// `Method.invoke(Object, Object...)`.
///
/// Recognizes the Context identity getters commonly reached through
/// reflection; anything else returns null.
pub(crate) fn method_invoke(
    vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let Some(method_name) = args.first().and_then(|m| field_text(m, "name")) else {
        return Ok(Some(Value::Null));
    };
    let result = match method_name.as_str() {
        "getPackageManager" => factories::package_manager(),
        "getPackageName" => Value::string(vm.session.config.package_name.clone()),
        "getApplicationContext" => factories::context(&vm.session.config),
        "getApplicationInfo" => factories::application_info(&vm.session.config),
        "getPackageInfo" => {
            // varargs arrive as an Object[]; the first element is the
            // package name
            let name = match args.get(2) {
                Some(Value::Array(varargs)) => {
                    varargs.borrow().data.first().and_then(Value::host_str)
                }
                _ => None,
            };
            factories::package_info(&vm.session.config, name)
        }
        "getInstalledPackages" => {
            let info = factories::package_info(&vm.session.config, None);
            let list = crate::value::Instance::with_payload(
                "Ljava/util/ArrayList;",
                HostValue::List(vec![info]),
            );
            Value::Object(std::rc::Rc::new(std::cell::RefCell::new(list)))
        }
        other => {
            log::debug!("Method.invoke of unrecognized {other} returns null");
            Value::Null
        }
    };
    Ok(Some(result))
}

/// `Field.get(Object)`: opaque.
pub(crate) fn field_get(
    _vm: &mut Vm<'_>,
    _args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    Ok(Some(Value::Null))
}

/// `Throwable.getCause()`.
pub(crate) fn throwable_get_cause(
    _vm: &mut Vm<'_>,
    _args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    Ok(Some(Value::Null))
}
