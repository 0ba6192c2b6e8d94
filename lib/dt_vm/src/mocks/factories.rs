//! Factories for pre-shaped framework instances.
//!
//! Fields are populated at creation so that plain `iget` reads observe the
//! configured identity without per-field special cases in the field
//! handlers.

use crate::session::MockConfig;
use crate::value::{ArrayObj, HostValue, Instance, Value};
use std::cell::RefCell;
use std::rc::Rc;

const CONTEXT_CLASSES: &[&str] = &[
    "Landroid/content/Context;",
    "Landroid/app/Activity;",
    "Landroid/app/Application;",
];

#[must_use]
pub fn context(_config: &MockConfig) -> Value {
    Value::object("Landroid/content/Context;")
}

#[must_use]
pub fn package_manager() -> Value {
    Value::object("Landroid/content/pm/PackageManager;")
}

#[must_use]
pub fn signature(config: &MockConfig) -> Value {
    Value::Object(Rc::new(RefCell::new(Instance::with_payload(
        "Landroid/content/pm/Signature;",
        HostValue::Bytes(config.signature_bytes.clone()),
    ))))
}

#[must_use]
pub fn package_info(config: &MockConfig, package_name: Option<String>) -> Value {
    let mut instance = Instance::new("Landroid/content/pm/PackageInfo;");
    let name = package_name.unwrap_or_else(|| config.package_name.clone());
    instance.fields.insert("packageName".to_string(), Value::string(name));
    instance.fields.insert("versionCode".to_string(), Value::Int(1));
    instance
        .fields
        .insert("versionName".to_string(), Value::string("1.0"));
    instance.fields.insert(
        "signatures".to_string(),
        Value::array(ArrayObj {
            elem_type: "Landroid/content/pm/Signature;".to_string(),
            data: vec![signature(config)],
        }),
    );
    instance.fields.insert("signingInfo".to_string(), Value::Null);
    Value::Object(Rc::new(RefCell::new(instance)))
}

#[must_use]
pub fn application_info(config: &MockConfig) -> Value {
    let mut instance = Instance::new("Landroid/content/pm/ApplicationInfo;");
    instance.fields.insert(
        "packageName".to_string(),
        Value::string(config.package_name.clone()),
    );
    instance.fields.insert("flags".to_string(), Value::Int(0));
    instance
        .fields
        .insert("targetSdkVersion".to_string(), Value::Int(config.sdk_int));
    instance.fields.insert(
        "sourceDir".to_string(),
        Value::string(format!("/data/app/{}", config.package_name)),
    );
    Value::Object(Rc::new(RefCell::new(instance)))
}

/// Whether the mock layer has a pre-shaped instance for the class.
#[must_use]
pub fn is_mock_class(class: &str) -> bool {
    CONTEXT_CLASSES.contains(&class)
        || matches!(
            class,
            "Landroid/content/pm/PackageManager;"
                | "Landroid/content/pm/PackageInfo;"
                | "Landroid/content/pm/ApplicationInfo;"
                | "Landroid/content/pm/Signature;"
        )
}

/// A pre-shaped instance for the class, when the mock layer knows it.
#[must_use]
pub fn mock_for_class(class: &str, config: &MockConfig) -> Option<Value> {
    if CONTEXT_CLASSES.contains(&class) {
        return Some(context(config));
    }
    match class {
        "Landroid/content/pm/PackageManager;" => Some(package_manager()),
        "Landroid/content/pm/PackageInfo;" => Some(package_info(config, None)),
        "Landroid/content/pm/ApplicationInfo;" => Some(application_info(config)),
        "Landroid/content/pm/Signature;" => Some(signature(config)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_info_shape() {
        let config = MockConfig::default();
        let Value::Object(pi) = package_info(&config, None) else {
            panic!("not an instance");
        };
        let pi = pi.borrow();
        assert_eq!(
            pi.fields.get("packageName").unwrap().host_str().unwrap(),
            config.package_name
        );
        let Some(Value::Array(sigs)) = pi.fields.get("signatures") else {
            panic!("no signatures array");
        };
        assert_eq!(sigs.borrow().len(), 1);
    }

    #[test]
    fn mockable_classes() {
        assert!(is_mock_class("Landroid/app/Activity;"));
        assert!(!is_mock_class("Lcom/example/Foo;"));
        assert!(mock_for_class("Landroid/content/Context;", &MockConfig::default()).is_some());
        assert!(mock_for_class("Lcom/example/Foo;", &MockConfig::default()).is_none());
    }
}
