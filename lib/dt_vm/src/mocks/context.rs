//! Hooks for the Android app-identity surface: Context, PackageManager,
//! PackageInfo, Signature.

use crate::errors::VmResult;
use crate::interp::Vm;
use crate::mocks::factories;
use crate::value::{ArrayObj, HostValue, Value};

fn hexlify(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<String>>()
        .concat()
}

// Certificate bytes behind a Signature receiver, falling back to the
// configured ones when the receiver is opaque.
fn cert_bytes(vm: &Vm<'_>, receiver: Option<&Value>) -> Vec<u8> {
    if let Some(Value::Object(obj)) = receiver {
        if let Some(HostValue::Bytes(bytes)) = &obj.borrow().payload {
            return bytes.clone();
        }
    }
    vm.session.config.signature_bytes.clone()
}

/// `Context.getPackageManager()`.
pub(crate) fn get_package_manager(
    _vm: &mut Vm<'_>,
    _args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    Ok(Some(factories::package_manager()))
}

/// `Context.getPackageName()`.
pub(crate) fn get_package_name(
    vm: &mut Vm<'_>,
    _args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    Ok(Some(Value::string(vm.session.config.package_name.clone())))
}

/// `PackageManager.getPackageInfo(String, int)`.
pub(crate) fn get_package_info(
    vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let name = args.get(1).and_then(Value::host_str);
    Ok(Some(factories::package_info(&vm.session.config, name)))
}

/// `PackageManager.getInstalledPackages(int)`.
pub(crate) fn get_installed_packages(
    vm: &mut Vm<'_>,
    _args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let info = factories::package_info(&vm.session.config, None);
    let list = crate::value::Instance::with_payload(
        "Ljava/util/ArrayList;",
        HostValue::List(vec![info]),
    );
    Ok(Some(Value::Object(std::rc::Rc::new(
        std::cell::RefCell::new(list),
    ))))
}

/// `Signature.toByteArray()`.
pub(crate) fn signature_to_byte_array(
    vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let bytes = cert_bytes(vm, args.first());
    Ok(Some(Value::array(ArrayObj::from_bytes(&bytes))))
}

/// `Signature.toCharsString()`: lowercase hex of the certificate bytes.
pub(crate) fn signature_to_chars_string(
    vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let bytes = cert_bytes(vm, args.first());
    Ok(Some(Value::string(hexlify(&bytes))))
}

/// `Signature.hashCode()`: the Java string hash of the hex form.
pub(crate) fn signature_hash_code(
    vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let hex = hexlify(&cert_bytes(vm, args.first()));
    let mut h: i32 = 0;
    for c in hex.chars() {
        h = h.wrapping_mul(31).wrapping_add(c as i32);
    }
    Ok(Some(Value::Int(h)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockConfig, Session};

    #[test]
    fn chars_string_is_hex_of_config() {
        let config = MockConfig {
            signature_bytes: vec![0x0f, 0x3c, 0x63],
            ..MockConfig::default()
        };
        let mut vm = Vm::detached(Session::new(config));
        let out = signature_to_chars_string(&mut vm, &[], "").unwrap().unwrap();
        assert_eq!(out.host_str().as_deref(), Some("0f3c63"));
    }

    #[test]
    fn package_name_follows_config() {
        let config = MockConfig {
            package_name: "org.sample".to_string(),
            ..MockConfig::default()
        };
        let mut vm = Vm::detached(Session::new(config));
        let out = get_package_name(&mut vm, &[], "").unwrap().unwrap();
        assert_eq!(out.host_str().as_deref(), Some("org.sample"));
    }
}
