//! Main `DexTract` binary command line arguments options.
//!
//! This module declares a function to build the `clap` command line
//! arguments parser, so that it can be used from other places than the
//! main binary.

use clap::{value_parser, Arg, ArgAction, Command};

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

fn arg_debug() -> Arg {
    Arg::new("debug")
        .short('d')
        .long("debug")
        .action(ArgAction::SetTrue)
        .help("Activate debug mode")
}

fn arg_verbose() -> Arg {
    Arg::new("verbose")
        .short('v')
        .long("verbose")
        .action(ArgAction::SetTrue)
        .help("Activate verbose mode")
}

fn arg_input() -> Arg {
    Arg::new("input")
        .short('i')
        .long("input")
        .action(ArgAction::Set)
        .required(true)
        .help("Input apk or dex file")
}

fn arg_target() -> Arg {
    Arg::new("target")
        .short('t')
        .long("target")
        .action(ArgAction::Set)
        .required(true)
        .help("Target method, as Lpkg/Cls;->name or Lpkg/Cls;->name(args)ret")
}

fn arg_limit() -> Arg {
    Arg::new("limit")
        .short('l')
        .long("limit")
        .action(ArgAction::Set)
        .value_parser(value_parser!(usize))
        .default_value("0")
        .help("Only process the first N call sites (0 = all)")
}

fn arg_json() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Emit the results as JSON")
}

fn arg_package_name() -> Arg {
    Arg::new("package-name")
        .long("package-name")
        .action(ArgAction::Set)
        .help("Package name reported by the mocked Context")
}

fn arg_sdk_int() -> Arg {
    Arg::new("sdk-int")
        .long("sdk-int")
        .action(ArgAction::Set)
        .value_parser(value_parser!(i32))
        .help("Value of the mocked Build.VERSION.SDK_INT")
}

fn arg_signature_hex() -> Arg {
    Arg::new("signature-hex")
        .long("signature-hex")
        .action(ArgAction::Set)
        .help("Hex-encoded signing certificate reported by the mocked Signature")
}

fn arg_filter_class() -> Arg {
    Arg::new("filter-class")
        .long("filter-class")
        .action(ArgAction::Set)
        .help("Class(es) regex filter")
}

fn arg_filter_method() -> Arg {
    Arg::new("filter-method")
        .long("filter-method")
        .action(ArgAction::Set)
        .help("Method(s) regex filter")
}

#[must_use]
pub fn dextract() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .author(AUTHORS)
        .about(DESCRIPTION)
        .subcommand(emulate())
        .subcommand(callsites())
        .subcommand(disas())
}

fn emulate() -> Command {
    Command::new("emulate")
        .about("Recovers arguments at every call site of a method and executes it")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_input())
        .arg(arg_target())
        .arg(arg_limit())
        .arg(arg_json())
        .arg(arg_package_name())
        .arg(arg_sdk_int())
        .arg(arg_signature_hex())
}

fn callsites() -> Command {
    Command::new("callsites")
        .about("Lists the call sites of a method with statically recovered arguments")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_input())
        .arg(arg_target())
        .arg(arg_limit())
}

fn disas() -> Command {
    Command::new("disas")
        .about("Prints the trace-map disassembly of the application methods")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_input())
        .arg(arg_filter_class())
        .arg(arg_filter_method())
}
