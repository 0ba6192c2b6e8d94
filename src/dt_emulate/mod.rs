//! The `emulate` subcommand: find the call sites of the target method,
//! recover the arguments at each one, execute the target against the
//! mocked runtime, and report the results.

use crate::archive;
use crate::errors::{DtError, DtResult};
use crate::prelude::*;
use clap::ArgMatches;
use dt_analysis::callsites;
use dt_vm::interp::TOP_STEP_LIMIT;
use dt_vm::VmError;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Serialize)]
pub struct SiteReport {
    pub caller: String,
    pub pc: usize,
    pub instr: String,
    pub args: Vec<String>,
    /// Registers whose value could not be reconstructed statically.
    pub unresolved: Vec<u16>,
    pub result: Option<String>,
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub kind: String,
    pub pc: Option<usize>,
    pub method: Option<String>,
    pub disassembly: Option<String>,
    pub message: String,
}

pub fn run(args: &ArgMatches) -> DtResult<()> {
    init_logger(args);

    let input = args
        .get_one::<String>("input")
        .ok_or_else(|| DtError::BadArguments("--input needed".to_string()))?;
    let target = args
        .get_one::<String>("target")
        .ok_or_else(|| DtError::BadArguments("--target needed".to_string()))?;
    let limit = args.get_one::<usize>("limit").copied().unwrap_or(0);
    let config = mock_config_from(args)?;

    let index = DexIndex::from_buffers(archive::read_dex_buffers(input)?)?;
    let site = resolve_target(&index, target)?;
    println!("[*] Target: {}", site.sig());

    let mut analyzer = DependencyAnalyzer::new(&index);
    let deps = analyzer.analyze_method(site, true)?;
    println!(
        "[*] Dependencies: {} class(es) to initialize, {} static field(s), {} method(s) called",
        deps.classes_needing_init.len(),
        deps.static_fields.len(),
        deps.methods_called.len()
    );

    let sites = callsites::find_call_sites(&index, &site.class, &site.name, limit)?;
    if sites.is_empty() {
        println!("[!] No call sites found");
        return Ok(());
    }
    println!("[+] Found {} call site(s)", sites.len());

    // callers' initializers may publish the keys the target reads
    let mut init_classes: BTreeSet<String> = deps.classes_needing_init.clone();
    for s in &sites {
        if let Some((class, _)) = s.caller.split_once("->") {
            init_classes.insert(class.to_string());
        }
    }

    let mut reports = Vec::with_capacity(sites.len());
    for (i, call_site) in sites.iter().enumerate() {
        println!("[{}] {} @ pc {}", i + 1, call_site.caller, call_site.pc);
        println!("    {}", call_site.instr);

        let resolved = callsites::recover_args(&index, &config, call_site)?;
        let formatted_args: Vec<String> = resolved.values.iter().map(format_value).collect();
        println!("    Args: ({})", formatted_args.join(", "));

        // every emulation starts from a fresh session
        let mut vm = Vm::new(&index, Session::new(config.clone()));
        for class in &init_classes {
            vm.run_clinit(class)?;
        }
        let report = match vm.execute_site(site, resolved.values.clone(), TOP_STEP_LIMIT) {
            Ok(result) => {
                let text = result.as_ref().map(format_value);
                println!("    => {}", text.as_deref().unwrap_or("void"));
                let unresolved = unresolved_regs(&resolved);
                SiteReport {
                    caller: resolved.caller,
                    pc: resolved.pc,
                    instr: resolved.instr,
                    args: formatted_args,
                    unresolved,
                    result: text,
                    error: None,
                }
            }
            Err(err) => {
                println!("    => error: {err}");
                let unresolved = unresolved_regs(&resolved);
                SiteReport {
                    caller: resolved.caller,
                    pc: resolved.pc,
                    instr: resolved.instr,
                    args: formatted_args,
                    unresolved,
                    result: None,
                    error: Some(error_report(&index, site, &err)),
                }
            }
        };
        reports.push(report);
    }

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("{}", "=".repeat(50));
        println!("SUMMARY:");
        for (i, report) in reports.iter().enumerate() {
            match (&report.result, &report.error) {
                (Some(text), _) => println!("  [{}] {}", i + 1, text),
                (None, Some(err)) => println!("  [{}] error: {}", i + 1, err.message),
                (None, None) => println!("  [{}] void", i + 1),
            }
        }
        println!("[*] Done. Emulated {} call(s).", reports.len());
    }
    Ok(())
}

fn unresolved_regs(site: &ResolvedSite) -> Vec<u16> {
    site.args
        .iter()
        .filter(|a| !a.resolved)
        .map(|a| a.register)
        .collect()
}

/// Resolves the target from `Lpkg/Cls;->name` or the full
/// `Lpkg/Cls;->name(args)ret` form.
fn resolve_target<'a>(index: &'a DexIndex, target: &str) -> DtResult<&'a MethodSite> {
    let (class, rest) = target
        .split_once("->")
        .ok_or_else(|| DtError::BadArguments(format!("invalid target format: {target}")))?;
    let site = if rest.contains('(') {
        index.method(target)
    } else {
        index.find_method(class, rest)
    };
    site.filter(|s| s.code.is_some())
        .ok_or_else(|| DtError::BadArguments(format!("method not found or abstract: {target}")))
}

pub(crate) fn mock_config_from(args: &ArgMatches) -> DtResult<MockConfig> {
    let mut config = MockConfig::default();
    if let Some(name) = args.try_get_one::<String>("package-name").ok().flatten() {
        config.package_name = name.clone();
    }
    if let Some(sdk) = args.try_get_one::<i32>("sdk-int").ok().flatten() {
        config.sdk_int = *sdk;
    }
    if let Some(hex) = args.try_get_one::<String>("signature-hex").ok().flatten() {
        config.signature_bytes = parse_hex(hex)?;
    }
    Ok(config)
}

fn parse_hex(hex: &str) -> DtResult<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(DtError::BadArguments(
            "--signature-hex needs an even number of digits".to_string(),
        ));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| {
                DtError::BadArguments(format!("--signature-hex: invalid digits at {i}"))
            })
        })
        .collect()
}

fn error_report(index: &DexIndex, site: &MethodSite, err: &VmError) -> ErrorReport {
    let (kind, pc, method) = match err {
        VmError::UnknownOpcode { pc, method, .. } => ("decode", Some(*pc), Some(method.clone())),
        VmError::PcOutOfRange { pc, method } => ("decode", Some(*pc), Some(method.clone())),
        VmError::MalformedPayload { pc, method, .. } => ("decode", Some(*pc), Some(method.clone())),
        VmError::RegisterOutOfBounds { pc, method, .. }
        | VmError::ArrayIndexOutOfBounds { pc, method, .. }
        | VmError::NegativeArrayLength { pc, method, .. }
        | VmError::DivisionByZero { pc, method }
        | VmError::Thrown { pc, method, .. } => ("runtime", Some(*pc), Some(method.clone())),
        VmError::MethodNotFound(m) => ("resolution", None, Some(m.clone())),
        VmError::StringNotFound { .. } => ("resolution", None, None),
        VmError::StepLimit { method, .. } | VmError::CallDepthExceeded(method) => {
            ("policy", None, Some(method.clone()))
        }
        VmError::Dex(_) => ("resolution", None, None),
    };
    let disassembly = pc.and_then(|pc| {
        index
            .trace_map(site)
            .ok()
            .and_then(|trace| trace.get(&pc).map(|(text, _)| text.clone()))
    });
    ErrorReport {
        kind: kind.to_string(),
        pc,
        method,
        disassembly,
        message: err.to_string(),
    }
}
