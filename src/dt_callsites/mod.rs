//! The `callsites` subcommand: list the call sites of a method and what
//! static analysis can say about each argument, without emulating the
//! target.

use crate::archive;
use crate::errors::{DtError, DtResult};
use crate::prelude::*;
use clap::ArgMatches;
use dt_analysis::callsites;

pub fn run(args: &ArgMatches) -> DtResult<()> {
    init_logger(args);

    let input = args
        .get_one::<String>("input")
        .ok_or_else(|| DtError::BadArguments("--input needed".to_string()))?;
    let target = args
        .get_one::<String>("target")
        .ok_or_else(|| DtError::BadArguments("--target needed".to_string()))?;
    let limit = args.get_one::<usize>("limit").copied().unwrap_or(0);

    let index = DexIndex::from_buffers(archive::read_dex_buffers(input)?)?;
    let (class, rest) = target
        .split_once("->")
        .ok_or_else(|| DtError::BadArguments(format!("invalid target format: {target}")))?;
    let name = rest.split('(').next().unwrap_or(rest);

    let sites = callsites::find_call_sites(&index, class, name, limit)?;
    println!("[*] {} call site(s) of {class}->{name}", sites.len());

    let config = crate::dt_emulate::mock_config_from(args)?;
    for site in &sites {
        println!("[*] {} @ pc {}", site.caller, site.pc);
        println!("    {}", site.instr);
        let resolved = callsites::recover_args(&index, &config, site)?;
        for (info, value) in resolved.args.iter().zip(&resolved.values) {
            let status = if info.resolved { "resolved" } else { "unresolved" };
            println!(
                "    v{}: {:?} ({status}, {}) = {}",
                info.register,
                info.source,
                info.detail,
                format_value(value)
            );
        }
    }
    Ok(())
}
