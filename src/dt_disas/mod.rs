//! The `disas` subcommand: print the trace-map disassembly the analyzers
//! and the interpreter work from.

use crate::archive;
use crate::errors::{DtError, DtResult};
use crate::prelude::*;
use clap::ArgMatches;
use regex::Regex;

pub fn run(args: &ArgMatches) -> DtResult<()> {
    init_logger(args);

    let input = args
        .get_one::<String>("input")
        .ok_or_else(|| DtError::BadArguments("--input needed".to_string()))?;
    let index = DexIndex::from_buffers(archive::read_dex_buffers(input)?)?;

    let class_pattern = args
        .get_one::<String>("filter-class")
        .map(|r| Regex::new(r))
        .transpose()?;
    let method_pattern = args
        .get_one::<String>("filter-method")
        .map(|r| Regex::new(r))
        .transpose()?;

    for site in index.iter_methods().filter(|m| m.code.is_some()) {
        if let Some(re) = &class_pattern {
            if !re.is_match(&site.class) {
                continue;
            }
        }
        if let Some(re) = &method_pattern {
            if !re.is_match(&site.name) {
                continue;
            }
        }
        println!("[*] {}", site.sig());
        let trace = index.trace_map(site)?;
        for (pc, (text, _)) in trace.iter() {
            println!("    {pc:04}: {text}");
        }
    }
    Ok(())
}
