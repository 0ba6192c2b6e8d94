use dextract::prelude::*;
use dextract::{cli, dt_callsites, dt_disas, dt_emulate};

fn main() -> DtResult<()> {
    let args = cli::dextract().get_matches();

    match &args.subcommand() {
        Some(("emulate", cmd_args)) => dt_emulate::run(cmd_args),
        Some(("callsites", cmd_args)) => dt_callsites::run(cmd_args),
        Some(("disas", cmd_args)) => dt_disas::run(cmd_args),
        Some((subcommand, _)) => Err(DtError::BadArguments(format!(
            "unknown subcommand '{subcommand}'"
        ))),
        None => Err(DtError::BadArguments("missing subcommand".to_string())),
    }
}
