//! # `DexTract`
//!
//! `dextract` is the main crate of the `DexTract` project: a targeted
//! Dalvik bytecode emulator that finds every call site of a method inside
//! an Android application, reconstructs the concrete arguments at each
//! site, and executes the method against a mocked runtime. Its purpose is
//! recovering the plaintext behind string-decryption routines in protected
//! applications.
//!
//! ## Library basics
//!
//! ```no_run
//! use dextract::prelude::*;
//! use dextract::archive;
//!
//! let buffers = archive::read_dex_buffers("app.apk")?;
//! let index = DexIndex::from_buffers(buffers)?;
//! let mut vm = Vm::new(&index, Session::new(MockConfig::default()));
//! let site = index
//!     .method("Lcom/app/Obf;->dec(Ljava/lang/String;)Ljava/lang/String;")
//!     .expect("target method");
//! let result = vm.execute_site(site, vec![Value::string("k3y")], 10_000)?;
//! println!("{:?}", result);
//! # Ok::<(), DtError>(())
//! ```
//!
//! ## Sub-crates
//!
//!  - [`dt_dex`] parses the dex containers, disassembles bytecode into
//!    trace maps and presents the unified multi-dex index,
//!  - [`dt_vm`] holds the value domain, the interpreter, the class loader
//!    and the Android/Java mock layer,
//!  - [`dt_analysis`] recovers call-site arguments statically and
//!    enumerates method dependencies,
//!  - [`dt_utils`] contains the small functions all the other crates can
//!    benefit.

mod errors;

pub mod archive;
pub mod cli;
pub mod dt_callsites;
pub mod dt_disas;
pub mod dt_emulate;

pub use dt_analysis as analysis;
pub use dt_dex as dex;
pub use dt_utils as utils;
pub use dt_vm as vm;

/// Reexport module of commonly used structures and functions from
/// `DexTract` project sub-crates:
///
/// ```rust
/// use dextract::prelude::*;
/// ```
pub mod prelude {
    pub use crate::errors::{DtError, DtResult};

    pub use dt_analysis::{ArgInfo, ArgSource, DependencyAnalyzer, ResolvedSite};
    pub use dt_dex::{CallSite, DexIndex, MethodSite};
    pub use dt_vm::{format_value, MockConfig, Session, Value, Vm};

    use clap::ArgMatches;

    pub fn init_logger(args: &ArgMatches) {
        let env = env_logger::Env::new()
            .filter_or("DT_LOG", "info")
            .write_style("DT_LOG_STYLE");

        let mut builder = env_logger::Builder::from_env(env);
        if args.get_flag("verbose") {
            builder.filter_level(log::LevelFilter::Trace);
        } else if args.get_flag("debug") {
            builder.filter_level(log::LevelFilter::Debug);
        }
        builder.init();
    }
}
