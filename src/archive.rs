//! Application archive access.
//!
//! Apks are zip containers holding one or more `classesN.dex` members;
//! plain `.dex` files are accepted directly. Only the raw buffers are
//! produced here; parsing belongs to `dt_dex`.

use crate::errors::{DtError, DtResult};
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Reads every dex buffer out of an apk (or a bare dex file), in
/// `classes.dex`, `classes2.dex`, … order.
pub fn read_dex_buffers<P: AsRef<Path>>(path: P) -> DtResult<Vec<(String, Vec<u8>)>> {
    let path = path.as_ref();
    if path.extension().is_some_and(|ext| ext == "dex") {
        let mut contents = Vec::new();
        File::open(path)?.read_to_end(&mut contents)?;
        let name = path
            .file_name()
            .map_or_else(|| "classes.dex".to_string(), |n| n.to_string_lossy().into_owned());
        return Ok(vec![(name, contents)]);
    }

    let member_pattern = Regex::new(r"^classes\d*\.dex$")?;
    let mut zip = zip::ZipArchive::new(File::open(path)?)?;
    let mut names: Vec<String> = zip
        .file_names()
        .filter(|name| member_pattern.is_match(name))
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        return Err(DtError::BadArguments(format!(
            "no classes*.dex member in {}",
            path.display()
        )));
    }
    // classes.dex sorts before classes2.dex, classes10.dex after classes9.dex
    names.sort_by_key(|name| {
        name.trim_start_matches("classes")
            .trim_end_matches(".dex")
            .parse::<u32>()
            .unwrap_or(1)
    });

    let mut buffers = Vec::with_capacity(names.len());
    for name in names {
        let mut member = zip.by_name(&name)?;
        let mut contents = Vec::with_capacity(member.size() as usize);
        member.read_to_end(&mut contents)?;
        log::debug!("read {name} ({} bytes)", contents.len());
        buffers.push((name, contents));
    }
    Ok(buffers)
}
