//! Trace line parsing shared by the analyzers.
//!
//! All of this parses the renderer's own output (see `dt_dex::disas` for
//! the format contract), so the grammar is deliberately narrow.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref REG: Regex = Regex::new(r"v(\d+)").unwrap();
}

/// The mnemonic of a trace line.
pub(crate) fn mnemonic(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

/// Every register mentioned on the line, in order.
pub(crate) fn all_regs(line: &str) -> Vec<u16> {
    REG.captures_iter(line)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

/// The registers passed to an invoke or `filled-new-array` line: the
/// brace list, with `{vA .. vB}` ranges expanded.
pub(crate) fn invoke_arg_regs(line: &str) -> Vec<u16> {
    let Some(open) = line.find('{') else {
        return Vec::new();
    };
    let Some(close) = line[open..].find('}') else {
        return Vec::new();
    };
    let inner = &line[open + 1..open + close];
    if inner.contains("..") {
        let bounds = all_regs(inner);
        match bounds.as_slice() {
            [first, last] if first <= last => (*first..=*last).collect(),
            _ => Vec::new(),
        }
    } else {
        all_regs(inner)
    }
}

/// The register an instruction writes, if the family has one.
pub(crate) fn written_reg(line: &str) -> Option<u16> {
    let m = mnemonic(line);
    let writes_first = m.starts_with("const")
        || (m.starts_with("move") && !m.starts_with("move-exception"))
        || m.starts_with("sget")
        || m.starts_with("iget")
        || m.starts_with("aget")
        || m == "new-instance"
        || m == "new-array"
        || m == "array-length"
        || m == "instance-of"
        || m == "check-cast"
        || m.starts_with("neg-")
        || m.starts_with("not-")
        || m.starts_with("int-to-")
        || m.starts_with("long-to-")
        || m.starts_with("float-to-")
        || m.starts_with("double-to-")
        || m.starts_with("cmp")
        || m.starts_with("add-")
        || m.starts_with("sub-")
        || m.starts_with("rsub-")
        || m.starts_with("mul-")
        || m.starts_with("div-")
        || m.starts_with("rem-")
        || m.starts_with("and-")
        || m.starts_with("or-")
        || m.starts_with("xor-")
        || m.starts_with("shl-")
        || m.starts_with("shr-")
        || m.starts_with("ushr-");
    if writes_first {
        all_regs(line).first().copied()
    } else {
        None
    }
}

/// The trailing decimal literal of a const/literal-operand line.
pub(crate) fn literal(line: &str) -> Option<i64> {
    line.rsplit(|c: char| c == ' ' || c == ',')
        .find(|t| !t.is_empty())?
        .parse()
        .ok()
}

/// The unified string pool index from a `// string@N` suffix.
pub(crate) fn string_pool_index(line: &str) -> Option<usize> {
    let idx = line.rfind("// string@")?;
    line[idx + "// string@".len()..]
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

/// The quoted literal of a `const-string` line (fallback when no pool is
/// available to resolve `string@N`).
pub(crate) fn quoted_text(line: &str) -> Option<&str> {
    let start = line.find('"')?;
    let end = line.rfind('"')?;
    if end > start {
        Some(&line[start + 1..end])
    } else {
        None
    }
}

/// The last comma-separated operand (type descriptors, field refs).
pub(crate) fn last_operand(line: &str) -> Option<&str> {
    line.rsplit(", ").next().filter(|t| !t.is_empty())
}
