//! Small functions all the other `DexTract` crates can benefit.

pub mod leb;
