//! Lexical and structural scanning of Apex source text.
//!
//! Detectors never compile Apex. They work on a masked view of the unit
//! (see [`ApexSource`]) plus a handful of structural facts: loop bodies,
//! method bodies and inline SOQL queries. Anything these scanners cannot
//! recognize is simply not reported.

mod soql;
mod source;
mod structure;

pub use soql::{find_queries, parse_snippet, signature, SelectItem, SelectItemKind, SoqlQuery};
pub use source::ApexSource;
pub use structure::{CodeStructure, MethodRange};

/// File extensions of Apex units.
pub const APEX_EXTENSIONS: &[&str] = &["cls", "trigger"];

/// Whether a file extension names an Apex unit (case-insensitive).
pub fn is_apex_extension(ext: &str) -> bool {
    APEX_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
}
