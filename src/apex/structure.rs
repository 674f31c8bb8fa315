//! Lightweight structural scan: loop bodies and method bodies.
//!
//! This is not a parser. It recognizes just enough block structure in the
//! masked text to answer two questions for any offset: is it inside a loop
//! body, and which method encloses it.

use lazy_static::lazy_static;
use phf::phf_set;
use regex::Regex;
use std::ops::Range;

use super::ApexSource;

lazy_static! {
    static ref LOOP_KEYWORD: Regex = Regex::new(r"(?i)\b(?:for|while|do)\b").unwrap();
    static ref CALL_LIKE: Regex = Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap();
    static ref TRIGGER_HEADER: Regex = Regex::new(r"(?i)^\s*trigger\b").unwrap();
    static ref ACCESSOR: Regex = Regex::new(
        r"(?i)(?:[{};]|\b(?:public|private|protected|global))\s*\b(get|set)\s*\{"
    )
    .unwrap();
}

/// Words that can precede `(` without starting a method declaration.
static NON_METHOD_WORDS: phf::Set<&'static str> = phf_set! {
    "if", "for", "while", "do", "switch", "catch", "return", "new", "super",
    "this", "when", "else", "throw", "on", "insert", "update", "upsert",
    "delete", "undelete", "merge", "instanceof", "try", "finally",
};

/// A method (or constructor) body located in the unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRange {
    /// Bare method name, as written.
    pub name: String,
    /// Name plus parameter types, e.g. `load(String, Integer)`.
    pub signature: String,
    /// Byte range of the body, braces included.
    pub body: Range<usize>,
}

/// Loop and method layout of one unit.
#[derive(Debug, Clone, Default)]
pub struct CodeStructure {
    loops: Vec<Range<usize>>,
    methods: Vec<MethodRange>,
    is_trigger: bool,
}

impl CodeStructure {
    /// Scan a unit for loop bodies and method bodies.
    pub fn analyze(src: &ApexSource<'_>) -> Self {
        Self {
            loops: find_loop_bodies(src),
            methods: find_methods(src)
                .into_iter()
                .chain(find_accessors(src))
                .collect(),
            is_trigger: TRIGGER_HEADER.is_match(src.masked()),
        }
    }

    /// Whether `offset` falls inside any loop body.
    ///
    /// Loop headers are not part of the body: a query used as the iterable
    /// of a `for` loop runs once per loop, not once per iteration.
    pub fn in_loop(&self, offset: usize) -> bool {
        self.loops.iter().any(|body| body.contains(&offset))
    }

    /// The innermost method whose body contains `offset`.
    pub fn enclosing_method(&self, offset: usize) -> Option<&MethodRange> {
        self.methods
            .iter()
            .filter(|m| m.body.contains(&offset))
            .min_by_key(|m| m.body.len())
    }

    /// Whether the unit is a trigger rather than a class.
    pub fn is_trigger(&self) -> bool {
        self.is_trigger
    }

    pub fn methods(&self) -> &[MethodRange] {
        &self.methods
    }
}

fn find_loop_bodies(src: &ApexSource<'_>) -> Vec<Range<usize>> {
    let masked = src.masked();
    let bytes = masked.as_bytes();
    let mut bodies = Vec::new();

    for kw in LOOP_KEYWORD.find_iter(masked) {
        if preceded_by_dot(masked, kw.start()) {
            continue;
        }

        let Some(next) = src.skip_whitespace(kw.end()) else {
            continue;
        };

        let body_start = if kw.as_str().eq_ignore_ascii_case("do") {
            next
        } else {
            // for/while: header in parentheses, body after it
            if bytes[next] != b'(' {
                continue;
            }
            let Some(close) = src.matching_close(next) else {
                continue;
            };
            match src.skip_whitespace(close + 1) {
                Some(pos) => pos,
                None => continue,
            }
        };

        match bytes[body_start] {
            b'{' => {
                if let Some(close) = src.matching_close(body_start) {
                    bodies.push(body_start..close + 1);
                }
            }
            // `while (cond);` closing a do-while has no body of its own
            b';' => {}
            _ => {
                let end = bytes[body_start..]
                    .iter()
                    .position(|&b| b == b';')
                    .map(|p| body_start + p + 1)
                    .unwrap_or(bytes.len());
                bodies.push(body_start..end);
            }
        }
    }

    bodies
}

fn find_methods(src: &ApexSource<'_>) -> Vec<MethodRange> {
    let masked = src.masked();
    let bytes = masked.as_bytes();
    let mut methods = Vec::new();

    for caps in CALL_LIKE.captures_iter(masked) {
        let Some(name) = caps.get(1) else {
            continue;
        };
        if NON_METHOD_WORDS.contains(name.as_str().to_ascii_lowercase().as_str()) {
            continue;
        }

        // A declaration has a return type or modifier right before the name.
        let before = masked[..name.start()].trim_end();
        let Some(last) = before.chars().last() else {
            continue;
        };
        if !(last.is_ascii_alphanumeric() || last == '_' || last == '>' || last == ']') {
            continue;
        }
        let prev_word = before
            .rsplit(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        if NON_METHOD_WORDS.contains(prev_word.as_str()) {
            continue;
        }

        let open = name.end() + masked[name.end()..].find('(').unwrap_or(0);
        let Some(close) = src.matching_close(open) else {
            continue;
        };
        let Some(body_start) = src.skip_whitespace(close + 1) else {
            continue;
        };
        if bytes[body_start] != b'{' {
            continue;
        }
        let Some(body_end) = src.matching_close(body_start) else {
            continue;
        };

        let params = parameter_types(&masked[open + 1..close]);
        methods.push(MethodRange {
            name: name.as_str().to_string(),
            signature: format!("{}({})", name.as_str(), params.join(", ")),
            body: body_start..body_end + 1,
        });
    }

    methods
}

/// Property `get { ... }` and `set { ... }` blocks, named `get_<property>`
/// and `set_<property>`. Auto-properties (`{ get; set; }`) have no body.
fn find_accessors(src: &ApexSource<'_>) -> Vec<MethodRange> {
    let masked = src.masked();
    let mut accessors = Vec::new();

    for caps in ACCESSOR.captures_iter(masked) {
        let (Some(whole), Some(keyword)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let open = whole.end() - 1;
        let Some(close) = src.matching_close(open) else {
            continue;
        };
        let Some(property) = enclosing_open_brace(masked, keyword.start())
            .and_then(|brace| trailing_identifier(&masked[..brace]))
        else {
            continue;
        };

        let name = format!("{}_{}", keyword.as_str().to_ascii_lowercase(), property);
        accessors.push(MethodRange {
            signature: format!("{}()", name),
            name,
            body: open..close + 1,
        });
    }

    accessors
}

/// Offset of the innermost unclosed `{` before `pos`.
fn enclosing_open_brace(text: &str, pos: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in text.as_bytes()[..pos].iter().enumerate().rev() {
        match b {
            b'}' => depth += 1,
            b'{' if depth == 0 => return Some(i),
            b'{' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn trailing_identifier(text: &str) -> Option<&str> {
    let trimmed = text.trim_end();
    let start = trimmed
        .rfind(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .map(|i| i + 1)
        .unwrap_or(0);
    let ident = &trimmed[start..];
    (!ident.is_empty()).then_some(ident)
}

fn preceded_by_dot(text: &str, pos: usize) -> bool {
    text[..pos].trim_end().ends_with('.')
}

/// Extract parameter types from a parameter list, dropping names and `final`.
fn parameter_types(params: &str) -> Vec<String> {
    let mut types = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();

    for c in params.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                types.extend(parameter_type(&current));
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    types.extend(parameter_type(&current));
    types
}

fn parameter_type(param: &str) -> Option<String> {
    let collapsed = param.split_whitespace().collect::<Vec<_>>().join(" ");
    let without_final = collapsed
        .strip_prefix("final ")
        .unwrap_or(&collapsed)
        .to_string();
    let (ty, _name) = without_final.rsplit_once(' ')?;
    Some(ty.replace(", ", ","))
}
