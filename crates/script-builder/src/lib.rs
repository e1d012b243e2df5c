//! JavaScript text assembly.
//!
//! This crate provides the low-level pieces the compiler uses to build the
//! client-side update program: string escaping for JS literals and HTML,
//! an incremental script builder, and the pre/post/destructor script triple
//! that control constructs compose.

/// Quote style for JS string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quote {
    /// Single-quoted literal (`'...'`).
    #[default]
    Single,
    /// Double-quoted literal (`"..."`).
    Double,
}

impl Quote {
    /// The delimiter character.
    pub const fn char(self) -> char {
        match self {
            Quote::Single => '\'',
            Quote::Double => '"',
        }
    }

    /// The opposite quote style.
    pub const fn other(self) -> Quote {
        match self {
            Quote::Single => Quote::Double,
            Quote::Double => Quote::Single,
        }
    }
}

/// Escape `s` into the body of a JS string literal for the given quote.
///
/// Handles the backslash, the delimiter itself, newlines and tabs. The
/// other quote character passes through unescaped.
pub fn escape_js(s: &str, quote: Quote) -> String {
    let delim = quote.char();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c == delim => {
                out.push('\\');
                out.push(delim);
            }
            c => out.push(c),
        }
    }
    out
}

/// A complete JS string literal, delimiters included.
pub fn js_string(s: &str, quote: Quote) -> String {
    let delim = quote.char();
    format!("{delim}{}{delim}", escape_js(s, quote))
}

/// Escape text for interpolation into HTML content or attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Incremental builder for generated script text.
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    code: String,
}

impl ScriptBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw text.
    pub fn push_str(&mut self, text: &str) {
        self.code.push_str(text);
    }

    /// Append text followed by a newline.
    pub fn push_line(&mut self, text: &str) {
        self.code.push_str(text);
        self.code.push('\n');
    }

    /// Current length of the generated text.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Whether nothing has been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Finish and return the generated text.
    pub fn finish(self) -> String {
        self.code
    }
}

/// The script triple a compiled construct contributes to the page.
///
/// `initial_pre_calc` runs before the construct's cells get their first
/// values, `initial_post_calc` right after the initial render is in the
/// DOM, and `destructor` when the construct's region is torn down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceScript {
    pub initial_pre_calc: String,
    pub initial_post_calc: String,
    pub destructor: String,
}

impl ResourceScript {
    /// An empty triple.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether all three parts are empty.
    pub fn is_empty(&self) -> bool {
        self.initial_pre_calc.is_empty()
            && self.initial_post_calc.is_empty()
            && self.destructor.is_empty()
    }

    /// Wrap every non-empty part in `prefix` / `suffix`.
    ///
    /// Empty parts stay empty so a construct that contributes nothing to a
    /// phase keeps contributing nothing after surrounding.
    pub fn surround(self, prefix: &str, suffix: &str) -> Self {
        let wrap = |part: String| {
            if part.is_empty() {
                part
            } else {
                format!("{prefix}{part}{suffix}")
            }
        };
        Self {
            initial_pre_calc: wrap(self.initial_pre_calc),
            initial_post_calc: wrap(self.initial_post_calc),
            destructor: wrap(self.destructor),
        }
    }

    /// Compose an ordered list of child triples.
    ///
    /// Pre- and post-calcs concatenate in child order; destructors in
    /// reverse child order. Empty parts are skipped and each phase is
    /// wrapped in one `{ }` block so sibling declarations cannot leak out.
    pub fn compose(children: &[ResourceScript]) -> Self {
        let pre: Vec<&str> = children
            .iter()
            .map(|c| c.initial_pre_calc.as_str())
            .filter(|s| !s.is_empty())
            .collect();
        let post: Vec<&str> = children
            .iter()
            .map(|c| c.initial_post_calc.as_str())
            .filter(|s| !s.is_empty())
            .collect();
        let destructor: Vec<&str> = children
            .iter()
            .rev()
            .map(|c| c.destructor.as_str())
            .filter(|s| !s.is_empty())
            .collect();

        ResourceScript {
            initial_pre_calc: format!("{{{}}}", pre.join("\n")),
            initial_post_calc: format!("{{{}}}", post.join("\n")),
            destructor: format!("{{{}}}", destructor.join("\n")),
        }
    }
}
