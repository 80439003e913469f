use std::path::Path;

/// Which token set the lexer recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Standard,
    /// Adds the `cdef`/`cpdef` spellings of the extended dialect.
    Extended,
}

impl Dialect {
    /// Dialect implied by a source file extension (`.npy` or `.npx`).
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "npy" => Some(Dialect::Standard),
            "npx" => Some(Dialect::Extended),
            _ => None,
        }
    }
}

/// Settings for one compile.
#[derive(Debug, Clone)]
pub struct Options {
    /// Repeated once per indentation level.
    pub indent_unit: String,
    pub dialect: Dialect,
    /// Report lexer progress on the `nestc::trace` target.
    pub trace: bool,
    /// Name of the source, shown in trace output only.
    pub source_label: Option<String>,
    /// Maximum number of macro expansions per compile. `None` is unbounded.
    pub expansion_limit: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            indent_unit: " ".to_string(),
            dialect: Dialect::Standard,
            trace: false,
            source_label: None,
            expansion_limit: None,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_indent_unit(mut self, unit: impl Into<String>) -> Self {
        self.indent_unit = unit.into();
        self
    }

    /// Indent with `width` spaces per level.
    pub fn with_indent_width(self, width: usize) -> Self {
        self.with_indent_unit(" ".repeat(width))
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_source_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = Some(label.into());
        self
    }

    pub fn with_expansion_limit(mut self, limit: usize) -> Self {
        self.expansion_limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_path() {
        assert_eq!(Dialect::from_path(Path::new("pkg/mod.npy")), Some(Dialect::Standard));
        assert_eq!(Dialect::from_path(Path::new("mod.npx")), Some(Dialect::Extended));
        assert_eq!(Dialect::from_path(Path::new("mod.py")), None);
        assert_eq!(Dialect::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_builder() {
        let options = Options::new()
            .with_indent_width(4)
            .with_dialect(Dialect::Extended)
            .with_source_label("main.npx");
        assert_eq!(options.indent_unit, "    ");
        assert_eq!(options.dialect, Dialect::Extended);
        assert_eq!(options.source_label.as_deref(), Some("main.npx"));
        assert!(!options.trace);
        assert_eq!(options.expansion_limit, None);
    }
}
