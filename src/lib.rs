//! Transpiler from the nest brace syntax to indentation-delimited Python.
//!
//! ```
//! let out = nestc::transpile("if x>0{=> x}", &nestc::Options::default()).unwrap();
//! assert_eq!(out, "if x>0:\n return x\n\n");
//! ```

mod error;
pub mod macros;
pub mod options;
pub mod parser;
pub mod processor;
pub mod token;

use std::path::Path;
use std::sync::Once;

pub use error::Error;
pub use macros::MacroTable;
pub use options::{Dialect, Options};
pub use processor::{Transpiler, TranspilingReader};
pub use token::{Tags, Token, TokenKind};

/// Transpile one source text.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(label = options.source_label.as_deref(), len = source.len())
)]
pub fn transpile(source: &str, options: &Options) -> Result<String, Error> {
    Transpiler::new(options).run(source)
}

/// Transpile a `.npy` or `.npx` file. The extension picks the dialect and the
/// path becomes the source label.
pub fn transpile_file(path: impl AsRef<Path>, options: &Options) -> Result<String, Error> {
    let path = path.as_ref();
    let dialect =
        Dialect::from_path(path).ok_or_else(|| Error::UnknownExtension(path.to_path_buf()))?;
    let source = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let options = options
        .clone()
        .with_dialect(dialect)
        .with_source_label(path.display().to_string());
    transpile(&source, &options)
}

static TRACING_INIT: Once = Once::new();

/// Install a stderr subscriber for trace and engine events.
///
/// Filtered by `RUST_LOG`; without it only `nestc::trace` progress lines are
/// shown. Safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("nestc::trace=info"));
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(filter)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::PathBuf;

    fn scratch(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nestc-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_transpile_program() {
        let source = "\
/|!/usr/bin/env python|/
#LIMIT#!3!#
:= count(n) >: int {
    i = 0;
    ~{
        if i >= n || i >= $LIMIT { => i }
        i++;
    }
}
";
        let expected = "#!/usr/bin/env python\n\
def count(n) -> int:\n i = 0\n while True:\n  if i >= n or i >= 3:\n   return i \n  i+=1\n  \n \n\n";
        assert_eq!(transpile(source, &Options::default()).unwrap(), expected);
    }

    #[test]
    fn test_transpile_file_picks_dialect() {
        let standard = scratch("plain.npy", "$= int x");
        let extended = scratch("typed.npx", "$= int x");
        let options = Options::default();

        assert_eq!(transpile_file(&standard, &options).unwrap(), "= int x\n");
        assert_eq!(transpile_file(&extended, &options).unwrap(), "cdef int x\n");
    }

    #[test]
    fn test_transpile_file_errors() {
        let options = Options::default();

        let unknown = scratch("notes.txt", "x");
        assert!(matches!(
            transpile_file(&unknown, &options),
            Err(Error::UnknownExtension(path)) if path == unknown
        ));

        let missing = std::env::temp_dir().join("nestc-missing-dir/absent.npy");
        assert!(matches!(
            transpile_file(&missing, &options),
            Err(Error::Io { path, .. }) if path == missing
        ));
    }

    #[test]
    fn test_trace_with_subscriber() {
        init_tracing();
        init_tracing();
        let options = Options::default().with_trace(true).with_source_label("demo");
        assert_eq!(transpile("a && b", &options).unwrap(), "a and b\n");
    }

    #[test]
    fn test_independent_compiles() {
        let options = Options::default();
        transpile("#M#!1!#", &options).unwrap();
        assert_eq!(transpile("$M", &options).unwrap(), "\n");
    }
}
