use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot undefine macro `{name}`: not defined at depth {depth}")]
    UndefinedMacro { name: String, depth: usize },

    #[error("macro expansion limit ({limit}) exceeded while expanding `{name}`")]
    ExpansionLimit { name: String, limit: usize },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unrecognised source extension: {}", .0.display())]
    UnknownExtension(PathBuf),
}
