use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{parser::ParseError, patch::PatchParseError, tree::MAX_DEPTH};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure is fatal for the operation that raised it: a partial
/// ownership set or reviewer map is never returned.
#[derive(Debug, Error)]
pub enum Error {
    /// A MAINTAINERS file contains a line that is not a well-formed record.
    #[error("invalid MAINTAINERS file {}", path.display())]
    FileFormat {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    /// A directory could not be listed, or a file in it could not be read.
    #[error("failed to read {}", path.display())]
    TreeRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid patch")]
    PatchParse(#[from] PatchParseError),

    #[error("directory nesting below {} exceeds {} levels", path.display(), MAX_DEPTH)]
    DepthExceeded { path: PathBuf },
}
