//! Fault-tolerant readers for the Unity file formats uref understands.
//!
//! There is no parser class hierarchy: a [`Parser`] is a façade over three
//! plain parsing functions, dispatched by file extension through
//! [`ParserKind::for_path`]. Each worker thread owns one `Parser`, whose line
//! and document buffers are reused across every file that worker handles.

use std::path::Path;
use std::time::Instant;

pub use crate::error::ParseError;
pub use crate::error::ParseErrorKind;
pub use crate::error::ParserError;
pub use crate::meta::ParsedMeta;
pub use crate::meta::extract_guid_only;
pub use crate::meta::parse_meta;
pub use crate::meta::parse_meta_str;
pub use crate::reference::Reference;
pub use crate::reference::normalize_references;
pub use crate::script::ParsedScript;
pub use crate::script::parse_script;
pub use crate::unity::ParsedAsset;
pub use crate::unity::parse_unity_yaml;

pub mod error;
pub mod meta;
pub mod reference;
pub mod script;
pub mod typing;
pub mod unity;

/// Knobs shared by every parse call.
#[derive(Debug, Clone, Copy)]
pub struct ParserOptions {
    /// Documents larger than this are scanned line-by-line with the regex
    /// fallback instead of being accumulated for a structured parse.
    pub max_structured_document_bytes: usize,
    /// Absolute deadline for the current file, checked at document
    /// boundaries.
    pub deadline: Option<Instant>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self { max_structured_document_bytes: 16 * 1024 * 1024, deadline: None }
    }
}

/// Which parsing function handles a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    Meta,
    UnityYaml,
    Script,
}

impl ParserKind {
    /// The dispatch table: extension → parser. Paths outside the table are
    /// not parse targets.
    #[must_use]
    pub fn for_path(path: &str) -> Option<Self> {
        let extension = path.rsplit('.').next()?.to_ascii_lowercase();

        match extension.as_str() {
            "meta" => Some(Self::Meta),
            "prefab" | "unity" | "scene" | "asset" | "mat" | "controller" | "anim" => Some(Self::UnityYaml),
            "cs" => Some(Self::Script),
            _ => None,
        }
    }
}

/// The output of parsing one file.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedFile {
    Meta(ParsedMeta),
    Asset(ParsedAsset),
    Script(ParsedScript),
}

/// A reusable parser owned by one worker thread.
#[derive(Debug)]
pub struct Parser {
    options: ParserOptions,
    line_buffer: String,
    document_buffer: String,
}

impl Parser {
    #[must_use]
    pub fn new(options: ParserOptions) -> Self {
        Self { options, line_buffer: String::with_capacity(256), document_buffer: String::with_capacity(8 * 1024) }
    }

    /// Sets the per-file deadline for subsequent parse calls.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.options.deadline = deadline;
    }

    /// Parses one file, dispatching on its extension.
    ///
    /// Returns `Ok(None)` for paths no parser claims; the walker should not
    /// have yielded them, but a stale work queue entry is not worth failing a
    /// scan over.
    pub fn parse(&mut self, absolute: &Path, relative: &str) -> Result<Option<ParsedFile>, ParserError> {
        let Some(kind) = ParserKind::for_path(relative) else {
            tracing::debug!("No parser claims `{}`; skipping.", relative);

            return Ok(None);
        };

        let parsed = match kind {
            ParserKind::Meta => ParsedFile::Meta(parse_meta(absolute, relative)?),
            ParserKind::UnityYaml => ParsedFile::Asset(parse_unity_yaml(
                absolute,
                relative,
                &self.options,
                &mut self.line_buffer,
                &mut self.document_buffer,
            )?),
            ParserKind::Script => ParsedFile::Script(parse_script(absolute, relative)?),
        };

        Ok(Some(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_table() {
        assert_eq!(ParserKind::for_path("Assets/Player.prefab.meta"), Some(ParserKind::Meta));
        assert_eq!(ParserKind::for_path("Assets/Player.prefab"), Some(ParserKind::UnityYaml));
        assert_eq!(ParserKind::for_path("Assets/Scenes/Main.unity"), Some(ParserKind::UnityYaml));
        assert_eq!(ParserKind::for_path("Assets/Config.asset"), Some(ParserKind::UnityYaml));
        assert_eq!(ParserKind::for_path("Assets/Mover.cs"), Some(ParserKind::Script));
        assert_eq!(ParserKind::for_path("Assets/readme.txt"), None);
    }
}
