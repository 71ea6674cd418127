use serde::Serialize;

/// What went wrong while parsing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    MalformedYaml,
    MissingGuid,
    BadGuid,
    UnknownImporter,
    Timeout,
    TooLarge,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::MalformedYaml => "malformed_yaml",
            Self::MissingGuid => "missing_guid",
            Self::BadGuid => "bad_guid",
            Self::UnknownImporter => "unknown_importer",
            Self::Timeout => "timeout",
            Self::TooLarge => "too_large",
        };

        write!(f, "{}", name)
    }
}

/// A per-file parse failure. These are accumulated into the scan report and
/// never abort a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    pub path: String,
    pub kind: ParseErrorKind,
    pub detail: String,
}

impl ParseError {
    pub fn new(path: impl Into<String>, kind: ParseErrorKind, detail: impl Into<String>) -> Self {
        Self { path: path.into(), kind, detail: detail.into() }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in `{}`: {}", self.kind, self.path, self.detail)
    }
}

impl std::error::Error for ParseError {}

/// Failure modes of a single parser invocation: the file could not be read at
/// all, or its contents could not be understood.
#[derive(Debug)]
pub enum ParserError {
    Io { path: String, cause: std::io::Error },
    Parse(ParseError),
}

impl std::fmt::Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, cause } => write!(f, "could not read `{}`: {}", path, cause),
            Self::Parse(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for ParserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { cause, .. } => Some(cause),
            Self::Parse(error) => Some(error),
        }
    }
}

impl From<ParseError> for ParserError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}
