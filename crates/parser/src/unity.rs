//! Streaming reader for Unity's multi-document YAML flavor.
//!
//! Asset files are a stream of tagged documents:
//!
//! ```text
//! %YAML 1.1
//! %TAG !u! tag:unity3d.com,2011:
//! --- !u!23 &2319923
//! MeshRenderer:
//!   m_Materials:
//!   - {fileID: 2100000, guid: 0000000000000000000000000000bbbb, type: 2}
//! ```
//!
//! The reader never holds more than one document in memory. Each document is
//! parsed structurally so the dotted property chain and owning component type
//! can be recovered; documents that are not valid YAML (Unity emits a few
//! constructs that are not) fall back to a regex scan over the raw text, which
//! still recovers the reference and its immediate property key. Documents
//! larger than the configured threshold are scanned line-by-line instead of
//! being accumulated.

use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use serde_norway::Mapping;
use serde_norway::Value;

use uref_guid::Guid;

use crate::ParserOptions;
use crate::error::ParseError;
use crate::error::ParseErrorKind;
use crate::error::ParserError;
use crate::reference::Reference;
use crate::reference::normalize_references;
use crate::typing;

static DOCUMENT_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^--- !u!(\d+) &(-?\d+)").expect("document header pattern is valid"));

/// Matches both reference scalar forms, with an optional leading property key:
/// `m_Shader: {fileID: 46, guid: ..., type: 3}` and `{fileID: 4}`.
static REFERENCE_SCALAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:([A-Za-z_][A-Za-z0-9_]*):\s*)?\{\s*fileID:\s*(-?\d+)\s*(?:,\s*guid:\s*([0-9a-fA-F]{32})\s*)?(?:,\s*type:\s*(-?\d+)\s*)?\}",
    )
    .expect("reference scalar pattern is valid")
});

/// Everything extracted from one Unity YAML asset file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAsset {
    /// Project-relative path of the asset file.
    pub path: String,
    /// Cross-asset references, sorted by `(target, dep_kind, context_path)`.
    pub references: Vec<Reference>,
    /// Local FileID → component type of every document in the file.
    pub local_components: Vec<(i64, String)>,
    pub documents: usize,
    /// Documents handled by the regex fallback instead of the structured walk.
    pub fallback_documents: usize,
    /// `{fileID: n}` scalars pointing inside the same file; these never become
    /// graph edges.
    pub internal_references: usize,
}

#[derive(Debug, Clone, Copy)]
struct DocumentHeader {
    class_id: i64,
    file_id: i64,
}

/// Parses a Unity YAML asset file from disk, streaming line by line.
pub fn parse_unity_yaml(
    absolute: &Path,
    relative: &str,
    options: &ParserOptions,
    line: &mut String,
    document: &mut String,
) -> Result<ParsedAsset, ParserError> {
    let file =
        std::fs::File::open(absolute).map_err(|cause| ParserError::Io { path: relative.to_string(), cause })?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);

    let mut parsed = ParsedAsset {
        path: relative.to_string(),
        references: Vec::new(),
        local_components: Vec::new(),
        documents: 0,
        fallback_documents: 0,
        internal_references: 0,
    };

    let mut current: Option<DocumentHeader> = None;
    let mut overflowed = false;
    let mut lines_since_deadline_check = 0u32;
    document.clear();

    loop {
        line.clear();
        let read = reader
            .read_line(line)
            .map_err(|cause| ParserError::Io { path: relative.to_string(), cause })?;
        if read == 0 {
            break;
        }

        lines_since_deadline_check += 1;
        if lines_since_deadline_check >= 1024 {
            lines_since_deadline_check = 0;
            check_deadline(options.deadline, relative)?;
        }

        if let Some(captures) = DOCUMENT_HEADER.captures(line) {
            check_deadline(options.deadline, relative)?;

            if let Some(header) = current {
                finish_document(document, header, overflowed, relative, &mut parsed);
            }

            document.clear();
            overflowed = false;
            current = Some(DocumentHeader {
                class_id: captures[1].parse().unwrap_or(0),
                file_id: captures[2].parse().unwrap_or(0),
            });

            continue;
        }

        if current.is_none() {
            // Directives and anything else ahead of the first tagged document.
            // A file with no headers at all still gets a raw reference scan.
            if line.starts_with('%') {
                continue;
            }

            current = Some(DocumentHeader { class_id: 0, file_id: 0 });
        }

        if overflowed {
            scan_raw_text(line, current.expect("document is open"), &mut parsed);
            continue;
        }

        if document.len() + line.len() > options.max_structured_document_bytes {
            overflowed = true;
            let header = current.expect("document is open");
            scan_raw_text(document, header, &mut parsed);
            document.clear();
            scan_raw_text(line, header, &mut parsed);

            continue;
        }

        document.push_str(line);
    }

    if let Some(header) = current {
        finish_document(document, header, overflowed, relative, &mut parsed);
    }

    document.clear();
    normalize_references(&mut parsed.references);
    parsed.local_components.sort_unstable();

    Ok(parsed)
}

fn check_deadline(deadline: Option<Instant>, relative: &str) -> Result<(), ParserError> {
    match deadline {
        Some(deadline) if Instant::now() > deadline => Err(ParserError::Parse(ParseError::new(
            relative,
            ParseErrorKind::Timeout,
            "per-file parse deadline exceeded",
        ))),
        _ => Ok(()),
    }
}

fn finish_document(
    document: &str,
    header: DocumentHeader,
    overflowed: bool,
    relative: &str,
    parsed: &mut ParsedAsset,
) {
    parsed.documents += 1;

    if overflowed {
        // The oversized document was already consumed line-by-line.
        parsed.fallback_documents += 1;
        return;
    }

    if document.trim().is_empty() {
        return;
    }

    match serde_norway::from_str::<Value>(document) {
        Ok(value) => walk_document(&value, header, parsed),
        Err(error) => {
            tracing::debug!(
                "Document &{} of `{}` is not parseable YAML ({}); falling back to a raw scan.",
                header.file_id,
                relative,
                error,
            );

            parsed.fallback_documents += 1;
            scan_raw_text(document, header, parsed);
        }
    }
}

fn walk_document(value: &Value, header: DocumentHeader, parsed: &mut ParsedAsset) {
    let Value::Mapping(root) = value else {
        return;
    };

    for (key, subtree) in root {
        let component = key.as_str().map_or_else(
            || typing::class_name(header.class_id).unwrap_or("Unknown").to_string(),
            str::to_string,
        );

        parsed.local_components.push((header.file_id, component.clone()));

        let mut context = component.clone();
        walk_value(subtree, &mut context, None, header, &component, parsed);
    }
}

fn walk_value(
    value: &Value,
    context: &mut String,
    property: Option<&str>,
    header: DocumentHeader,
    component: &str,
    parsed: &mut ParsedAsset,
) {
    match value {
        Value::Mapping(mapping) => {
            if let Some((file_id, guid, _unity_type)) = as_reference_scalar(mapping) {
                emit_reference(file_id, guid, Some(context.as_str()), property, header, component, parsed);

                return;
            }

            for (key, nested) in mapping {
                let Some(key) = key.as_str() else { continue };

                let saved = context.len();
                context.push('.');
                context.push_str(key);
                walk_value(nested, context, Some(key), header, component, parsed);
                context.truncate(saved);
            }
        }
        Value::Sequence(items) => {
            for (index, item) in items.iter().enumerate() {
                let saved = context.len();
                context.push('[');
                context.push_str(&index.to_string());
                context.push(']');
                walk_value(item, context, property, header, component, parsed);
                context.truncate(saved);
            }
        }
        Value::Tagged(tagged) => {
            walk_value(&tagged.value, context, property, header, component, parsed);
        }
        _ => {}
    }
}

/// Recognizes the Unity reference grammar: a mapping whose keys are a subset
/// of `{fileID, guid, type}` and which contains `fileID`.
fn as_reference_scalar(mapping: &Mapping) -> Option<(i64, Option<&str>, Option<i64>)> {
    if mapping.is_empty() || mapping.len() > 3 {
        return None;
    }

    let mut file_id = None;
    let mut guid = None;
    let mut unity_type = None;

    for (key, value) in mapping {
        match key.as_str()? {
            "fileID" => file_id = value.as_i64(),
            "guid" => guid = value.as_str(),
            "type" => unity_type = value.as_i64(),
            _ => return None,
        }
    }

    Some((file_id?, guid, unity_type))
}

fn emit_reference(
    target_file_id: i64,
    guid: Option<&str>,
    context: Option<&str>,
    property: Option<&str>,
    header: DocumentHeader,
    component: &str,
    parsed: &mut ParsedAsset,
) {
    let Some(guid_text) = guid else {
        parsed.internal_references += 1;

        return;
    };

    let Ok(target) = Guid::parse(guid_text) else {
        // The regex path cannot produce this; the structured path can when a
        // document stores something guid-shaped but invalid.
        tracing::debug!("Ignoring reference with malformed guid `{}`.", guid_text);

        return;
    };

    let (dep_kind, strength) = typing::classify(header.class_id, context, property);

    parsed.references.push(Reference {
        target,
        dep_kind,
        strength,
        context_path: context.map(str::to_string),
        component_type: Some(component.to_string()),
        property_name: property.map(str::to_string),
        source_file_id: Some(header.file_id),
        target_file_id,
    });
}

fn scan_raw_text(text: &str, header: DocumentHeader, parsed: &mut ParsedAsset) {
    let component = typing::class_name(header.class_id).unwrap_or("Unknown");

    for captures in REFERENCE_SCALAR.captures_iter(text) {
        let property = captures.get(1).map(|m| m.as_str());
        let Ok(target_file_id) = captures[2].parse::<i64>() else { continue };
        let guid = captures.get(3).map(|m| m.as_str());

        emit_reference(target_file_id, guid, None, property, header, component, parsed);
    }
}
