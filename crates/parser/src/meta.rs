//! Side-car `.meta` file parsing.
//!
//! Meta files are small single-document YAML mappings, so unlike asset files
//! they are read whole. Two entry points exist: [`parse_meta`] extracts the
//! full record including the opaque importer subtree, and
//! [`extract_guid_only`] is the allocation-light line scan used for bulk index
//! building.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use uref_guid::Guid;
use uref_guid::ImporterKind;

use crate::error::ParseError;
use crate::error::ParseErrorKind;
use crate::error::ParserError;

/// Everything uref keeps from a `.meta` file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMeta {
    /// Project-relative path of the meta file itself.
    pub path: String,
    /// Project-relative path of the companion asset (the meta path without
    /// its `.meta` suffix).
    pub asset_path: String,
    pub guid: Guid,
    pub file_format_version: i64,
    pub importer_kind: ImporterKind,
    /// The importer key exactly as written; interesting when the kind is
    /// [`ImporterKind::Unknown`].
    pub raw_importer: Option<String>,
    /// The importer subtree, preserved opaquely.
    pub importer_metadata: BTreeMap<String, serde_json::Value>,
}

/// Parses a `.meta` file from disk.
pub fn parse_meta(absolute: &Path, relative: &str) -> Result<ParsedMeta, ParserError> {
    let contents = std::fs::read_to_string(absolute)
        .map_err(|cause| ParserError::Io { path: relative.to_string(), cause })?;

    parse_meta_str(&contents, relative).map_err(ParserError::Parse)
}

/// Parses meta contents already in memory.
pub fn parse_meta_str(contents: &str, relative: &str) -> Result<ParsedMeta, ParseError> {
    let value: serde_norway::Value = serde_norway::from_str(contents)
        .map_err(|error| ParseError::new(relative, ParseErrorKind::MalformedYaml, error.to_string()))?;

    let serde_norway::Value::Mapping(root) = value else {
        return Err(ParseError::new(relative, ParseErrorKind::MalformedYaml, "root is not a mapping"));
    };

    let file_format_version = root
        .get("fileFormatVersion")
        .and_then(serde_norway::Value::as_i64)
        .ok_or_else(|| {
            ParseError::new(relative, ParseErrorKind::MalformedYaml, "missing or non-integer `fileFormatVersion`")
        })?;

    let guid_text = root
        .get("guid")
        .and_then(serde_norway::Value::as_str)
        .ok_or_else(|| ParseError::new(relative, ParseErrorKind::MissingGuid, "missing `guid` key"))?;

    let guid = Guid::parse(guid_text)
        .map_err(|error| ParseError::new(relative, ParseErrorKind::BadGuid, error.to_string()))?;

    let mut importer_kind = None;
    let mut raw_importer = None;
    let mut importer_metadata = BTreeMap::new();

    for (key, subtree) in &root {
        let Some(key) = key.as_str() else { continue };

        if let Ok(kind) = ImporterKind::from_str(key) {
            importer_kind = Some(kind);
            raw_importer = Some(key.to_string());
            importer_metadata = importer_subtree(subtree);
            break;
        }

        // Importer keys outside the enumerated set still follow Unity's
        // `<Something>Importer` spelling.
        if key.ends_with("Importer") && importer_kind.is_none() {
            importer_kind = Some(ImporterKind::Unknown);
            raw_importer = Some(key.to_string());
            importer_metadata = importer_subtree(subtree);
        }
    }

    let importer_kind = importer_kind.unwrap_or_else(|| {
        tracing::warn!("Meta file `{}` declares no importer key; treating the importer as unknown.", relative);

        ImporterKind::Unknown
    });

    if importer_kind == ImporterKind::Unknown
        && let Some(raw) = &raw_importer
    {
        tracing::warn!("Meta file `{}` uses unrecognized importer `{}`.", relative, raw);
    }

    let asset_path = relative.strip_suffix(".meta").unwrap_or(relative).to_string();

    Ok(ParsedMeta {
        path: relative.to_string(),
        asset_path,
        guid,
        file_format_version,
        importer_kind,
        raw_importer,
        importer_metadata,
    })
}

/// Line scan that pulls the `guid:` value out of a meta file without parsing
/// YAML. Reuses a single line buffer and stops at the first match.
pub fn extract_guid_only(absolute: &Path, relative: &str) -> Result<Guid, ParserError> {
    let file = std::fs::File::open(absolute)
        .map_err(|cause| ParserError::Io { path: relative.to_string(), cause })?;

    let mut reader = BufReader::new(file);
    let mut line = String::with_capacity(128);

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|cause| ParserError::Io { path: relative.to_string(), cause })?;
        if read == 0 {
            break;
        }

        if let Some(rest) = line.trim_start().strip_prefix("guid:") {
            let guid = Guid::parse(rest.trim()).map_err(|error| {
                ParseError::new(relative, ParseErrorKind::BadGuid, error.to_string())
            })?;

            return Ok(guid);
        }
    }

    Err(ParseError::new(relative, ParseErrorKind::MissingGuid, "no `guid:` line found").into())
}

fn importer_subtree(value: &serde_norway::Value) -> BTreeMap<String, serde_json::Value> {
    match value {
        serde_norway::Value::Mapping(mapping) => mapping
            .iter()
            .filter_map(|(key, value)| key.as_str().map(|key| (key.to_string(), yaml_to_json(value))))
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// Converts a YAML tree into the opaque JSON value stored on the node. The
/// conversion is total: anything YAML can express maps to *some* JSON value.
pub fn yaml_to_json(value: &serde_norway::Value) -> serde_json::Value {
    match value {
        serde_norway::Value::Null => serde_json::Value::Null,
        serde_norway::Value::Bool(flag) => serde_json::Value::Bool(*flag),
        serde_norway::Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                serde_json::Value::from(integer)
            } else if let Some(unsigned) = number.as_u64() {
                serde_json::Value::from(unsigned)
            } else {
                number.as_f64().and_then(|float| serde_json::Number::from_f64(float)).map_or(
                    serde_json::Value::Null,
                    serde_json::Value::Number,
                )
            }
        }
        serde_norway::Value::String(text) => serde_json::Value::String(text.clone()),
        serde_norway::Value::Sequence(items) => {
            serde_json::Value::Array(items.iter().map(yaml_to_json).collect())
        }
        serde_norway::Value::Mapping(mapping) => serde_json::Value::Object(
            mapping
                .iter()
                .map(|(key, value)| {
                    let key = key.as_str().map_or_else(|| format!("{:?}", key), str::to_string);

                    (key, yaml_to_json(value))
                })
                .collect(),
        ),
        serde_norway::Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}
