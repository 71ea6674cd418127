//! C# script sniffing.
//!
//! Scripts are never parsed as C#; their GUID comes from the side-car meta.
//! The only thing extracted here is whether the script declares a
//! `[CreateAssetMenu]` attribute, which marks it as a ScriptableObject
//! factory — useful context for impact reporting.

use std::io::Read;
use std::path::Path;

use memchr::memmem;

use crate::error::ParserError;

const SCAN_CHUNK_SIZE: usize = 64 * 1024;
const CREATE_ASSET_MENU: &[u8] = b"[CreateAssetMenu";

/// The (deliberately thin) result of looking at a `.cs` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedScript {
    pub path: String,
    pub declares_create_asset_menu: bool,
}

/// Streams a script looking for the `[CreateAssetMenu` attribute marker.
pub fn parse_script(absolute: &Path, relative: &str) -> Result<ParsedScript, ParserError> {
    let mut file =
        std::fs::File::open(absolute).map_err(|cause| ParserError::Io { path: relative.to_string(), cause })?;

    let finder = memmem::Finder::new(CREATE_ASSET_MENU);
    let mut buffer = vec![0u8; SCAN_CHUNK_SIZE + CREATE_ASSET_MENU.len()];
    let mut carry = 0usize;
    let mut found = false;

    loop {
        let read = file
            .read(&mut buffer[carry..])
            .map_err(|cause| ParserError::Io { path: relative.to_string(), cause })?;
        if read == 0 {
            break;
        }

        let window_len = carry + read;
        if finder.find(&buffer[..window_len]).is_some() {
            found = true;
            break;
        }

        // Keep a pattern-sized tail so a marker split across chunk boundaries
        // is still seen.
        carry = CREATE_ASSET_MENU.len().saturating_sub(1).min(window_len);
        buffer.copy_within(window_len - carry..window_len, 0);
    }

    Ok(ParsedScript { path: relative.to_string(), declares_create_asset_menu: found })
}
