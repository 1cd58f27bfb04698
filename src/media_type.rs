//! Media type resolution for Content-Type stamping

use std::collections::HashMap;
use std::io::BufRead;

use tracing::warn;

use crate::error::Result;

/// Fallback media type for unrecognized extensions.
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Maps file extensions to IANA media types.
///
/// Lookup walks compound extensions from the right, so `archive.tar.gz`
/// tries `.gz` before `.tar`. Entries loaded from a TSV file take
/// precedence over the built-in table.
#[derive(Debug, Clone, Default)]
pub struct MediaTypes {
    overrides: HashMap<String, String>,
}

impl MediaTypes {
    pub fn new() -> Self {
        MediaTypes::default()
    }

    /// Resolves the media type for an object key or file path.
    pub fn lookup(&self, name: &str) -> String {
        let mut name = name;
        loop {
            let Some((stem, ext)) = split_extension(name) else {
                return DEFAULT_MEDIA_TYPE.to_string();
            };

            if let Some(media_type) = self.overrides.get(ext) {
                return media_type.clone();
            }

            if let Some(media_type) = mime_guess::from_ext(&ext[1..]).first_raw() {
                return media_type.to_string();
            }

            name = stem;
        }
    }

    /// Extends the table from tab-separated lines of the form
    /// `.ext<TAB>media/type`. Lines starting with `#` are comments.
    /// Malformed lines are logged and skipped.
    pub fn extend_from_tsv<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let lineno = index + 1;

            if line.starts_with('#') || line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 2 {
                warn!(
                    "skipping line {}, invalid number of fields; {}: {}",
                    lineno,
                    fields.len(),
                    line
                );
                continue;
            }

            let (ext, media_type) = (fields[0], fields[1]);
            if !ext.starts_with('.') || ext.len() < 2 {
                warn!("skipping line {}, extension must start with a period: {}", lineno, line);
                continue;
            }

            self.overrides.insert(ext.to_string(), media_type.to_string());
        }

        Ok(())
    }
}

/// Splits the extension (with its leading period) off the final path
/// element, returning `(stem, extension)`.
fn split_extension(name: &str) -> Option<(&str, &str)> {
    let base = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    let dot = name[base..].rfind('.')? + base;
    Some((&name[..dot], &name[dot..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn known_extensions_resolve() {
        let types = MediaTypes::new();
        assert_eq!(types.lookup("report.txt"), "text/plain");
        assert_eq!(types.lookup("photos/cat.jpg"), "image/jpeg");
        assert_eq!(types.lookup("data.json"), "application/json");
    }

    #[test]
    fn unknown_extensions_fall_back() {
        let types = MediaTypes::new();
        assert_eq!(types.lookup("blob.zzz9"), DEFAULT_MEDIA_TYPE);
        assert_eq!(types.lookup("no-extension"), DEFAULT_MEDIA_TYPE);
    }

    #[test]
    fn walks_compound_extensions() {
        let types = MediaTypes::new();
        // .zzz9 is unknown, so the walk falls back to .txt
        assert_eq!(types.lookup("notes.txt.zzz9"), "text/plain");
    }

    #[test]
    fn dots_in_directories_are_ignored() {
        let types = MediaTypes::new();
        assert_eq!(types.lookup("dir.d/file"), DEFAULT_MEDIA_TYPE);
    }

    #[test]
    fn tsv_overrides_win() {
        let mut types = MediaTypes::new();
        let tsv = "# comment\n.txt\ttext/x-custom\n.weird\tapplication/x-weird\nbroken line\n";
        types.extend_from_tsv(Cursor::new(tsv)).unwrap();

        assert_eq!(types.lookup("a.txt"), "text/x-custom");
        assert_eq!(types.lookup("b.weird"), "application/x-weird");
    }
}
