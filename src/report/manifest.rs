//! Manifest output
//!
//! Streams one record per completed object to a writer, either as a JSON
//! array of full reports or as one of the line-oriented checksum formats.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::error::{Result, UploadError};
use crate::report::{ObjectChecksum, ObjectReport};

/// Recognized manifest output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifestFormat {
    /// No manifest output.
    #[default]
    None,
    /// A JSON array of full report records.
    Json,
    /// Hex MD5 of the whole body and the object path, one line per object.
    Md5,
    /// Hex whole-body checksum under the configured algorithm.
    Checksum,
    /// The server-stored checksum in base64.
    Aws,
    /// The server-returned ETag.
    Etag,
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManifestFormat::None => "none",
            ManifestFormat::Json => "json",
            ManifestFormat::Md5 => "md5",
            ManifestFormat::Checksum => "checksum",
            ManifestFormat::Aws => "aws",
            ManifestFormat::Etag => "etag",
        };
        f.write_str(name)
    }
}

impl FromStr for ManifestFormat {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ManifestFormat::None),
            "json" => Ok(ManifestFormat::Json),
            "md5" => Ok(ManifestFormat::Md5),
            "checksum" => Ok(ManifestFormat::Checksum),
            "aws" => Ok(ManifestFormat::Aws),
            "etag" => Ok(ManifestFormat::Etag),
            _ => Err(UploadError::InvalidConfig {
                reason: "valid manifest types: json, md5, checksum, aws, etag".to_string(),
            }),
        }
    }
}

/// Writes manifest records one at a time; `end` closes out the format's
/// trailer (the closing bracket for JSON).
pub struct ManifestWriter<W: Write> {
    writer: W,
    format: ManifestFormat,
    records: usize,
}

impl<W: Write> ManifestWriter<W> {
    pub fn new(format: ManifestFormat, writer: W) -> Self {
        ManifestWriter {
            writer,
            format,
            records: 0,
        }
    }

    /// Writes one record in the configured format.
    pub fn write(&mut self, report: &ObjectReport) -> Result<()> {
        self.records += 1;

        match self.format {
            ManifestFormat::None => Ok(()),
            ManifestFormat::Json => self.write_json(report),
            _ => self.write_line(report),
        }
    }

    /// Writes trailing text to close the manifest.
    pub fn end(&mut self) -> Result<()> {
        if self.format == ManifestFormat::None || self.records == 0 {
            return Ok(());
        }

        if self.format == ManifestFormat::Json {
            self.writer.write_all(b"\n]\n")?;
        } else {
            self.writer.write_all(b"\n")?;
        }

        Ok(())
    }

    fn write_json(&mut self, report: &ObjectReport) -> Result<()> {
        if self.records == 1 {
            self.writer.write_all(b"[\n  ")?;
        } else {
            self.writer.write_all(b",\n  ")?;
        }

        let rendered = serde_json::to_string_pretty(report).map_err(|err| {
            UploadError::InvalidManifest {
                reason: format!("serializing report: {err}"),
            }
        })?;
        self.writer.write_all(rendered.replace('\n', "\n  ").as_bytes())?;

        Ok(())
    }

    fn write_line(&mut self, report: &ObjectReport) -> Result<()> {
        let value = self.field_value(report)?;

        if self.records > 1 {
            self.writer.write_all(b"\n")?;
        }

        // two spaces between the value and the object path
        write!(self.writer, "{}  {}/{}", value, report.bucket, report.key)?;

        Ok(())
    }

    fn field_value(&self, report: &ObjectReport) -> Result<String> {
        let missing = || UploadError::InvalidManifest {
            reason: format!(
                "error processing {}/{}: unable to extract {} field value",
                report.bucket, report.key, self.format
            ),
        };

        let hex = |checksum: Option<&ObjectChecksum>| checksum.map(|c| c.hex.clone());
        let base64 = |checksum: Option<&ObjectChecksum>| checksum.map(|c| c.base64.clone());

        let value = match self.format {
            ManifestFormat::Md5 => report
                .full_checksums
                .as_ref()
                .and_then(|sums| hex(sums.checksum_md5.as_ref())),
            ManifestFormat::Checksum => report.full_checksums.as_ref().and_then(|sums| {
                [
                    sums.checksum_sha256.as_ref(),
                    sums.checksum_sha1.as_ref(),
                    sums.checksum_crc32c.as_ref(),
                    sums.checksum_crc32.as_ref(),
                ]
                .into_iter()
                .find_map(hex)
            }),
            ManifestFormat::Aws => report
                .object_attributes
                .as_ref()
                .and_then(|attributes| attributes.checksum.as_ref())
                .and_then(|sums| {
                    [
                        sums.checksum_sha256.as_ref(),
                        sums.checksum_sha1.as_ref(),
                        sums.checksum_crc32c.as_ref(),
                        sums.checksum_crc32.as_ref(),
                    ]
                    .into_iter()
                    .find_map(base64)
                }),
            ManifestFormat::Etag => report
                .object_attributes
                .as_ref()
                .and_then(|attributes| attributes.e_tag.clone()),
            ManifestFormat::None | ManifestFormat::Json => None,
        };

        value.ok_or_else(missing)
    }
}
