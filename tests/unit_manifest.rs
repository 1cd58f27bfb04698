//! Unit tests for manifest formatting

use s3up::report::{ObjectAttributes, ObjectChecksum, ObjectChecksums};
use s3up::{ManifestFormat, ManifestWriter, ObjectReport};

fn checksum(hex: &str, base64: &str) -> ObjectChecksum {
    ObjectChecksum {
        hex: hex.to_string(),
        base64: base64.to_string(),
    }
}

fn completed_report(key: &str) -> ObjectReport {
    ObjectReport {
        bucket: "bucket".to_string(),
        key: key.to_string(),
        upload_id: String::new(),
        completed: true,
        aborted: false,
        full_checksums: Some(ObjectChecksums {
            checksum_md5: Some(checksum("aabb", "qrs=")),
            checksum_sha256: Some(checksum("ccdd", "zN0=")),
            ..ObjectChecksums::default()
        }),
        object_checksum: None,
        object_attributes: Some(ObjectAttributes {
            delete_marker: None,
            version_id: None,
            last_modified: None,
            e_tag: Some("etag-1".to_string()),
            checksum: Some(ObjectChecksums {
                checksum_sha256: Some(checksum("eeff", "7v8=")),
                ..ObjectChecksums::default()
            }),
            object_parts: None,
        }),
        errors: None,
    }
}

fn render(format: ManifestFormat, reports: &[ObjectReport]) -> String {
    let mut out = Vec::new();
    {
        let mut writer = ManifestWriter::new(format, &mut out);
        for report in reports {
            writer.write(report).unwrap();
        }
        writer.end().unwrap();
    }
    String::from_utf8(out).unwrap()
}

#[test]
fn parses_format_names() {
    assert_eq!("json".parse::<ManifestFormat>().unwrap(), ManifestFormat::Json);
    assert_eq!("ETAG".parse::<ManifestFormat>().unwrap(), ManifestFormat::Etag);
    assert_eq!("none".parse::<ManifestFormat>().unwrap(), ManifestFormat::None);
    assert!("yaml".parse::<ManifestFormat>().is_err());
}

#[test]
fn none_format_writes_nothing() {
    let rendered = render(ManifestFormat::None, &[completed_report("a")]);
    assert!(rendered.is_empty());
}

#[test]
fn line_formats_use_two_space_separators() {
    let rendered = render(
        ManifestFormat::Md5,
        &[completed_report("a"), completed_report("b")],
    );
    assert_eq!(rendered, "aabb  bucket/a\naabb  bucket/b\n");
}

#[test]
fn checksum_format_prefers_the_strongest_available() {
    let rendered = render(ManifestFormat::Checksum, &[completed_report("a")]);
    assert_eq!(rendered, "ccdd  bucket/a\n");
}

#[test]
fn aws_format_uses_server_checksums_in_base64() {
    let rendered = render(ManifestFormat::Aws, &[completed_report("a")]);
    assert_eq!(rendered, "7v8=  bucket/a\n");
}

#[test]
fn etag_format_uses_the_server_etag() {
    let rendered = render(ManifestFormat::Etag, &[completed_report("a")]);
    assert_eq!(rendered, "etag-1  bucket/a\n");
}

#[test]
fn json_format_emits_one_array() {
    let rendered = render(
        ManifestFormat::Json,
        &[completed_report("a"), completed_report("b")],
    );

    assert!(rendered.starts_with("[\n"));
    assert!(rendered.ends_with("\n]\n"));

    let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    let records = parsed.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["Bucket"], "bucket");
    assert_eq!(records[1]["Key"], "b");
    assert_eq!(records[0]["Completed"], true);
    assert_eq!(records[0]["FullChecksums"]["ChecksumMD5"]["Hex"], "aabb");
    assert!(records[0].get("UploadId").is_none());
    assert!(records[0].get("Errors").is_none());
}

#[test]
fn empty_manifest_has_no_trailer() {
    let rendered = render(ManifestFormat::Json, &[]);
    assert!(rendered.is_empty());
}

#[test]
fn missing_fields_are_an_error() {
    let mut report = completed_report("a");
    report.full_checksums = None;

    let mut out = Vec::new();
    let mut writer = ManifestWriter::new(ManifestFormat::Md5, &mut out);
    assert!(writer.write(&report).is_err());
}
