//! Payload hygiene: remote-safe names, media type detection, and a small
//! safety gate blocking executables from the upload path.
//!
//! Multi-layer protection on the upload path:
//! 1. Magic byte detection for executables
//! 2. Extension blocklist
//! 3. Size cap

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::defaults;

/// Magic byte signatures for executable files
const MAGIC_SIGNATURES: &[(&str, &[u8])] = &[
    ("Windows PE/MZ", &[0x4D, 0x5A]),
    ("ELF", &[0x7F, 0x45, 0x4C, 0x46]),
    ("Mach-O 32", &[0xFE, 0xED, 0xFA, 0xCE]),
    ("Mach-O 64", &[0xFE, 0xED, 0xFA, 0xCF]),
    ("Mach-O Fat", &[0xCA, 0xFE, 0xBA, 0xBE]),
    ("WebAssembly", &[0x00, 0x61, 0x73, 0x6D]),
];

/// Blocked file extensions (case-insensitive)
static BLOCKED_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Windows executables
        "exe", "dll", "scr", "pif", "com", "msi",
        // Unix compiled binaries
        "so", "dylib", "out",
        // JVM
        "jar", "war", "class",
        // Packages
        "deb", "rpm", "apk", "dmg", "pkg",
        // Other dangerous
        "reg", "inf", "scf", "lnk", "hta",
    ]
    .into_iter()
    .collect()
});

/// Result of payload safety validation
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub allowed: bool,
    pub block_reason: Option<String>,
}

impl ValidationResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            block_reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            block_reason: Some(reason.into()),
        }
    }
}

/// Validate that a payload is acceptable for the upload path.
pub fn validate_payload(display_name: &str, data: &[u8]) -> ValidationResult {
    if data.is_empty() {
        return ValidationResult::blocked("empty payload");
    }
    if data.len() as u64 > defaults::MAX_UPLOAD_BYTES {
        return ValidationResult::blocked(format!(
            "payload exceeds maximum size of {} bytes",
            defaults::MAX_UPLOAD_BYTES
        ));
    }

    if let Some(ext) = display_name.rsplit('.').next() {
        if BLOCKED_EXTENSIONS.contains(ext.to_lowercase().as_str()) {
            return ValidationResult::blocked(format!("file extension .{ext} is not allowed"));
        }
    }

    for (name, magic) in MAGIC_SIGNATURES {
        if data.len() >= magic.len() && &data[..magic.len()] == *magic {
            return ValidationResult::blocked(format!("executable file detected: {name}"));
        }
    }

    ValidationResult::allowed()
}

/// Sanitize a display name for remote storage constraints.
///
/// Keeps ASCII alphanumerics plus `. - _ ( )` and spaces, replaces everything
/// else with `_`, and caps the length. Empty input gets a placeholder name.
pub fn sanitize_display_name(name: &str) -> String {
    let mut out: String = name
        .trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' | ' ' | '(' | ')' => c,
            _ => '_',
        })
        .collect();

    if out.len() > defaults::MAX_REMOTE_NAME_LEN {
        out.truncate(defaults::MAX_REMOTE_NAME_LEN);
    }
    if out.is_empty() {
        out.push_str("unnamed-document");
    }
    out
}

/// Detect the actual media type of a payload.
///
/// Magic bytes win; extension-based detection covers text formats that have
/// none; the declared type is the last resort before the octet-stream
/// fallback. Declared types are frequently wrong for files forwarded from
/// chat apps, which is why detection runs first.
pub fn detect_media_type(display_name: &str, data: &[u8], declared: &str) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    if let Some(ext) = display_name.rsplit('.').next() {
        if let Some(mime) = mime_from_extension(ext) {
            return mime.to_string();
        }
    }

    let declared = declared.trim();
    if !declared.is_empty() {
        return declared.to_string();
    }
    defaults::FALLBACK_MEDIA_TYPE.to_string()
}

/// Extension-based MIME lookup for formats without magic bytes.
fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "txt" => Some("text/plain"),
        "csv" => Some("text/csv"),
        "json" => Some("application/json"),
        "xml" => Some("application/xml"),
        "html" | "htm" => Some("text/html"),
        "md" => Some("text/markdown"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_safe_chars() {
        assert_eq!(
            sanitize_display_name("Report 2026-08 (final).pdf"),
            "Report 2026-08 (final).pdf"
        );
    }

    #[test]
    fn test_sanitize_replaces_illegal_chars() {
        assert_eq!(sanitize_display_name("a/b\\c:d*e?.pdf"), "a_b_c_d_e_.pdf");
        assert_eq!(sanitize_display_name("laporan#êxotic.pdf"), "laporan__xotic.pdf");
    }

    #[test]
    fn test_sanitize_trims_whitespace() {
        assert_eq!(sanitize_display_name("  doc.pdf  "), "doc.pdf");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(
            sanitize_display_name(&long).len(),
            defaults::MAX_REMOTE_NAME_LEN
        );
    }

    #[test]
    fn test_sanitize_empty_gets_placeholder() {
        assert_eq!(sanitize_display_name(""), "unnamed-document");
        assert_eq!(sanitize_display_name("   "), "unnamed-document");
    }

    #[test]
    fn test_detect_pdf_magic_bytes() {
        let data = b"%PDF-1.7 rest of document";
        assert_eq!(
            detect_media_type("whatever.bin", data, "application/octet-stream"),
            "application/pdf"
        );
    }

    #[test]
    fn test_detect_falls_back_to_extension() {
        assert_eq!(detect_media_type("notes.txt", b"plain words", ""), "text/plain");
        assert_eq!(
            detect_media_type("data.json", b"{\"a\":1}", ""),
            "application/json"
        );
    }

    #[test]
    fn test_detect_falls_back_to_declared() {
        assert_eq!(
            detect_media_type("mystery", b"no magic here", "application/pdf"),
            "application/pdf"
        );
    }

    #[test]
    fn test_detect_octet_stream_last_resort() {
        assert_eq!(
            detect_media_type("mystery", b"no magic here", ""),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_validate_blocks_empty() {
        assert!(!validate_payload("a.pdf", b"").allowed);
    }

    #[test]
    fn test_validate_blocks_pe_executable() {
        let result = validate_payload("setup.bin", &[0x4D, 0x5A, 0x90, 0x00]);
        assert!(!result.allowed);
        assert!(result.block_reason.unwrap().contains("Windows PE/MZ"));
    }

    #[test]
    fn test_validate_blocks_elf() {
        let result = validate_payload("tool", &[0x7F, 0x45, 0x4C, 0x46, 0x02]);
        assert!(!result.allowed);
    }

    #[test]
    fn test_validate_blocks_extension() {
        let result = validate_payload("evil.exe", b"not actually a binary");
        assert!(!result.allowed);
        assert!(result.block_reason.unwrap().contains(".exe"));
    }

    #[test]
    fn test_validate_extension_case_insensitive() {
        assert!(!validate_payload("EVIL.EXE", b"data").allowed);
    }

    #[test]
    fn test_validate_allows_pdf() {
        assert!(validate_payload("report.pdf", b"%PDF-1.4 content").allowed);
    }
}
