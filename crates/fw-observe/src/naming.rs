/// Sequence number encoded in a run-file name `<prefix><digits>.<extension>`.
///
/// Matching is case-sensitive on the prefix and case-insensitive on the
/// extension. Returns `None` for any other name.
pub fn parse_run_file_name(name: &str, prefix: &str, extension: &str) -> Option<i64> {
    let (stem, ext) = name.rsplit_once('.')?;
    if !ext.eq_ignore_ascii_case(extension) {
        return None;
    }
    let digits = stem.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Canonical file name for `sequence`, zero-padded to `width` digits.
pub fn run_file_name(prefix: &str, sequence: i64, width: usize, extension: &str) -> String {
    format!("{prefix}{sequence:0width$}.{extension}")
}
