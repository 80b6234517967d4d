use std::fs;
use std::path::Path;

use crate::ObserveError;

/// Parsed control-file line: `<instrument> <run number> <flag>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRecord {
    pub instrument: String,
    /// Run number as written, leading zeros included.
    pub run_number: String,
    pub sequence: i64,
}

/// Parse the first line of a control file.
///
/// Exactly three whitespace-separated tokens are required and the middle
/// one must be a decimal run number. Anything else is reported as the
/// reason string for [`ObserveError::ControlFileCorrupt`].
pub fn parse_control_line(content: &str) -> Result<ControlRecord, String> {
    let line = content.lines().next().unwrap_or("");
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(format!(
            "expected 3 fields, found {} in {:?}",
            parts.len(),
            truncate(line, 64)
        ));
    }

    let run_number = parts[1];
    if !run_number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("run number {run_number:?} is not numeric"));
    }
    let sequence: i64 = run_number
        .parse()
        .map_err(|_| format!("run number {run_number:?} out of range"))?;

    Ok(ControlRecord {
        instrument: parts[0].to_string(),
        run_number: run_number.to_string(),
        sequence,
    })
}

/// Read and parse the control file at `path`.
pub fn read_control_file(path: &Path) -> Result<ControlRecord, ObserveError> {
    let content = fs::read_to_string(path).map_err(|e| ObserveError::ControlFileCorrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_control_line(&content).map_err(|reason| ObserveError::ControlFileCorrupt {
        path: path.to_path_buf(),
        reason,
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
