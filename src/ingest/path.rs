use thiserror::Error;

const MAX_SEGMENT_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path cannot be empty")]
    Empty,
    #[error("path must be relative: {0}")]
    Absolute(String),
    #[error("path cannot contain '..' segments: {0}")]
    Traversal(String),
    #[error("path contains control characters")]
    ControlCharacter,
    #[error("path segment cannot exceed {MAX_SEGMENT_LEN} bytes")]
    SegmentTooLong,
}

impl PathError {
    pub fn kind(&self) -> &'static str {
        "invalid_path"
    }
}

/// Normalizes an untrusted relative path into canonical `a/b/c` form.
///
/// Backslashes are treated as separators, empty and `.` segments are dropped.
/// Anything that could address a location outside the project root is rejected
/// rather than repaired.
pub fn sanitize(raw: &str) -> Result<String, PathError> {
    let path = raw.trim();

    if path.is_empty() {
        return Err(PathError::Empty);
    }

    if path.chars().any(char::is_control) {
        return Err(PathError::ControlCharacter);
    }

    if path.starts_with('/') || path.starts_with('\\') || has_drive_prefix(path) {
        return Err(PathError::Absolute(raw.to_string()));
    }

    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    for segment in &segments {
        validate_segment(segment, raw)?;
    }

    if segments.is_empty() {
        return Err(PathError::Empty);
    }

    Ok(segments.join("/"))
}

fn validate_segment(segment: &str, raw: &str) -> Result<(), PathError> {
    if segment == ".." {
        return Err(PathError::Traversal(raw.to_string()));
    }

    if segment.len() > MAX_SEGMENT_LEN {
        return Err(PathError::SegmentTooLong);
    }

    Ok(())
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Final segment of a sanitized path.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Number of directories above the file; `index.html` is depth 0.
#[must_use]
pub fn depth(path: &str) -> usize {
    path.matches('/').count()
}
