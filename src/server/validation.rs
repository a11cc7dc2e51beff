use crate::server::response::ApiError;

const MAX_USERNAME_LEN: usize = 64;
const MAX_CONTEXT_LEN: usize = 64;
const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 2000;

fn is_valid_name_char(c: char, allow_period: bool) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || (allow_period && c == '.')
}

fn validate_name(name: &str, entity: &str, max_len: usize, allow_period: bool) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{entity} cannot be empty"));
    }
    if name.len() > max_len {
        return Err(format!("{entity} cannot exceed {max_len} characters"));
    }
    if !name.chars().all(|c| is_valid_name_char(c, allow_period)) {
        let mut allowed = "alphanumeric characters, hyphens, and underscores".to_string();
        if allow_period {
            allowed.push_str(", and periods");
        }
        return Err(format!("{entity} can only contain {allowed}"));
    }
    if name.starts_with('-') || name.starts_with('_') {
        return Err(format!("{entity} cannot start with a hyphen or underscore"));
    }
    Ok(())
}

pub fn validate_username(name: &str) -> Result<(), ApiError> {
    validate_name(name, "Username", MAX_USERNAME_LEN, true).map_err(ApiError::bad_request)
}

pub fn validate_context(context: &str) -> Result<(), ApiError> {
    validate_name(context, "Context", MAX_CONTEXT_LEN, false).map_err(ApiError::bad_request)
}

/// Titles are free text, trimmed, with no control characters.
pub fn validate_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("Title cannot be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::bad_request(format!(
            "Title cannot exceed {MAX_TITLE_LEN} characters"
        )));
    }
    if title.chars().any(char::is_control) {
        return Err(ApiError::bad_request("Title cannot contain control characters"));
    }
    Ok(title.to_string())
}

/// Descriptions are optional free text. Blank means none; line breaks and tabs are kept.
pub fn validate_description(description: &str) -> Result<Option<String>, ApiError> {
    let description = description.trim();
    if description.is_empty() {
        return Ok(None);
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::bad_request(format!(
            "Description cannot exceed {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    if description
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        return Err(ApiError::bad_request(
            "Description cannot contain control characters",
        ));
    }
    Ok(Some(description.to_string()))
}
