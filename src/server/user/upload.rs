use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;

use crate::ingest::UploadInput;
use crate::server::response::ApiError;

/// Fields of a project upload form. Text fields are optional so that
/// replacing files can reuse the same parser.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub context: Option<String>,
    pub mode: Option<String>,
    pub files: Vec<(String, Vec<u8>)>,
}

fn multipart_error(e: MultipartError) -> ApiError {
    let status = e.status();
    let kind = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "upload_too_large"
    } else {
        "bad_request"
    };
    ApiError::new(status, kind, e.body_text())
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field.text().await.map_err(multipart_error)
}

pub async fn read_upload_form(multipart: &mut Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("title") => form.title = Some(read_text(field).await?),
            Some("description") => form.description = Some(read_text(field).await?),
            Some("context") => {
                let context = read_text(field).await?;
                let context = context.trim();
                if !context.is_empty() {
                    form.context = Some(context.to_string());
                }
            }
            Some("mode") => form.mode = Some(read_text(field).await?),
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::bad_request("File parts need a filename"))?;
                let content = field.bytes().await.map_err(multipart_error)?;
                form.files.push((filename, content.to_vec()));
            }
            _ => {}
        }
    }

    Ok(form)
}

impl UploadForm {
    /// Maps the `mode` field onto an upload shape. Without a mode, a lone `.zip`
    /// is an archive, a lone file is a single file and anything else is a file set.
    pub fn into_upload(self) -> Result<UploadInput, ApiError> {
        let mode = match self.mode.as_deref().map(str::trim) {
            Some("") | None => infer_mode(&self.files),
            Some(mode @ ("single" | "multiple" | "archive")) => mode,
            Some(other) => {
                return Err(ApiError::bad_request(format!(
                    "Unknown upload mode '{other}', expected single, multiple or archive"
                )));
            }
        };

        let mut files = self.files;
        if files.is_empty() {
            return Ok(UploadInput::MultipleFiles(files));
        }

        match mode {
            "multiple" => Ok(UploadInput::MultipleFiles(files)),
            _ if files.len() > 1 => Err(ApiError::bad_request(format!(
                "Mode '{mode}' takes exactly one file, got {}",
                files.len()
            ))),
            "archive" => {
                let (_, content) = files.remove(0);
                Ok(UploadInput::Archive(content))
            }
            _ => {
                let (filename, content) = files.remove(0);
                Ok(UploadInput::SingleFile { filename, content })
            }
        }
    }
}

fn infer_mode(files: &[(String, Vec<u8>)]) -> &'static str {
    match files {
        [(name, _)] if name.to_ascii_lowercase().ends_with(".zip") => "archive",
        [_] => "single",
        _ => "multiple",
    }
}
