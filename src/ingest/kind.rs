use super::path::file_name;

/// Content categories accepted into a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Markup,
    Stylesheet,
    Script,
    Image,
    Font,
    Media,
    Data,
}

impl FileKind {
    /// Classifies a path by extension. `None` means the file is not allowed.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = extension(path)?;

        let kind = match ext.as_str() {
            "html" | "htm" => Self::Markup,
            "css" => Self::Stylesheet,
            "js" | "mjs" => Self::Script,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "ico" | "bmp" => Self::Image,
            "woff" | "woff2" | "ttf" | "otf" => Self::Font,
            "mp3" | "wav" | "ogg" | "mp4" | "webm" => Self::Media,
            "json" | "txt" | "md" | "csv" | "xml" => Self::Data,
            _ => return None,
        };

        Some(kind)
    }
}

#[must_use]
pub fn is_markup(path: &str) -> bool {
    FileKind::from_path(path) == Some(FileKind::Markup)
}

#[must_use]
pub fn content_type(path: &str) -> &'static str {
    let ext = extension(path).unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

fn extension(path: &str) -> Option<String> {
    let name = file_name(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
