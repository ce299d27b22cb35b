//! Content types by file extension.

use crate::config::Config;

const BUILTIN: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("txt", "text/plain"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("xml", "text/xml"),
    ("gif", "image/gif"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("pdf", "application/pdf"),
    ("gz", "application/x-gzip"),
    ("tar", "application/x-tar"),
    ("zip", "application/zip"),
];

#[derive(Debug, Clone)]
pub struct MimeTypes {
    extra: Vec<(String, String)>,
    default: String,
}

impl MimeTypes {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            extra: cfg
                .mime_types
                .iter()
                .map(|(ext, ty)| (ext.trim_start_matches('.').to_string(), ty.clone()))
                .collect(),
            default: cfg.default_type.clone(),
        }
    }

    /// Content type for a path or URI, judged by its extension.
    pub fn lookup(&self, name: &str) -> &str {
        let name = name.split('?').next().unwrap_or(name);
        let file = name.rsplit('/').next().unwrap_or(name);
        let Some((_, ext)) = file.rsplit_once('.') else {
            return &self.default;
        };

        self.extra
            .iter()
            .map(|(e, t)| (e.as_str(), t.as_str()))
            .chain(BUILTIN.iter().copied())
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map_or(self.default.as_str(), |(_, t)| t)
    }
}
