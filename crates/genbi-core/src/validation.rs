//! File validation gate
//!
//! Runs before any network call or preview creation. A rejected file never
//! reaches the staging client and never changes a field's value.

use std::path::Path;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Validation errors for selected files. `Display` is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Ukuran file maksimal {}", format_size_limit(*max))]
    FileTooLarge { size: u64, max: u64 },

    #[error("Format file tidak didukung ({mime_type})")]
    InvalidType { mime_type: String, accept: String },

    #[error("File kosong")]
    EmptyFile,
}

/// Render a byte limit the way the console labels it: `2MB`, `512KB`, `100 byte`.
pub fn format_size_limit(bytes: u64) -> String {
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= MIB {
        format!("{:.1}MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{} byte", bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AcceptRule {
    /// `image/*`
    Family(String),
    /// `application/pdf`
    Exact(String),
    /// `.pdf`
    Extension(String),
}

/// An HTML-style `accept` list: `image/*,.pdf,application/msword`.
///
/// An empty pattern accepts everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AcceptPattern {
    raw: String,
    rules: Vec<AcceptRule>,
}

impl AcceptPattern {
    pub fn parse(pattern: &str) -> Self {
        let rules = pattern
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty() && s != "*" && s != "*/*")
            .map(|s| {
                if let Some(ext) = s.strip_prefix('.') {
                    AcceptRule::Extension(ext.to_string())
                } else if let Some(family) = s.strip_suffix("/*") {
                    AcceptRule::Family(family.to_string())
                } else {
                    AcceptRule::Exact(s)
                }
            })
            .collect();

        Self {
            raw: pattern.trim().to_string(),
            rules,
        }
    }

    /// Accept anything.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether a file with this name and MIME type matches any rule.
    pub fn matches(&self, file_name: &str, mime_type: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        let mime = mime_type.trim().to_lowercase();
        // Drop parameters like `; charset=utf-8`
        let mime = mime.split(';').next().unwrap_or_default().trim();
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        self.rules.iter().any(|rule| match rule {
            AcceptRule::Family(family) => mime
                .split_once('/')
                .is_some_and(|(prefix, _)| prefix == family),
            AcceptRule::Exact(exact) => mime == exact,
            AcceptRule::Extension(ext) => extension.as_deref() == Some(ext.as_str()),
        })
    }
}

/// Size and type gate for one upload field.
#[derive(Debug, Clone)]
pub struct FileValidator {
    max_size_bytes: u64,
    accept: AcceptPattern,
}

impl FileValidator {
    pub fn new(max_size_bytes: u64, accept: AcceptPattern) -> Self {
        Self {
            max_size_bytes,
            accept,
        }
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Validate file size. A file of exactly `max_size_bytes` is accepted.
    pub fn validate_size(&self, size: u64) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        if size > self.max_size_bytes {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_size_bytes,
            });
        }

        Ok(())
    }

    /// Validate MIME type / extension against the accept pattern.
    pub fn validate_type(&self, file_name: &str, mime_type: &str) -> Result<(), ValidationError> {
        if !self.accept.matches(file_name, mime_type) {
            return Err(ValidationError::InvalidType {
                mime_type: mime_type.to_string(),
                accept: self.accept.as_str().to_string(),
            });
        }
        Ok(())
    }

    pub fn validate(&self, file_name: &str, mime_type: &str, size: u64) -> Result<(), ValidationError> {
        self.validate_size(size)?;
        self.validate_type(file_name, mime_type)
    }
}
