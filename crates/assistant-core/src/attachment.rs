//! Documents picked for upload to `/summarize`

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extensions the backend can summarize
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["pdf", "txt", "docx"];

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("unsupported file type '{0}' (accepted: .pdf, .txt, .docx)")]
    Unsupported(String),
    #[error("{} is not a file", .0.display())]
    NotAFile(PathBuf),
    #[error("could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    name: String,
    bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, AttachmentError> {
        let name = name.into();
        extension_of(&name)?;
        Ok(Self { name, bytes })
    }

    /// Read a document from disk, checking its type first.
    pub fn load(path: &Path) -> Result<Self, AttachmentError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AttachmentError::NotAFile(path.to_path_buf()))?;
        extension_of(&name)?;

        if !path.is_file() {
            return Err(AttachmentError::NotAFile(path.to_path_buf()));
        }
        let bytes = fs::read(path).map_err(|source| AttachmentError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self { name, bytes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Size in kilobytes with one decimal, e.g. `12.5 KB`
    pub fn size_label(&self) -> String {
        format!("{:.1} KB", self.bytes.len() as f64 / 1024.0)
    }

    pub fn mime_type(&self) -> &'static str {
        match extension_of(&self.name) {
            Ok("pdf") => "application/pdf",
            Ok("txt") => "text/plain",
            Ok("docx") => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            _ => "application/octet-stream",
        }
    }
}

fn extension_of(name: &str) -> Result<&'static str, AttachmentError> {
    let extension = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    ACCEPTED_EXTENSIONS
        .iter()
        .find(|accepted| **accepted == extension)
        .copied()
        .ok_or(AttachmentError::Unsupported(extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_accepts_known_extensions_case_insensitive() {
        assert!(Attachment::new("report.PDF", vec![1, 2, 3]).is_ok());
        assert!(Attachment::new("notes.txt", Vec::new()).is_ok());
        assert!(Attachment::new("draft.docx", Vec::new()).is_ok());
    }

    #[test]
    fn test_rejects_other_extensions() {
        let err = Attachment::new("photo.png", Vec::new()).unwrap_err();
        assert!(matches!(err, AttachmentError::Unsupported(ref ext) if ext == "png"));
        assert!(Attachment::new("Makefile", Vec::new()).is_err());
    }

    #[test]
    fn test_size_label_and_mime() {
        let attachment = Attachment::new("a.pdf", vec![0; 1536]).unwrap();
        assert_eq!(attachment.size(), 1536);
        assert_eq!(attachment.size_label(), "1.5 KB");
        assert_eq!(attachment.mime_type(), "application/pdf");
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.txt");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"some document text").unwrap();

        let attachment = Attachment::load(&path).unwrap();
        assert_eq!(attachment.name(), "summary.txt");
        assert_eq!(attachment.bytes(), b"some document text");
        assert_eq!(attachment.mime_type(), "text/plain");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Attachment::load(&dir.path().join("missing.pdf")).unwrap_err();
        assert!(matches!(err, AttachmentError::NotAFile(_)));
    }
}
