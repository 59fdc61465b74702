mod pdf;
mod text;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use exam_core::model::{CandidateIdentity, ResultSummary};

use crate::error::ReportError;

pub use pdf::render_pdf;
pub use text::render_text;

/// Artifact kinds produced for a graded attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Pdf,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 2] = [ReportFormat::Text, ReportFormat::Pdf];

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Pdf => "pdf",
        }
    }

    /// `<stem>_result.<ext>` for the given candidate.
    #[must_use]
    pub fn file_name(self, identity: &CandidateIdentity) -> String {
        format!("{}_result.{}", identity.file_stem(), self.extension())
    }

    #[must_use]
    pub fn render(self, summary: &ResultSummary) -> Vec<u8> {
        match self {
            ReportFormat::Text => render_text(summary).into_bytes(),
            ReportFormat::Pdf => render_pdf(summary),
        }
    }
}

/// A file written by a report writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    pub format: ReportFormat,
    pub path: PathBuf,
    pub bytes: usize,
}

/// Renders a result summary into downloadable artifacts.
#[async_trait]
pub trait ReportWriter: Send + Sync {
    /// Produce every artifact for `summary`.
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if any artifact cannot be written.
    async fn write(&self, summary: &ResultSummary) -> Result<Vec<ReportArtifact>, ReportError>;
}

/// Writes the text and PDF reports into a directory.
#[derive(Debug, Clone)]
pub struct FileReportWriter {
    out_dir: PathBuf,
}

impl FileReportWriter {
    #[must_use]
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }
}

#[async_trait]
impl ReportWriter for FileReportWriter {
    async fn write(&self, summary: &ResultSummary) -> Result<Vec<ReportArtifact>, ReportError> {
        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|source| ReportError::Io {
                path: self.out_dir.clone(),
                source,
            })?;

        let mut artifacts = Vec::with_capacity(ReportFormat::ALL.len());
        for format in ReportFormat::ALL {
            let path = self.out_dir.join(format.file_name(summary.identity()));
            let data = format.render(summary);
            tokio::fs::write(&path, &data)
                .await
                .map_err(|source| ReportError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing::debug!(path = %path.display(), bytes = data.len(), "report written");
            artifacts.push(ReportArtifact {
                format,
                path,
                bytes: data.len(),
            });
        }
        Ok(artifacts)
    }
}
