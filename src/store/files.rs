//! On-disk layout of a workspace:
//!
//! ```text
//! <workspaces_dir>/<id>/
//!     <source document>
//!     extraccion_<source document>.txt
//!     analysis.json
//!     inconsistencias.json
//!     logo_<file>
//!     <name>_Documentos_Generados/<document>.docx
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::models::{FileEntry, SourceEntry};
use crate::identity::IdentityReport;
use crate::tender::TenderAnalysis;
use crate::util::{extraction_cache_name, generated_folder_name, is_safe_segment};

pub const ANALYSIS_FILE: &str = "analysis.json";
pub const INCONSISTENCIES_FILE: &str = "inconsistencias.json";

/// Make an arbitrary name usable as a single path segment.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim().to_string();
    if cleaned.is_empty() {
        "documento".to_string()
    } else {
        cleaned
    }
}

/// `<document>.docx`, with path separators in the title turned into
/// underscores.
pub fn generated_file_name(document: &str) -> String {
    format!(
        "{}.docx",
        sanitize_file_name(&document.replace(['/', '\\'], "_"))
    )
}

fn file_kind(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("docx") => "docx",
        Some("txt") => "txt",
        Some("pdf") => "pdf",
        _ => "other",
    }
}

/// Workspace folders under one root directory.
#[derive(Debug, Clone)]
pub struct WorkspaceFiles {
    root: PathBuf,
}

impl WorkspaceFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder of workspace `id`; rejects ids that would escape the root.
    pub fn workspace_dir(&self, id: &str) -> Result<PathBuf> {
        if !is_safe_segment(id) {
            bail!("Invalid workspace id: {:?}", id);
        }
        Ok(self.root.join(id))
    }

    async fn ensure_dir(&self, id: &str) -> Result<PathBuf> {
        let dir = self.workspace_dir(id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create workspace folder: {}", dir.display()))?;
        Ok(dir)
    }

    // ── Sources ───────────────────────────────────────────────────────

    /// Write an uploaded document and describe it for the `sources` column.
    pub async fn save_source(&self, id: &str, filename: &str, bytes: &[u8]) -> Result<SourceEntry> {
        let dir = self.ensure_dir(id).await?;
        let filename = sanitize_file_name(filename);
        let path = dir.join(&filename);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write source file: {}", path.display()))?;
        Ok(SourceEntry {
            filename,
            size: bytes.len() as u64,
            sha256: format!("{:x}", Sha256::digest(bytes)),
            uploaded_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub async fn read_extraction_cache(&self, id: &str, filename: &str) -> Result<Option<String>> {
        let path = self
            .workspace_dir(id)?
            .join(extraction_cache_name(&sanitize_file_name(filename)));
        read_optional(&path).await
    }

    pub async fn write_extraction_cache(&self, id: &str, filename: &str, text: &str) -> Result<()> {
        let dir = self.ensure_dir(id).await?;
        let path = dir.join(extraction_cache_name(&sanitize_file_name(filename)));
        tokio::fs::write(&path, text)
            .await
            .with_context(|| format!("Failed to write extraction cache: {}", path.display()))
    }

    // ── JSON artifacts ────────────────────────────────────────────────

    pub async fn read_analysis(&self, id: &str) -> Result<Option<TenderAnalysis>> {
        self.read_json(id, ANALYSIS_FILE).await
    }

    pub async fn write_analysis(&self, id: &str, analysis: &TenderAnalysis) -> Result<()> {
        self.write_json(id, ANALYSIS_FILE, analysis).await
    }

    pub async fn read_inconsistencies(&self, id: &str) -> Result<Option<IdentityReport>> {
        self.read_json(id, INCONSISTENCIES_FILE).await
    }

    pub async fn write_inconsistencies(&self, id: &str, report: &IdentityReport) -> Result<()> {
        self.write_json(id, INCONSISTENCIES_FILE, report).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, id: &str, name: &str) -> Result<Option<T>> {
        let path = self.workspace_dir(id)?.join(name);
        let Some(content) = read_optional(&path).await? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(value))
    }

    async fn write_json<T: serde::Serialize>(&self, id: &str, name: &str, value: &T) -> Result<()> {
        let dir = self.ensure_dir(id).await?;
        let path = dir.join(name);
        let content = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize {}", name))?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    // ── Logo and generated documents ──────────────────────────────────

    pub async fn save_logo(&self, id: &str, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.ensure_dir(id).await?;
        let path = dir.join(format!("logo_{}", sanitize_file_name(filename)));
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write logo: {}", path.display()))?;
        Ok(path)
    }

    /// Create the generated-documents folder; returns its name and path.
    pub async fn generated_dir(&self, id: &str, workspace_name: &str) -> Result<(String, PathBuf)> {
        let folder = sanitize_file_name(&generated_folder_name(workspace_name));
        let path = self.ensure_dir(id).await?.join(&folder);
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("Failed to create output folder: {}", path.display()))?;
        Ok((folder, path))
    }

    /// Write [`generated_file_name`] of `document` into `folder`; returns the
    /// file name used.
    pub async fn save_generated(
        &self,
        id: &str,
        folder: &str,
        document: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let name = generated_file_name(document);
        let path = self.workspace_dir(id)?.join(folder).join(&name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write document: {}", path.display()))?;
        Ok(name)
    }

    // ── Listing ───────────────────────────────────────────────────────

    /// Every file of the workspace, with '/'-separated relative names.
    pub async fn list_files(&self, id: &str) -> Result<Vec<FileEntry>> {
        let dir = self.workspace_dir(id)?;
        tokio::task::spawn_blocking(move || {
            if !dir.is_dir() {
                return Ok(Vec::new());
            }
            let mut entries = Vec::new();
            for entry in WalkDir::new(&dir).sort_by_file_name() {
                let entry = entry.context("Failed to walk workspace folder")?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(&dir)
                    .context("Walked outside workspace folder")?;
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                entries.push(FileEntry {
                    name,
                    size,
                    kind: file_kind(entry.path()).to_string(),
                });
            }
            Ok(entries)
        })
        .await
        .context("File listing task panicked")?
    }

    /// Cached extraction texts at the top of the workspace folder, by file
    /// name, at most `limit` of them.
    pub async fn extraction_texts(&self, id: &str, limit: usize) -> Result<Vec<String>> {
        let mut texts = Vec::new();
        for entry in self.list_files(id).await? {
            if texts.len() >= limit {
                break;
            }
            if entry.name.contains('/')
                || !entry.name.starts_with("extraccion_")
                || !entry.name.ends_with(".txt")
            {
                continue;
            }
            let path = self.workspace_dir(id)?.join(&entry.name);
            if let Some(text) = read_optional(&path).await? {
                texts.push(text);
            }
        }
        Ok(texts)
    }

    /// Path of `rel_path` inside the workspace, if that file exists.
    pub async fn resolve_file(&self, id: &str, rel_path: &str) -> Result<Option<PathBuf>> {
        let mut path = self.workspace_dir(id)?;
        let segments: Vec<&str> = rel_path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() || !segments.iter().all(|s| is_safe_segment(s)) {
            bail!("Invalid file path: {:?}", rel_path);
        }
        for segment in segments {
            path.push(segment);
        }
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(path)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to stat {}", path.display())),
        }
    }

    /// Remove the workspace folder; a missing folder is not an error.
    pub async fn remove_workspace(&self, id: &str) -> Result<()> {
        let dir = self.workspace_dir(id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", dir.display())),
        }
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}
