//! Knowledge source loading for index rebuilds.
//!
//! A knowledge source is either a JSON file holding an array of documents
//! or a directory tree of Markdown / text / JSON files.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use super::types::{DocumentInput, IndexError};

#[derive(Debug, Deserialize)]
struct KnowledgeEntry {
    #[serde(default)]
    source: Option<String>,
    title: String,
    #[serde(default)]
    category: Option<String>,
    content: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

fn build_failed(reason: String) -> IndexError {
    IndexError::BuildFailed { reason }
}

/// Load every document from a knowledge source.
///
/// Fails when the path cannot be read or yields no documents.
pub fn load_knowledge(path: &Path) -> Result<Vec<DocumentInput>, IndexError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        build_failed(format!(
            "knowledge source {} is unreadable: {e}",
            path.display()
        ))
    })?;

    let documents = if metadata.is_dir() {
        let mut documents = Vec::new();
        load_directory(path, path, &mut documents)?;
        documents
    } else {
        load_json_file(path, "general")?
    };

    if documents.is_empty() {
        return Err(build_failed(format!(
            "knowledge source {} contains no documents",
            path.display()
        )));
    }

    tracing::debug!(
        path = %path.display(),
        documents = documents.len(),
        "Loaded knowledge source"
    );
    Ok(documents)
}

fn load_json_file(path: &Path, default_category: &str) -> Result<Vec<DocumentInput>, IndexError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| build_failed(format!("failed to read {}: {e}", path.display())))?;
    let entries: Vec<KnowledgeEntry> = serde_json::from_str(&raw)
        .map_err(|e| build_failed(format!("failed to parse {}: {e}", path.display())))?;

    let file_label = path.display().to_string();
    Ok(entries
        .into_iter()
        .enumerate()
        .filter(|(_, entry)| !entry.content.trim().is_empty())
        .map(|(position, entry)| DocumentInput {
            source: entry
                .source
                .unwrap_or_else(|| format!("{file_label}:{position}")),
            title: entry.title,
            category: entry
                .category
                .unwrap_or_else(|| default_category.to_string()),
            content: entry.content,
            metadata: entry.metadata,
        })
        .collect())
}

fn load_directory(
    root: &Path,
    dir: &Path,
    documents: &mut Vec<DocumentInput>,
) -> Result<(), IndexError> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| build_failed(format!("failed to list {}: {e}", dir.display())))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| build_failed(format!("failed to list {}: {e}", dir.display())))?;
    // Stable ordering keeps rebuilds reproducible
    entries.sort_by_key(|entry| entry.path());

    let category = if dir == root {
        "general".to_string()
    } else {
        dir.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "general".to_string())
    };

    for entry in entries {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| build_failed(format!("failed to stat {}: {e}", path.display())))?;
        // Linked directories are not followed; a link back up the tree would never end
        if file_type.is_symlink() && path.is_dir() {
            tracing::debug!(path = %path.display(), "Skipping linked knowledge directory");
            continue;
        }
        if file_type.is_dir() {
            load_directory(root, &path, documents)?;
            continue;
        }

        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "json" => documents.extend(load_json_file(&path, &category)?),
            "md" | "markdown" | "txt" => {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| build_failed(format!("failed to read {}: {e}", path.display())))?;
                if content.trim().is_empty() {
                    continue;
                }
                let source = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                let title = markdown_title(&content).unwrap_or_else(|| {
                    path.file_stem()
                        .map(|stem| stem.to_string_lossy().replace(['_', '-'], " "))
                        .unwrap_or_else(|| source.clone())
                });
                documents.push(DocumentInput::new(source, title, category.clone(), content));
            }
            _ => {
                tracing::debug!(path = %path.display(), "Skipping unsupported knowledge file");
            }
        }
    }

    Ok(())
}

/// First Markdown heading of a document, if any
fn markdown_title(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|title| !title.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn test_linked_directories_are_not_followed() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("policies")).unwrap();
        fs::write(
            dir.path().join("policies/leave.md"),
            "# Leave Policy\n\nSick leave needs a certificate.",
        )
        .unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("policies/loop")).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("policies/leave.md"),
            dir.path().join("leave_link.md"),
        )
        .unwrap();

        let docs = load_knowledge(dir.path()).unwrap();
        let mut sources: Vec<&str> = docs.iter().map(|d| d.source.as_str()).collect();
        sources.sort_unstable();
        assert_eq!(sources, vec!["leave_link.md", "policies/leave.md"]);
    }

    #[test]
    fn test_load_directory_of_markdown() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("policies")).unwrap();
        fs::write(
            dir.path().join("policies/leave.md"),
            "# Leave Policy\n\nStudents may take up to ten days of sick leave.",
        )
        .unwrap();
        fs::write(dir.path().join("faq.txt"), "The portal resets passwords nightly.").unwrap();
        fs::write(dir.path().join("logo.png"), [0u8, 1, 2]).unwrap();

        let docs = load_knowledge(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);

        let leave = docs.iter().find(|d| d.source == "policies/leave.md").unwrap();
        assert_eq!(leave.title, "Leave Policy");
        assert_eq!(leave.category, "policies");

        let faq = docs.iter().find(|d| d.source == "faq.txt").unwrap();
        assert_eq!(faq.title, "faq");
        assert_eq!(faq.category, "general");
    }

    #[test]
    fn test_load_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kb.json");
        fs::write(
            &path,
            r#"[
                {"title": "Attendance", "category": "policy",
                 "content": "Minimum attendance is 75%."},
                {"source": "notices/exam", "title": "Exams", "content": "Exams start in May."},
                {"title": "Empty", "content": "   "}
            ]"#,
        )
        .unwrap();

        let docs = load_knowledge(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].category, "policy");
        assert!(docs[0].source.ends_with(":0"));
        assert_eq!(docs[1].source, "notices/exam");
    }

    #[test]
    fn test_missing_or_empty_source_fails() {
        let dir = TempDir::new().unwrap();
        let err = load_knowledge(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), "IndexBuildError");

        let err = load_knowledge(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "IndexBuildError");
    }
}
