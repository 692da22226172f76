//! Knowledge-base file I/O.
//!
//! The knowledge base is a pretty-printed JSON array of
//! `{"topic": ..., "reply": ...}` objects so operators can read and
//! hand-edit it.

use anyhow::{Context, Result};
use std::path::Path;

use replydesk_core::models::KnowledgeBase;

pub fn load(path: &Path) -> Result<KnowledgeBase> {
    let content = std::fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read knowledge base {} (run `replydesk prepare` first)",
            path.display()
        )
    })?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse knowledge base {}", path.display()))
}

pub fn save(path: &Path, kb: &KnowledgeBase) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(kb)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write knowledge base {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use replydesk_core::models::TemplateRecord;

    #[test]
    fn test_save_then_load_is_human_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/kb.json");
        let kb = vec![TemplateRecord {
            topic: "Refund issued.".into(),
            reply: "Dear User,\nRefund issued.\nThanks,\nQoneqt Support Team".into(),
        }];
        save(&path, &kb).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"topic\": \"Refund issued.\""));
        assert_eq!(load(&path).unwrap(), kb);
    }

    #[test]
    fn test_missing_file_mentions_prepare() {
        let err = load(Path::new("/nonexistent/kb.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("replydesk prepare"));
    }
}
