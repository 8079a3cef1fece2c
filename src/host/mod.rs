//! Editor host notifications.

pub mod stdin;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A notification from the editor host.
///
/// `document` is whatever identifier the host uses for the file; it is
/// resolved to an absolute path with [`resolve_document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum HostEvent {
    /// The current editor is about to lose focus.
    FocusLost {
        #[serde(default)]
        document: Option<String>,
    },
    FocusGained {
        #[serde(default)]
        document: Option<String>,
    },
    AboutToSave {
        #[serde(default)]
        document: Option<String>,
    },
    /// Text changed in the focused editor.
    TextChanged,
}

impl HostEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FocusLost { .. } => "focus-lost",
            Self::FocusGained { .. } => "focus-gained",
            Self::AboutToSave { .. } => "about-to-save",
            Self::TextChanged => "text-changed",
        }
    }
}

/// Absolute path for a host document identifier.
///
/// Empty identifiers yield `None`; relative ones are made absolute against
/// the process working directory.
pub fn resolve_document(document: Option<&str>) -> Option<PathBuf> {
    let document = document?.trim();
    if document.is_empty() {
        return None;
    }
    std::path::absolute(Path::new(document)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_focus_gained() {
        let event: HostEvent =
            serde_json::from_str(r#"{"event":"focus-gained","document":"/p/a.rs"}"#).unwrap();
        assert_eq!(
            event,
            HostEvent::FocusGained {
                document: Some("/p/a.rs".to_string())
            }
        );
    }

    #[test]
    fn test_parse_text_changed_without_document() {
        let event: HostEvent = serde_json::from_str(r#"{"event":"text-changed"}"#).unwrap();
        assert_eq!(event, HostEvent::TextChanged);
        assert_eq!(event.name(), "text-changed");
    }

    #[test]
    fn test_missing_document_defaults_to_none() {
        let event: HostEvent = serde_json::from_str(r#"{"event":"focus-lost"}"#).unwrap();
        assert_eq!(event, HostEvent::FocusLost { document: None });
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(serde_json::from_str::<HostEvent>(r#"{"event":"exploded"}"#).is_err());
    }

    #[test]
    fn test_resolve_document() {
        assert_eq!(resolve_document(None), None);
        assert_eq!(resolve_document(Some("")), None);
        assert_eq!(resolve_document(Some("   ")), None);
        assert_eq!(
            resolve_document(Some("/a/b.txt")),
            Some(PathBuf::from("/a/b.txt"))
        );

        let relative = resolve_document(Some("src/lib.rs")).unwrap();
        assert!(relative.is_absolute());
        assert!(relative.ends_with("src/lib.rs"));
    }
}
