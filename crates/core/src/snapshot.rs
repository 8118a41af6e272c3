//! Perception snapshot value types.
//!
//! Built fresh on every observe phase and never cached: the environment is
//! assumed to have changed since the previous turn.

use serde::{Deserialize, Serialize};

/// One manifest line: `- <role>: <name>[ [disabled]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub role: Option<String>,
    pub name: Option<String>,
    pub disabled: bool,
}

impl std::fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "- {}: {}",
            self.role.as_deref().unwrap_or("(no role)"),
            self.name.as_deref().unwrap_or("(no name)")
        )?;
        if self.disabled {
            write!(f, " [disabled]")?;
        }
        Ok(())
    }
}

/// The flattened, capped listing of an accessibility tree, or a placeholder
/// explaining why there is none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Manifest {
    Entries { entries: Vec<ManifestEntry> },
    Empty,
    Error { kind: String, message: String },
    /// Manifest extraction was switched off for this session.
    Omitted,
}

impl Manifest {
    /// Render as the text block shown to the decision-maker.
    pub fn render(&self) -> String {
        match self {
            Manifest::Entries { entries } => entries
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
            Manifest::Empty => "UI_MANIFEST_EMPTY".into(),
            Manifest::Error { kind, message } => format!("UI_MANIFEST_ERROR: {kind}: {message}"),
            Manifest::Omitted => String::new(),
        }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        match self {
            Manifest::Entries { entries } => entries,
            _ => &[],
        }
    }
}

/// What the agent sees on one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionSnapshot {
    /// PNG bytes, or `None` when the screenshot could not be taken.
    #[serde(skip)]
    pub image: Option<Vec<u8>>,
    pub manifest: Manifest,
    pub location: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_formats_with_disabled_suffix() {
        let entry = ManifestEntry {
            role: Some("button".into()),
            name: Some("Continue".into()),
            disabled: true,
        };
        assert_eq!(entry.to_string(), "- button: Continue [disabled]");
    }

    #[test]
    fn entry_fills_missing_role_or_name() {
        let entry = ManifestEntry {
            role: None,
            name: Some("Welcome".into()),
            disabled: false,
        };
        assert_eq!(entry.to_string(), "- (no role): Welcome");
    }

    #[test]
    fn placeholders_render_verbatim() {
        assert_eq!(Manifest::Empty.render(), "UI_MANIFEST_EMPTY");
        let err = Manifest::Error {
            kind: "Driver".into(),
            message: "socket closed".into(),
        };
        assert_eq!(err.render(), "UI_MANIFEST_ERROR: Driver: socket closed");
    }
}
