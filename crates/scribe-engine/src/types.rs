//! Transcript and artefact data types

use serde::{Deserialize, Serialize};

/// Prefix shared by every diagram artefact key (`diagram:<subtype>`).
pub const DIAGRAM_KEY_PREFIX: &str = "diagram:";

/// Triage prefix requesting creation of a new diagram kind.
pub const DIAGRAM_NEW_PREFIX: &str = "diagram:new:";

/// Triage prefix requesting deletion of an existing diagram kind.
pub const DIAGRAM_DELETE_PREFIX: &str = "diagram:delete:";

/// A single finalized or interim speech/text fragment from the capture layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptFragment {
    /// Fragment text
    pub text: String,
    /// Whether the capture layer considers this fragment final
    pub is_final: bool,
    /// Speaker identifier, when known
    pub speaker_id: Option<String>,
    /// Capture timestamp, unix milliseconds
    pub timestamp_ms: i64,
}

impl TranscriptFragment {
    /// A final fragment stamped with the current time.
    pub fn final_now(text: impl Into<String>, speaker_id: Option<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            speaker_id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// A contiguous span of finalized transcript released together.
/// Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptBatch {
    /// Fragments in arrival order
    pub fragments: Vec<TranscriptFragment>,
    /// Space-joined concatenation of fragment texts
    pub full_text: String,
    /// Timestamp of the first fragment
    pub start_ms: i64,
    /// Timestamp of batch emission
    pub end_ms: i64,
}

impl TranscriptBatch {
    /// Build a batch from finalized fragments, joining texts with single spaces.
    pub fn from_fragments(fragments: Vec<TranscriptFragment>, end_ms: i64) -> Self {
        let full_text = fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let start_ms = fragments.first().map(|f| f.timestamp_ms).unwrap_or(end_ms);
        Self {
            fragments,
            full_text,
            start_ms,
            end_ms,
        }
    }

    /// A batch wrapping one already-complete block of text (typed input,
    /// transcript import).
    pub fn from_text(text: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let fragment = TranscriptFragment {
            text: text.into(),
            is_final: true,
            speaker_id: None,
            timestamp_ms: now,
        };
        Self::from_fragments(vec![fragment], now)
    }
}

/// Last-known content of one artefact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtefactState {
    /// Current content
    pub content: String,
    /// When the content was last replaced, unix milliseconds
    pub last_updated_ms: i64,
}

/// Which output grammar a diagram is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramRenderer {
    /// Mermaid grammar, validated against the known keyword set
    Mermaid,
    /// Self-contained HTML markup (wireframes), no structural validation
    Html,
}

impl DiagramRenderer {
    /// Infer the renderer from stored diagram content.
    pub fn infer(content: &str) -> Self {
        if content.trim_start().starts_with('<') {
            DiagramRenderer::Html
        } else {
            DiagramRenderer::Mermaid
        }
    }

    /// Default renderer for a diagram kind requested by name.
    pub fn default_for_kind(kind: &str) -> Self {
        if kind == "wireframe" {
            DiagramRenderer::Html
        } else {
            DiagramRenderer::Mermaid
        }
    }
}

/// One planned diagram: what to draw and in which grammar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramPlan {
    /// Diagram subtype ("er", "sequence", "flowchart", "wireframe", ...)
    #[serde(rename = "type")]
    pub diagram_type: String,
    /// What the diagram should concentrate on
    pub focus: String,
    /// Output grammar
    pub renderer: DiagramRenderer,
}

impl DiagramPlan {
    /// The artefact key this plan writes to.
    pub fn artefact_key(&self) -> String {
        format!("{}{}", DIAGRAM_KEY_PREFIX, self.diagram_type)
    }
}

/// Extract the subtype from a `diagram:<subtype>` key, rejecting the dynamic
/// `diagram:new:` / `diagram:delete:` forms.
pub fn diagram_subtype(key: &str) -> Option<&str> {
    let rest = key.strip_prefix(DIAGRAM_KEY_PREFIX)?;
    if rest.is_empty() || rest.starts_with("new:") || rest.starts_with("delete:") {
        return None;
    }
    Some(rest)
}
