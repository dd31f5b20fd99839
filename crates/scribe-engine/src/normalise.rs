//! Diagram output normalisation
//!
//! Models wrap diagrams in code fences, prepend prose, add styling the
//! rendering layer owns, and emit one specific malformed ER attribute syntax.
//! Output that still fails grammar validation after repair is discarded by
//! the caller rather than persisted.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::DiagramRenderer;

/// Line-start keywords of the supported mermaid grammars.
static MERMAID_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:graph|sequenceDiagram|erDiagram|classDiagram|stateDiagram|flowchart|C4Context|C4Container|gantt|pie|gitGraph)\b",
    )
    .expect("keyword regex")
});

/// Malformed ER attribute line: `  Entity : attribute` outside a relationship.
static ER_ATTRIBUTE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+(\w+)\s+:\s+(.+)$").expect("er attribute regex"));

/// Inline style-class annotation (`node:::highlight`).
static STYLE_CLASS_ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":::\w+").expect("style annotation regex"));

/// Result of normalising one raw diagram output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalisedDiagram {
    /// Cleaned content
    pub content: String,
    /// Whether the content matches a known diagram grammar; invalid output
    /// must be discarded by the caller
    pub valid: bool,
}

/// Strip a wrapping code fence and any prose before the first grammar keyword.
pub fn strip_code_fences(text: &str) -> String {
    let mut cleaned = text.trim();
    for opener in ["```mermaid", "```Mermaid", "```"] {
        if let Some(rest) = cleaned.strip_prefix(opener) {
            cleaned = rest.strip_prefix('\n').unwrap_or(rest);
            break;
        }
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest.strip_suffix('\n').unwrap_or(rest);
    }
    let cleaned = cleaned.trim();

    // Models sometimes answer with a sentence before the diagram. Keep
    // everything from the first grammar-keyword line onward.
    if !MERMAID_KEYWORDS.is_match(cleaned) {
        if let Some(offset) = cleaned
            .lines()
            .scan(0usize, |pos, line| {
                let start = *pos;
                *pos += line.len() + 1;
                Some((start, line))
            })
            .find(|(_, line)| MERMAID_KEYWORDS.is_match(line))
            .map(|(start, _)| start)
        {
            return cleaned[offset..].trim().to_string();
        }
    }
    cleaned.to_string()
}

/// Whether the text starts with a known mermaid grammar keyword.
pub fn is_valid_mermaid(text: &str) -> bool {
    MERMAID_KEYWORDS.is_match(text.trim())
}

/// Remove styling directives; the rendering layer owns theming.
pub fn strip_mermaid_styles(content: &str) -> String {
    content
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            if trimmed.starts_with("style ") {
                return false;
            }
            if trimmed.starts_with("classDef ") {
                return false;
            }
            if trimmed.starts_with("class ") && !trimmed.starts_with("classDiagram") {
                return false;
            }
            true
        })
        .map(|line| STYLE_CLASS_ANNOTATION.replace_all(line, "").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rewrite bare `Entity : attribute` lines into proper `Entity { ... }`
/// attribute blocks. Consecutive lines for one entity are grouped; blocks are
/// flushed in first-seen order whenever a non-attribute line appears.
/// Idempotent: repaired blocks no longer match the malformed pattern.
pub fn fix_er_diagram_attributes(content: &str) -> String {
    if !content.trim_start().starts_with("erDiagram") {
        return content.to_string();
    }

    let mut result: Vec<String> = Vec::new();
    let mut pending: Vec<(String, Vec<String>)> = Vec::new();

    let flush = |pending: &mut Vec<(String, Vec<String>)>, result: &mut Vec<String>| {
        for (entity, attrs) in pending.drain(..) {
            result.push(format!("    {} {{", entity));
            for attr in attrs {
                result.push(format!("        {}", attr));
            }
            result.push("    }".to_string());
        }
    };

    for line in content.lines() {
        let captures = ER_ATTRIBUTE_LINE.captures(line).filter(|_| !line.contains("--"));
        match captures {
            Some(caps) => {
                let entity = caps[1].to_string();
                let attr = caps[2].trim().to_string();
                match pending.iter_mut().find(|(e, _)| *e == entity) {
                    Some((_, attrs)) => attrs.push(attr),
                    None => pending.push((entity, vec![attr])),
                }
            }
            None => {
                flush(&mut pending, &mut result);
                result.push(line.to_string());
            }
        }
    }
    flush(&mut pending, &mut result);
    result.join("\n")
}

/// Normalise one raw diagram output for the given renderer.
pub fn normalise(raw: &str, renderer: DiagramRenderer) -> NormalisedDiagram {
    let stripped = strip_code_fences(raw);
    match renderer {
        DiagramRenderer::Mermaid => {
            let destyled = strip_mermaid_styles(&stripped);
            let repaired = fix_er_diagram_attributes(&destyled);
            let valid = is_valid_mermaid(&repaired);
            NormalisedDiagram {
                content: repaired,
                valid,
            }
        }
        DiagramRenderer::Html => NormalisedDiagram {
            content: stripped,
            valid: true,
        },
    }
}
