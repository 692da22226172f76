//! Reply composition.
//!
//! [`ReplyComposer`] turns an inbound message plus retrieved templates into
//! a reply body. It renders a fixed instruction prompt, hands it to a
//! [`TextGenerator`], and then normalizes the shape of whatever comes back:
//! the reply always opens with [`ReplyStyle::opening_line`] and closes with
//! [`ReplyStyle::sign_off`], and never carries a `Subject:` line.
//!
//! Generation failures are returned as [`GenerationResult::Failed`] instead
//! of being swallowed into ordinary text, so the mailbox loop can decide not
//! to send [`SENTINEL_REPLY`] to a customer.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::TemplateRecord;

/// Placeholder body used when generation failed and the caller still wants
/// text (operator previews, or `send_on_generation_failure = true`).
pub const SENTINEL_REPLY: &str = "Error generating reply.";

/// A text-completion backend (OpenAI, Ollama, test doubles).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;
    /// Complete a fully rendered prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Outcome of one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Generated(String),
    Failed { reason: String },
}

impl GenerationResult {
    pub fn is_generated(&self) -> bool {
        matches!(self, GenerationResult::Generated(_))
    }

    /// The generated body, or [`SENTINEL_REPLY`] on failure.
    pub fn body_or_sentinel(&self) -> &str {
        match self {
            GenerationResult::Generated(body) => body,
            GenerationResult::Failed { .. } => SENTINEL_REPLY,
        }
    }
}

/// House style every reply must follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyStyle {
    pub company: String,
    pub opening_line: String,
    pub sign_off: String,
}

impl Default for ReplyStyle {
    fn default() -> Self {
        Self {
            company: "Qoneqt".to_string(),
            opening_line: "Dear User,".to_string(),
            sign_off: "Thanks,\nQoneqt Support Team".to_string(),
        }
    }
}

/// Builds prompts and post-processes generated replies.
#[derive(Clone)]
pub struct ReplyComposer {
    generator: Arc<dyn TextGenerator>,
    style: ReplyStyle,
}

impl ReplyComposer {
    pub fn new(generator: Arc<dyn TextGenerator>, style: ReplyStyle) -> Self {
        Self { generator, style }
    }

    pub fn style(&self) -> &ReplyStyle {
        &self.style
    }

    pub fn generator_model(&self) -> &str {
        self.generator.model_name()
    }

    /// Compose a reply body for `user_message` from the retrieved context.
    pub async fn compose(
        &self,
        user_message: &str,
        context: &[TemplateRecord],
    ) -> GenerationResult {
        let prompt = build_prompt(&self.style, user_message, &format_context(context));
        match self.generator.complete(&prompt).await {
            Ok(text) if text.trim().is_empty() => GenerationResult::Failed {
                reason: "generator returned an empty completion".to_string(),
            },
            Ok(text) => GenerationResult::Generated(enforce_shape(&text, &self.style)),
            Err(e) => GenerationResult::Failed {
                reason: format!("{:#}", e),
            },
        }
    }
}

/// Render retrieved records as a bullet list of their composite text.
pub fn format_context(context: &[TemplateRecord]) -> String {
    context
        .iter()
        .map(|record| format!("- {}", record.composite_text()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the fixed instruction prompt with both variable slots filled.
pub fn build_prompt(style: &ReplyStyle, user_message: &str, context: &str) -> String {
    let sign_off = style
        .sign_off
        .lines()
        .map(|line| format!("   {}", line.trim()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"You are a support agent for '{company}'.
Match the company's email style exactly.

INSTRUCTIONS:
1. Start exactly with: "{opening}"
2. First line: write one polite empathy sentence that acknowledges the user's specific issue.
   (e.g. "We understand you are facing a delay...", "We apologize for the inconvenience...")
3. Body: answer using ONLY the POLICY RULES below. Do not add facts, numbers or promises that are not in them.
4. Sign off exactly with:
{sign_off}
5. Do NOT include a subject line.
6. Separate paragraphs with blank lines.

---
USER EMAIL:
{user_message}

POLICY RULES:
{context}
---

Write the email body:
"#,
        company = style.company,
        opening = style.opening_line.trim(),
        sign_off = sign_off,
        user_message = user_message.trim(),
        context = context,
    )
}

/// Force a generated reply into the house shape.
///
/// Drops leading `Subject:` lines, replaces whatever greeting the model used
/// (alone on its line or followed by text) with the opening line, and
/// replaces a trailing signature block with the exact sign-off. Paragraph
/// breaks in the body are kept.
pub fn enforce_shape(text: &str, style: &ReplyStyle) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut lines: Vec<String> = normalized.trim().lines().map(str::to_string).collect();

    while let Some(first) = lines.first() {
        let trimmed = first.trim();
        if trimmed.is_empty() || trimmed.to_lowercase().starts_with("subject:") {
            lines.remove(0);
        } else {
            break;
        }
    }

    if let Some(first) = lines.first_mut() {
        if let Some(rest) = strip_greeting(first, &style.opening_line).map(capitalize_first) {
            *first = rest;
        }
    }

    let sign_lines: Vec<&str> = style
        .sign_off
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    // Only the tail can hold a signature, not a "Thanks," mid-body.
    let window_start = lines.len().saturating_sub(sign_lines.len() + 2);
    if let Some(pos) =
        (window_start..lines.len()).find(|&i| is_signature_line(&lines[i], &sign_lines))
    {
        lines.truncate(pos);
    }

    let body = lines.join("\n");
    let body = body.trim();

    let mut out = String::with_capacity(body.len() + 64);
    out.push_str(style.opening_line.trim());
    out.push_str("\n\n");
    if !body.is_empty() {
        out.push_str(body);
        out.push_str("\n\n");
    }
    out.push_str(&sign_lines.join("\n"));
    out
}

const GREETING_WORDS: [&str; 5] = ["dear", "hi", "hello", "hey", "greetings"];

const CLOSING_PHRASES: [&str; 12] = [
    "thanks",
    "thank you",
    "many thanks",
    "regards",
    "best",
    "best regards",
    "kind regards",
    "warm regards",
    "with regards",
    "sincerely",
    "yours sincerely",
    "cheers",
];

/// If `line` opens with a greeting, return what follows it on the line.
fn strip_greeting<'a>(line: &'a str, opening_line: &str) -> Option<&'a str> {
    let trimmed = line.trim();

    let opening = opening_line
        .trim()
        .trim_end_matches(|c: char| matches!(c, ',' | '!' | ':'));
    if !opening.is_empty() {
        if let Some(prefix) = trimmed.get(..opening.len()) {
            let after = &trimmed[opening.len()..];
            let boundary = after
                .chars()
                .next()
                .map_or(true, |c| matches!(c, ',' | '!' | ':') || c.is_whitespace());
            if prefix.eq_ignore_ascii_case(opening) && boundary {
                return Some(
                    after
                        .trim_start_matches(|c: char| matches!(c, ',' | '!' | ':'))
                        .trim_start(),
                );
            }
        }
    }

    let first_word = trimmed
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '!'))
        .next()
        .unwrap_or_default()
        .to_lowercase();
    if !GREETING_WORDS.contains(&first_word.as_str()) {
        return None;
    }
    match trimmed.find([',', '!']) {
        Some(idx) if trimmed[..idx].split_whitespace().count() <= 4 => {
            Some(trimmed[idx + 1..].trim_start())
        }
        None if trimmed.split_whitespace().count() <= 4 => Some(""),
        _ => None,
    }
}

/// A sign-off line, the signature name, or a short closing phrase
/// (`Regards,`, `Thanks, Qoneqt Support Team`, `Best`).
fn is_signature_line(line: &str, sign_lines: &[&str]) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_lowercase();

    if sign_lines.iter().any(|s| s.to_lowercase() == lower) {
        return true;
    }

    if let Some(name) = sign_lines.last() {
        let name = name.to_lowercase();
        let name_words = name.split_whitespace().count();
        if lower.contains(&name) && lower.split_whitespace().count() <= name_words + 3 {
            return true;
        }
    }

    let bare = lower.trim_end_matches(|c: char| matches!(c, ',' | '.' | '!'));
    let is_closing = CLOSING_PHRASES
        .iter()
        .any(|c| bare == *c || bare.starts_with(&format!("{} ", c)));
    is_closing && (trimmed.ends_with(',') || bare.split_whitespace().count() <= 3)
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
