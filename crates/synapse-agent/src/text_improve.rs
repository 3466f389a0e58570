//! The synthesis worker's prose-rephrasing hook.
//!
//! `original_source`'s synthesis agent calls this the "MCP Sampling" step:
//! a request for AI-assisted rewriting that, absent a real model, falls
//! back to a fixed substitution table (`_simulate_text_improvement`). This
//! module keeps the same shape — an interface plus one deterministic
//! implementation — rather than wiring in an actual LLM call.

/// Rephrases a single sentence. Implementations may return the sentence
/// unchanged; the synthesis worker treats this as an extension point, not
/// a guarantee of improvement.
pub trait TextImprover: Send + Sync {
    fn improve(&self, sentence: &str) -> String;
}

/// Fixed substitution table, applied in declaration order.
pub struct LexicalImprover {
    replacements: Vec<(&'static str, &'static str)>,
}

impl Default for LexicalImprover {
    fn default() -> Self {
        Self {
            replacements: vec![
                ("very good", "excellent"),
                ("very bad", "problematic"),
                ("a lot of", "numerous"),
                ("thing", "element"),
                ("stuff", "content"),
                ("get", "obtain"),
                ("make", "create"),
                ("big", "substantial"),
                ("small", "minimal"),
            ],
        }
    }
}

impl TextImprover for LexicalImprover {
    fn improve(&self, sentence: &str) -> String {
        let mut improved = sentence.to_string();
        for (old, new) in &self.replacements {
            improved = improved.replace(old, new);
        }
        improved
    }
}

/// Splits `text` on `". "` and runs each sentence longer than 50
/// characters through `improver`, leaving short sentences untouched.
pub fn improve_text(text: &str, improver: &dyn TextImprover) -> String {
    text.split(". ")
        .map(|sentence| {
            let sentence = sentence.trim();
            if sentence.len() > 50 {
                improver.improve(sentence)
            } else {
                sentence.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(". ")
}
