//! Instructional template for grounded question answering.

use crate::document::RetrievalResult;

/// Separator placed between retrieved texts in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Reply the model is told to give when the context does not support an answer.
pub const NO_ANSWER_REPLY: &str =
    "The provided documents do not contain enough information to answer this question.";

const CONTEXT_PLACEHOLDER: &str = "{context}";

const ANSWER_TEMPLATE: &str = r#"
You are a document intelligence assistant for an enterprise knowledge base.

Answer the user's question using ONLY the context between the markers below.

## Grounding
1. Use only information stated in the context.
2. Do not rely on prior knowledge and do not fill gaps with assumptions.
3. If the context is empty or does not fully support an answer, reply exactly:
   "{no_answer}"

## Accuracy
- Never invent facts, figures, names or sources.
- Do not infer beyond what the context states.
- If parts of the context contradict each other, point out the contradiction.

## Style
- Be clear, professional and concise, but complete.
- Use bullet points when they make the answer easier to follow.
- When the answer draws on several passages, combine them coherently.
- If the question is ambiguous, say what is unclear.

## Citations
Where possible, cite supporting statements as (Source: <document section>),
using document metadata when it is available.

===== CONTEXT START =====
{context}
===== CONTEXT END =====
"#;

/// Join retrieved texts, in the given order, into one context block.
pub fn build_context(results: &[RetrievalResult]) -> String {
    results.iter().map(|r| r.text.as_str()).collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}

/// Substitute `context` into the answering template.
pub fn format_system_prompt(context: &str) -> String {
    ANSWER_TEMPLATE.replace("{no_answer}", NO_ANSWER_REPLY).replacen(CONTEXT_PLACEHOLDER, context, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;

    fn result(text: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            document_id: text.to_string(),
            text: text.to_string(),
            metadata: Metadata::new(),
            score,
        }
    }

    #[test]
    fn context_joins_with_separator_in_order() {
        let context = build_context(&[result("first", 0.9), result("second", 0.5)]);
        assert_eq!(context, "first\n\n---\n\nsecond");
        assert!(build_context(&[]).is_empty());
    }

    #[test]
    fn prompt_embeds_context_once() {
        let prompt = format_system_prompt("The sky is blue.");
        assert_eq!(prompt.matches("The sky is blue.").count(), 1);
        assert!(!prompt.contains(CONTEXT_PLACEHOLDER));
        assert!(prompt.contains(NO_ANSWER_REPLY));
    }

    #[test]
    fn context_containing_braces_is_left_alone() {
        let prompt = format_system_prompt("literal {context} text");
        assert!(prompt.contains("literal {context} text"));
    }
}
