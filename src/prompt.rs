//! Prompt construction for answer synthesis.

use crate::models::SearchHit;

const INSTRUCTIONS: &str = "\
You're a financial assistant. Answer the QUESTION based on the CONTEXT from the FAQ database.
Use only the facts from the CONTEXT when answering the QUESTION.";

/// Render retrieved documents as `question:/answer:/context:` blocks, each
/// followed by a blank line.
pub fn format_context(hits: &[SearchHit]) -> String {
    let mut context = String::new();
    for hit in hits {
        context.push_str(&format!(
            "question: {}\nanswer: {}\ncontext: {}\n\n",
            hit.question, hit.answer, hit.context
        ));
    }
    context
}

/// Build the prompt for `query` from the retrieved `hits`.
///
/// An empty `hits` slice still yields a complete prompt whose context block
/// is empty.
pub fn build_prompt(query: &str, hits: &[SearchHit]) -> String {
    let prompt = format!(
        "{}\n\nQUESTION: {}\n\nCONTEXT: \n{}",
        INSTRUCTIONS,
        query,
        format_context(hits)
    );
    prompt.trim().to_string()
}
