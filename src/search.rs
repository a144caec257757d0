//! `finqa search` and `finqa ask` command handlers.

use anyhow::Result;

use crate::config::Config;
use crate::elastic::ElasticIndex;
use crate::index::SearchIndex;
use crate::llm::create_chat_model;
use crate::models::SearchHit;
use crate::rag::Rag;

/// Print the ranked hits for `query` without calling the model.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let index = ElasticIndex::for_query(&config.search)?;
    let hits = index
        .search(query, limit.unwrap_or(config.search.size))
        .await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print!("{}", format_hits(&hits));
    Ok(())
}

/// Answer `query` once and print the reply.
pub async fn run_ask(config: &Config, query: &str) -> Result<()> {
    let index = ElasticIndex::for_query(&config.search)?;
    let model = create_chat_model(&config.llm)?;

    let answer = Rag::new(&index, model.as_ref(), config.search.size)
        .answer(query)
        .await?;
    println!("{}", answer.answer);
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

fn format_hits(hits: &[SearchHit]) -> String {
    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!("{}. [{:.2}] {}\n", i + 1, hit.score, hit.question));
        out.push_str(&format!("    answer: {}\n", hit.answer));
        out.push_str(&format!("    context: \"{}\"\n", excerpt(&hit.context, 160)));
        out.push_str(&format!("    id: {}\n\n", hit.id));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_ranked_hits() {
        let hits = vec![SearchHit {
            id: 3,
            score: 7.123,
            question: "what area did nvidia initially focus on".into(),
            answer: "pc graphics".into(),
            context: "since our original focus on pc graphics".into(),
        }];
        let out = format_hits(&hits);
        assert!(out.starts_with("1. [7.12] what area did nvidia"));
        assert!(out.contains("    answer: pc graphics\n"));
        assert!(out.contains("    id: 3\n"));
    }

    #[test]
    fn long_context_is_cut() {
        let long = "word ".repeat(100);
        let cut = excerpt(&long, 20);
        assert!(cut.ends_with("..."));
        assert!(cut.chars().count() <= 23);
        assert_eq!(excerpt("short", 20), "short");
    }
}
