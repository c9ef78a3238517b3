//! Query Rewriting Module
//!
//! Turns colloquial customer phrasing into risk-control terminology before
//! retrieval. Rewriting only improves recall, so any model failure falls back
//! to the original query.

use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::llm::LLMManager;

const REWRITE_MAX_TOKENS: usize = 128;

/// Echoed output labels such as `输出:` or `Output：` at the start of a reply.
static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:输出|output|改写后(?:的查询)?(?:语句)?)\s*[:：]\s*")
        .expect("rewrite label regex is valid")
});

pub fn build_rewrite_prompt(query: &str) -> String {
    format!(
        "你是一个风控搜索专家。请将用户的口语化问题改写为更精准的术语查询语句。\n\n\
         示例:\n\
         输入: \"我付不了款了\" -> 输出: 支付拦截解除流程\n\
         输入: \"借个号测试\" -> 输出: 内部测试账号加白申请\n\n\
         用户输入: {}\n\
         仅输出改写后的查询语句，不要包含其他文字。",
        query
    )
}

/// Strip echoed labels and quotes; `None` when nothing usable remains.
///
/// The rewrite is a single query line. A label alone on its own line is
/// skipped; any commentary after the query line is dropped.
pub fn clean_rewrite(raw: &str) -> Option<String> {
    let mut lines = raw.lines();
    let kept = lines.by_ref().map(clean_line).find(|line| !line.is_empty())?;

    let dropped = lines.filter(|l| !l.trim().is_empty()).count();
    if dropped > 0 {
        tracing::debug!(kept = %kept, dropped, "Rewrite had extra lines, keeping the first query line");
    }
    Some(kept)
}

fn clean_line(line: &str) -> String {
    let unlabeled = LABEL_RE.replace(line.trim(), "");
    unlabeled
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '“' | '”' | '「' | '」'))
        .trim()
        .to_string()
}

pub struct QueryRewriter {
    llm: Option<Arc<LLMManager>>,
}

impl QueryRewriter {
    pub fn new(llm: Arc<LLMManager>) -> Self {
        Self { llm: Some(llm) }
    }

    /// Pass queries through unchanged.
    pub fn disabled() -> Self {
        Self { llm: None }
    }

    pub async fn rewrite(&self, query: &str) -> String {
        let Some(llm) = &self.llm else {
            return query.to_string();
        };

        match llm
            .generate_custom(&build_rewrite_prompt(query), REWRITE_MAX_TOKENS)
            .await
        {
            Ok(raw) => match clean_rewrite(&raw) {
                Some(rewritten) => {
                    tracing::info!(original = %query, rewritten = %rewritten, "Query rewritten");
                    rewritten
                }
                None => {
                    tracing::warn!(original = %query, "Rewrite came back empty, using original query");
                    query.to_string()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, original = %query, "Query rewrite failed, using original query");
                query.to_string()
            }
        }
    }
}
