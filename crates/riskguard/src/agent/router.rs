//! LLM-Based Intent Router
//!
//! One greedy model call classifies the latest message. The model must answer
//! with a bare label; anything else routes to customer service.

use anyhow::Result;

use super::state::{Intent, Node};
use crate::llm::LLMManager;

const ROUTER_MAX_TOKENS: usize = 16;

pub fn build_router_prompt(message: &str) -> String {
    format!(
        "你是一个风控系统的路由助手。请分析用户的输入，将其归类为以下三种意图之一：\n\
         1. \"internal_test\": 用户暗示是内部测试人员，想申请加白、跑流程、借号测试、环境联调等。关键词：测试、加白、跑流程、环境、联调、借号。\n\
         2. \"handoff\": 涉及转人工、投诉、极其紧急的个案、或用户明确要求转人工。\n\
         3. \"customer_service\": 普通客诉问题，如支付拦截、账号被封、解封咨询、名词解释。\n\n\
         用户输入: {}\n\n\
         请仅输出分类结果（不要输出其他文字）：internal_test 或 handoff 或 customer_service",
        message
    )
}

/// Exact label match after trimming whitespace and quote characters.
pub fn parse_intent(raw: &str) -> Intent {
    let label = raw
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '“' | '”') || c.is_whitespace());
    match label {
        "internal_test" => Intent::InternalTest,
        "handoff" => Intent::Handoff,
        "customer_service" => Intent::CustomerService,
        other => {
            tracing::debug!(output = %other, "Router output is not a known label, defaulting to customer_service");
            Intent::CustomerService
        }
    }
}

/// Classify `message`. Model errors propagate; off-contract output does not.
pub async fn classify(llm: &LLMManager, message: &str) -> Result<Intent> {
    let raw = llm
        .generate_deterministic(&build_router_prompt(message), ROUTER_MAX_TOKENS)
        .await?;
    Ok(parse_intent(&raw))
}

/// Conditional edge out of the router.
pub fn route_decision(intent: Intent) -> Node {
    match intent {
        Intent::InternalTest => Node::TestProcess,
        Intent::Handoff => Node::HandoffService,
        Intent::CustomerService | Intent::Unset => Node::RagService,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LLMConfig;
    use crate::testing::ScriptedLlm;
    use std::sync::Arc;

    #[test]
    fn test_exact_labels() {
        assert_eq!(parse_intent("internal_test"), Intent::InternalTest);
        assert_eq!(parse_intent("  handoff\n"), Intent::Handoff);
        assert_eq!(parse_intent("\"customer_service\""), Intent::CustomerService);
        assert_eq!(parse_intent("`internal_test`"), Intent::InternalTest);
    }

    #[test]
    fn test_off_contract_output_defaults() {
        for raw in ["", "Internal_Test", "分类结果: handoff", "internal_test。", "refund"] {
            assert_eq!(parse_intent(raw), Intent::CustomerService, "raw = {:?}", raw);
        }
    }

    #[test]
    fn test_route_decision_is_total() {
        assert_eq!(route_decision(Intent::InternalTest), Node::TestProcess);
        assert_eq!(route_decision(Intent::Handoff), Node::HandoffService);
        assert_eq!(route_decision(Intent::CustomerService), Node::RagService);
        assert_eq!(route_decision(Intent::Unset), Node::RagService);
    }

    #[tokio::test]
    async fn test_classify_uses_greedy_decoding() {
        let llm = Arc::new(ScriptedLlm::new("handoff"));
        let manager = LLMManager::new(LLMConfig::default(), llm.clone());
        let intent = classify(&manager, "我要投诉，转人工").await.unwrap();
        assert_eq!(intent, Intent::Handoff);
        assert_eq!(llm.temperatures(), vec![0.0]);
        assert!(llm.prompts()[0].contains("我要投诉，转人工"));
    }
}
