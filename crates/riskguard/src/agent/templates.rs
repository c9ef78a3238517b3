//! Fixed reply texts and prompt builders used by the graph nodes.

use crate::types::Document;

pub const PERMISSION_DENIED: &str =
    "⚠️ 权限拒绝：检测到您不是内部测试人员 (internal_qa)，无权申请加白。请按正常客诉流程申诉。";

pub const SOP_NOT_FOUND: &str = "未找到SOP";

pub fn faq_answer(answer: &str) -> String {
    format!("【FAQ匹配】{}", answer)
}

pub fn build_answer_prompt(context: &str, question: &str) -> String {
    format!(
        "基于以下参考资料回答用户问题。\n\
         约束：\n\
         1. 严格按照【结论 -> 步骤 -> 注意事项】的格式输出。\n\
         2. 不要编造资料中没有的信息。\n\
         3. 如果资料不足以回答，请建议转人工。\n\n\
         参考资料：\n{}\n\n\
         用户问题：{}",
        context, question
    )
}

/// Append the distinct sources of `docs`, in first-seen order.
pub fn with_sources(answer: &str, docs: &[Document]) -> String {
    let mut sources: Vec<&str> = Vec::new();
    for doc in docs {
        let source = doc.source();
        if !source.is_empty() && !sources.contains(&source) {
            sources.push(source);
        }
    }
    if sources.is_empty() {
        answer.to_string()
    } else {
        format!("{}\n\n参考来源：{}", answer.trim_end(), sources.join("、"))
    }
}

/// First `max_chars` characters, with an ellipsis when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

pub fn whitelist_submitted(user_id: &str, internal_role: &str, sop_excerpt: &str) -> String {
    format!(
        "✅ **资格校验通过**\n\
         检测到您的身份为：内部测试工程师 ({role})。\n\
         为您检索到《内部测试账号加白SOP》核心流程：\n\
         {sop}\n\n\
         🚀 **已为您自动发起申请**\n\
         - 申请UID: {uid}\n\
         - 策略范围: 防刷单拦截\n\
         - 预计生效时间: 5分钟后\n\n\
         请在测试完成后及时通知我移除白名单。",
        role = internal_role,
        sop = sop_excerpt,
        uid = user_id,
    )
}

pub fn handoff_ticket(user_id: &str, timestamp: &str, description: &str) -> String {
    format!(
        "正在为您转接人工客服...\n\
         请提供以下信息以便我们快速处理：\n\
         --------------------------------\n\
         【转人工工单预填】\n\
         UID: {}\n\
         时间: {}\n\
         问题描述: {}\n\
         --------------------------------",
        user_id, timestamp, description
    )
}
