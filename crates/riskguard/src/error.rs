use thiserror::Error;

/// Failures that abort a turn. The agent converts them into an apology text at
/// the `respond` boundary; callers that need the cause use `invoke` directly.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("language model call failed: {0:#}")]
    LanguageModel(anyhow::Error),

    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("vector index query failed: {0:#}")]
    VectorIndex(anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AgentError {
    /// Text shown to the end user in place of an answer.
    pub fn user_message(&self) -> &'static str {
        match self {
            AgentError::LanguageModel(_) => {
                "抱歉，智能客服暂时无法生成回复，请稍后再试，或输入“转人工”联系人工客服。"
            }
            AgentError::Embedding(_) | AgentError::VectorIndex(_) => {
                "抱歉，知识库检索暂时不可用，请稍后再试，或输入“转人工”联系人工客服。"
            }
            AgentError::Config(_) => "抱歉，客服系统配置异常，请联系管理员。",
        }
    }
}
