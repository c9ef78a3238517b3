use std::sync::Arc;

use super::directory::{FaqTable, UserDirectory};
use super::router::{classify, route_decision};
use super::state::{AgentState, Node, TurnTrace};
use super::templates;
use crate::config::RoutingConfig;
use crate::error::AgentError;
use crate::llm::LLMManager;
use crate::rag::RetrievalPipeline;

/// Single-turn state machine:
/// identity_check -> route -> {rag_service | test_process | handoff_service} -> END
pub struct AgentGraph {
    directory: Arc<dyn UserDirectory>,
    faq: FaqTable,
    pipeline: Arc<RetrievalPipeline>,
    llm: Arc<LLMManager>,
    config: RoutingConfig,
}

impl AgentGraph {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        faq: FaqTable,
        pipeline: Arc<RetrievalPipeline>,
        llm: Arc<LLMManager>,
        config: RoutingConfig,
    ) -> Self {
        Self {
            directory,
            faq,
            pipeline,
            llm,
            config,
        }
    }

    /// Answer one message. Failures become an apology text, never an error.
    pub async fn respond(&self, user_id: &str, message: &str) -> String {
        match self.invoke(AgentState::new(user_id, message)).await {
            Ok((state, _)) => state.final_response().to_string(),
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Turn failed");
                e.user_message().to_string()
            }
        }
    }

    /// Run the graph to completion, returning the final state and the nodes visited.
    pub async fn invoke(&self, state: AgentState) -> Result<(AgentState, TurnTrace), AgentError> {
        let mut trace = TurnTrace::default();
        let mut state = state;
        let mut node = Node::IdentityCheck;

        while node != Node::End {
            trace.record(node);
            let (next_state, next) = self.step(node, state).await?;
            state = next_state;
            node = next;
        }
        trace.record(Node::End);

        tracing::debug!(
            user_id = %state.user_id(),
            intent = %state.intent(),
            path = ?trace.visited(),
            "Turn complete"
        );
        Ok((state, trace))
    }

    async fn step(&self, node: Node, state: AgentState) -> Result<(AgentState, Node), AgentError> {
        Ok(match node {
            Node::IdentityCheck => (self.identity_check(state), Node::Route),
            Node::Route => {
                let state = self.route(state).await?;
                let next = route_decision(state.intent());
                (state, next)
            }
            Node::RagService => (self.rag_service(state).await?, Node::End),
            Node::TestProcess => (self.test_process(state).await?, Node::End),
            Node::HandoffService => (self.handoff_service(state), Node::End),
            Node::End => (state, Node::End),
        })
    }

    fn identity_check(&self, state: AgentState) -> AgentState {
        let is_internal = self
            .directory
            .lookup(state.user_id())
            .map(|user| user.role == self.config.internal_role)
            .unwrap_or(false);
        tracing::info!(user_id = %state.user_id(), is_internal, "Identity checked");
        state.with_identity(is_internal)
    }

    async fn route(&self, state: AgentState) -> Result<AgentState, AgentError> {
        let intent = classify(&self.llm, state.last_message())
            .await
            .map_err(AgentError::LanguageModel)?;
        tracing::info!(intent = %intent, "Message routed");
        Ok(state.with_intent(intent))
    }

    async fn rag_service(&self, state: AgentState) -> Result<AgentState, AgentError> {
        let query = state.last_message().to_string();

        if let Some(entry) = self.faq.find_match(&query) {
            tracing::info!(question = %entry.question, "FAQ hit");
            return Ok(state.respond(templates::faq_answer(&entry.answer)));
        }

        let docs = self.pipeline.search(&query).await?;
        let context = docs
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let answer = self
            .llm
            .generate(&templates::build_answer_prompt(&context, &query))
            .await
            .map_err(AgentError::LanguageModel)?;

        Ok(state.respond(templates::with_sources(&answer, &docs)))
    }

    async fn test_process(&self, state: AgentState) -> Result<AgentState, AgentError> {
        if !state.is_internal() {
            tracing::warn!(user_id = %state.user_id(), "Whitelist request from non-internal user refused");
            return Ok(state.respond(templates::PERMISSION_DENIED));
        }

        let sop = self
            .pipeline
            .semantic_lookup(&self.config.sop_query, 1)
            .await?;
        let excerpt = match sop.first() {
            Some(doc) => templates::excerpt(&doc.content, self.config.sop_excerpt_chars),
            None => templates::SOP_NOT_FOUND.to_string(),
        };

        let reply = templates::whitelist_submitted(state.user_id(), &self.config.internal_role, &excerpt);
        Ok(state.respond(reply))
    }

    fn handoff_service(&self, state: AgentState) -> AgentState {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let ticket = templates::handoff_ticket(state.user_id(), &timestamp, state.last_message());
        state.respond(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::directory::{FaqEntry, JsonUserDirectory};
    use crate::agent::state::Intent;
    use crate::testing::{PipelineFixture, ScriptedLlm};

    const USERS: &str = r#"{"users_table": {
        "user_001": {"role": "internal_qa"},
        "user_002": {"role": "customer", "status": "banned"}
    }}"#;

    fn faq() -> FaqTable {
        FaqTable::new(vec![FaqEntry {
            question: "什么是风控".to_string(),
            answer: "风控是风险控制的简称。".to_string(),
        }])
    }

    fn graph(fixture: &PipelineFixture) -> AgentGraph {
        AgentGraph::new(
            Arc::new(JsonUserDirectory::from_json(USERS).unwrap()),
            faq(),
            fixture.pipeline.clone(),
            fixture.llm.clone(),
            RoutingConfig::default(),
        )
    }

    fn routing_llm(label: &str) -> ScriptedLlm {
        ScriptedLlm::new("支付拦截解除流程")
            .on("路由助手", label)
            .on("参考资料", "结论：请提交解除申请。")
    }

    #[tokio::test]
    async fn internal_user_whitelist_request_is_approved() {
        let fixture = PipelineFixture::new(routing_llm("internal_test")).build();
        let graph = graph(&fixture);

        let (state, trace) = graph
            .invoke(AgentState::new("user_001", "我是测试，想申请个加白账号跑流程"))
            .await
            .unwrap();

        assert_eq!(state.intent(), Intent::InternalTest);
        assert!(state.is_internal());
        assert!(state.final_response().contains("资格校验通过"));
        assert!(state.final_response().contains("user_001"));
        assert!(state.final_response().contains("内部测试账号加白流程"));
        assert_eq!(
            trace.visited(),
            &[Node::IdentityCheck, Node::Route, Node::TestProcess, Node::End]
        );
    }

    #[tokio::test]
    async fn non_internal_user_is_refused_without_retrieval() {
        let fixture = PipelineFixture::new(routing_llm("internal_test")).build();
        let graph = graph(&fixture);
        let calls_before = fixture.embedder.calls();

        let reply = graph.respond("user_002", "借个号测试一下").await;

        assert_eq!(reply, templates::PERMISSION_DENIED);
        assert_eq!(fixture.embedder.calls(), calls_before);
    }

    #[tokio::test]
    async fn unknown_user_is_not_internal() {
        let fixture = PipelineFixture::new(routing_llm("internal_test")).build();
        let reply = graph(&fixture).respond("user_404", "加白").await;
        assert!(reply.contains("权限拒绝"));
    }

    #[tokio::test]
    async fn faq_hit_skips_pipeline() {
        let llm = routing_llm("customer_service");
        let fixture = PipelineFixture::new(llm).build();
        let graph = graph(&fixture);
        let calls_before = fixture.embedder.calls();

        let reply = graph.respond("user_003", "你好，什么是风控？").await;

        assert_eq!(reply, "【FAQ匹配】风控是风险控制的简称。");
        assert_eq!(fixture.embedder.calls(), calls_before);
        assert_eq!(fixture.scripted.prompts().len(), 1, "only the router prompt");
    }

    #[tokio::test]
    async fn customer_question_is_answered_with_sources() {
        let fixture = PipelineFixture::new(routing_llm("customer_service")).build();
        let (state, trace) = graph(&fixture)
            .invoke(AgentState::new("user_003", "我付不了款了"))
            .await
            .unwrap();

        assert!(state.final_response().starts_with("结论：请提交解除申请。"));
        assert!(state.final_response().contains("参考来源："));
        assert!(state.final_response().contains("payment.md"));
        assert!(trace.contains(Node::RagService));
        assert!(!trace.contains(Node::HandoffService));
    }

    #[tokio::test]
    async fn payment_interception_question_gets_structured_answer_prompt() {
        let fixture = PipelineFixture::new(routing_llm("customer_service")).build();
        let message = "支付提示风险拦截怎么办？";
        let (state, trace) = graph(&fixture)
            .invoke(AgentState::new("user_003", message))
            .await
            .unwrap();

        assert_eq!(state.intent(), Intent::CustomerService);
        assert!(fixture.embedder.calls() > 0);
        assert_eq!(
            trace.visited(),
            &[Node::IdentityCheck, Node::Route, Node::RagService, Node::End]
        );

        let prompts = fixture.scripted.prompts();
        let answer_prompt = prompts
            .iter()
            .find(|p| p.contains("参考资料："))
            .expect("answer prompt was sent");
        assert!(answer_prompt.contains("【结论 -> 步骤 -> 注意事项】"));
        assert!(answer_prompt.contains("建议转人工"));
        assert!(answer_prompt.contains(message));
        assert!(answer_prompt.contains("支付拦截解除流程"));

        assert!(state.final_response().starts_with("结论："));
        assert!(state.final_response().contains("payment.md"));

        let docs = fixture.pipeline.search(message).await.unwrap();
        assert!(!docs.is_empty() && docs.len() <= 3);
    }

    #[tokio::test]
    async fn off_contract_router_output_goes_to_rag() {
        let fixture = PipelineFixture::new(routing_llm("我觉得是 handoff")).build();
        let (state, trace) = graph(&fixture)
            .invoke(AgentState::new("user_003", "账号被封了"))
            .await
            .unwrap();
        assert_eq!(state.intent(), Intent::CustomerService);
        assert!(trace.contains(Node::RagService));
    }

    #[tokio::test]
    async fn handoff_request_produces_ticket() {
        let fixture = PipelineFixture::new(routing_llm("handoff")).build();
        let message = "我要投诉，马上转人工";
        let reply = graph(&fixture).respond("user_002", message).await;

        assert!(reply.contains("【转人工工单预填】"));
        assert!(reply.contains("UID: user_002"));
        assert!(reply.contains(message));
    }

    #[tokio::test]
    async fn model_failure_becomes_apology() {
        let fixture = PipelineFixture::new(ScriptedLlm::failing()).build();
        let graph = graph(&fixture);

        let err = graph
            .invoke(AgentState::new("user_003", "我付不了款了"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::LanguageModel(_)));

        let reply = graph.respond("user_003", "我付不了款了").await;
        assert_eq!(reply, err.user_message());
    }

    #[tokio::test]
    async fn retrieval_failure_becomes_apology() {
        let fixture = PipelineFixture::new(routing_llm("customer_service"))
            .with_failing_embedder()
            .build();
        let reply = graph(&fixture).respond("user_003", "我付不了款了").await;
        assert!(reply.contains("知识库检索暂时不可用"));
    }
}
