//! Answer Evaluation Module
//!
//! LLM-as-a-judge over a labelled question set:
//! - Faithfulness: does the answer stay within the retrieved material? (0-1)
//! - Accuracy: does it cover the key points of the reference answer? (0-1)
//!
//! The judge replies in free text containing a JSON object; cases whose reply
//! has no parsable scores are reported separately and left out of the means.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::sync::Arc;

use super::pipeline::RetrievalPipeline;
use super::structured_output::parse_first;
use crate::llm::LLMManager;

const JUDGE_MAX_TOKENS: usize = 512;

/// A labelled evaluation question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCase {
    pub question: String,
    pub ground_truth: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeScores {
    #[serde(deserialize_with = "lenient_score")]
    pub faithfulness_score: f64,
    #[serde(deserialize_with = "lenient_score")]
    pub accuracy_score: f64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgedCase {
    pub question: String,
    pub answer: String,
    pub scores: JudgeScores,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnparsedCase {
    pub question: String,
    pub raw_output: String,
}

#[derive(Debug, Clone)]
pub enum CaseOutcome {
    Scored(JudgedCase),
    Unparsed(UnparsedCase),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalReport {
    pub scored: Vec<JudgedCase>,
    pub unparsed: Vec<UnparsedCase>,
    pub mean_faithfulness: Option<f64>,
    pub mean_accuracy: Option<f64>,
}

impl EvalReport {
    pub fn from_outcomes(outcomes: Vec<CaseOutcome>) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            match outcome {
                CaseOutcome::Scored(case) => report.scored.push(case),
                CaseOutcome::Unparsed(case) => report.unparsed.push(case),
            }
        }
        report.mean_faithfulness = mean(report.scored.iter().map(|c| c.scores.faithfulness_score));
        report.mean_accuracy = mean(report.scored.iter().map(|c| c.scores.accuracy_score));
        report
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Accepts `0.9` as well as `"0.9"`.
fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Score {
        Number(f64),
        Text(String),
    }
    match Score::deserialize(deserializer)? {
        Score::Number(n) => Ok(n),
        Score::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

pub fn load_cases(path: &Path) -> Result<Vec<EvalCase>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read eval cases from {}", path.display()))?;
    serde_json::from_str(&content).context("Failed to parse eval cases")
}

pub fn build_answer_prompt(context: &str, question: &str) -> String {
    format!("基于以下资料回答用户问题：\n{}\n\n问题：{}", context, question)
}

pub fn build_judge_prompt(question: &str, ground_truth: &str, answer: &str, context: &str) -> String {
    format!(
        "你是一个公正的阅卷老师。请根据参考答案（Ground Truth），对考生的回答（Candidate Answer）进行打分。\n\n\
         【评分标准】\n\
         1. 忠实度 (Faithfulness): 考生回答是否与参考资料一致？没有编造信息？(0-1分)\n\
         2. 准确度 (Accuracy): 考生回答是否覆盖了参考答案的核心要点？(0-1分)\n\n\
         【输入数据】\n\
         问题: {question}\n\
         参考答案: {ground_truth}\n\
         考生回答: {answer}\n\
         检索到的资料: {context}\n\n\
         【输出格式】\n\
         请输出 JSON 格式，包含 faithfulness_score, accuracy_score, reason 三个字段。\n\
         例如: {{\"faithfulness_score\": 0.9, \"accuracy_score\": 0.8, \"reason\": \"回答准确，但缺少了关于审批时效的说明。\"}}"
    )
}

pub struct Evaluator {
    pipeline: Arc<RetrievalPipeline>,
    llm: Arc<LLMManager>,
}

impl Evaluator {
    pub fn new(pipeline: Arc<RetrievalPipeline>, llm: Arc<LLMManager>) -> Self {
        Self { pipeline, llm }
    }

    pub async fn evaluate_case(&self, case: &EvalCase) -> Result<CaseOutcome> {
        let docs = self.pipeline.search(&case.question).await?;
        let context = docs
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let answer = self
            .llm
            .generate(&build_answer_prompt(&context, &case.question))
            .await?;

        let raw = self
            .llm
            .generate_deterministic(
                &build_judge_prompt(&case.question, &case.ground_truth, &answer, &context),
                JUDGE_MAX_TOKENS,
            )
            .await?;

        Ok(match parse_first::<JudgeScores>(&raw) {
            Some(scores) => {
                tracing::info!(
                    question = %case.question,
                    faithfulness = scores.faithfulness_score,
                    accuracy = scores.accuracy_score,
                    "Case scored"
                );
                CaseOutcome::Scored(JudgedCase {
                    question: case.question.clone(),
                    answer,
                    scores,
                })
            }
            None => {
                tracing::warn!(question = %case.question, "Judge output had no parsable scores");
                CaseOutcome::Unparsed(UnparsedCase {
                    question: case.question.clone(),
                    raw_output: raw,
                })
            }
        })
    }

    /// Cases run sequentially; a model or retrieval failure aborts the run.
    pub async fn run(&self, cases: &[EvalCase]) -> Result<EvalReport> {
        let mut outcomes = Vec::with_capacity(cases.len());
        for (i, case) in cases.iter().enumerate() {
            tracing::info!(case = i + 1, total = cases.len(), question = %case.question, "Evaluating");
            outcomes.push(self.evaluate_case(case).await?);
        }
        Ok(EvalReport::from_outcomes(outcomes))
    }
}
