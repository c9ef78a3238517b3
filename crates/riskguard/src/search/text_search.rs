use std::cmp::Ordering;
use std::collections::HashSet;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{self, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value as TantivyValue, STORED};
use tantivy::tokenizer::{LowerCaser, NgramTokenizer, TextAnalyzer, TokenStream};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use thiserror::Error;

use crate::types::{Document, RankedResult, RetrieverKind};

/// Character uni+bigrams: CJK text has no whitespace word boundaries.
const NGRAM_TOKENIZER: &str = "cjk_ngram";

#[derive(Debug, Error)]
pub enum LexicalIndexError {
    #[error("cannot build a lexical index from an empty corpus")]
    EmptyCorpus,

    #[error("tantivy: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
}

/// BM25 over an in-RAM Tantivy index built once from the corpus snapshot.
pub struct LexicalRetriever {
    index: Index,
    reader: IndexReader,
    text_field: schema::Field,
    ordinal_field: schema::Field,
    /// Ingestion ordinal -> document id
    ids: Vec<String>,
}

impl LexicalRetriever {
    fn build_schema() -> (Schema, schema::Field, schema::Field) {
        let mut sb = Schema::builder();
        let text_options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(NGRAM_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqs),
        );
        let text_field = sb.add_text_field("text", text_options);
        let ordinal_field = sb.add_u64_field("ordinal", STORED);
        (sb.build(), text_field, ordinal_field)
    }

    pub fn build(documents: &[Document]) -> Result<Self, LexicalIndexError> {
        if documents.is_empty() {
            return Err(LexicalIndexError::EmptyCorpus);
        }

        let (schema, text_field, ordinal_field) = Self::build_schema();
        let index = Index::create_in_ram(schema);
        let analyzer = TextAnalyzer::builder(NgramTokenizer::new(1, 2, false)?)
            .filter(LowerCaser)
            .build();
        index.tokenizers().register(NGRAM_TOKENIZER, analyzer);

        let mut writer: IndexWriter = index.writer_with_num_threads(1, 50_000_000)?;
        for (ordinal, document) in documents.iter().enumerate() {
            writer.add_document(doc!(
                text_field => document.content.as_str(),
                ordinal_field => ordinal as u64,
            ))?;
        }
        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        tracing::debug!(documents = documents.len(), "Built lexical index");

        Ok(Self {
            index,
            reader,
            text_field,
            ordinal_field,
            ids: documents.iter().map(|d| d.id.clone()).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Distinct n-gram terms of the query that carry a letter or digit.
    fn query_terms(&self, query: &str) -> Result<Vec<Term>, LexicalIndexError> {
        let mut analyzer = self.index.tokenizer_for_field(self.text_field)?;
        let mut stream = analyzer.token_stream(query);
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        while stream.advance() {
            let text = &stream.token().text;
            if !text.chars().any(char::is_alphanumeric) {
                continue;
            }
            if seen.insert(text.clone()) {
                terms.push(Term::from_field_text(self.text_field, text));
            }
        }
        Ok(terms)
    }

    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RankedResult>, LexicalIndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let terms = self.query_terms(query)?;
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .into_iter()
            .map(|term| {
                let q: Box<dyn Query> = Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, q)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        // Collect every match so the ordinal tie-break is exact at the cut-off.
        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(self.ids.len()))?;

        let mut scored: Vec<(usize, f32)> = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let stored: TantivyDocument = searcher.doc(address)?;
            if let Some(ordinal) = stored
                .get_first(self.ordinal_field)
                .and_then(|v| v.as_u64())
            {
                scored.push((ordinal as usize, score));
            }
        }
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        let hits = scored
            .into_iter()
            .filter_map(|(ordinal, score)| self.ids.get(ordinal).map(|id| (id.clone(), score)))
            .collect();
        Ok(RankedResult::from_ordered(hits, RetrieverKind::Lexical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("pay", "支付拦截解除流程：提交身份证明后人工审核。", "payment.md"),
            Document::new("whitelist", "内部测试账号加白申请需要主管审批。", "whitelist.md"),
            Document::new("login", "Login anomaly: reset password via app.", "login.md"),
        ]
    }

    #[test]
    fn empty_corpus_is_rejected() {
        assert!(matches!(
            LexicalRetriever::build(&[]),
            Err(LexicalIndexError::EmptyCorpus)
        ));
    }

    #[test]
    fn partial_chinese_terms_match() {
        let retriever = LexicalRetriever::build(&corpus()).unwrap();
        let results = retriever.retrieve("支付被拦截了", 10).unwrap();
        assert_eq!(results[0].id, "pay");
        assert_eq!(results[0].rank, 1);
        assert!(results.iter().all(|r| r.retriever == RetrieverKind::Lexical));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let retriever = LexicalRetriever::build(&corpus()).unwrap();
        let results = retriever.retrieve("LOGIN", 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "login");
    }

    #[test]
    fn respects_k_and_ties_follow_ingestion_order() {
        let docs = vec![
            Document::new("b", "风控规则", "a.md"),
            Document::new("a", "风控规则", "a.md"),
            Document::new("c", "风控规则", "a.md"),
        ];
        let retriever = LexicalRetriever::build(&docs).unwrap();
        let results = retriever.retrieve("风控", 2).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn repeated_queries_are_identical() {
        let retriever = LexicalRetriever::build(&corpus()).unwrap();
        let first = retriever.retrieve("账号 加白", 10).unwrap();
        let second = retriever.retrieve("账号 加白", 10).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn punctuation_only_query_matches_nothing() {
        let retriever = LexicalRetriever::build(&corpus()).unwrap();
        assert!(retriever.retrieve("？！。", 10).unwrap().is_empty());
    }
}
