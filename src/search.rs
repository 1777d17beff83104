//! Tantivy-based full-text search index over call records.

use crate::storage::CallRecord;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, INDEXED, STORED, TEXT};
use tantivy::{doc, Index, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("index error: {0}")]
    IndexError(#[from] tantivy::TantivyError),
    #[error("query parse error: {0}")]
    QueryError(#[from] tantivy::query::QueryParserError),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

struct Fields {
    id: Field,
    transcript: Field,
    customer_intent: Field,
    call_purpose: Field,
    key_results: Field,
    summary: Field,
}

/// Tantivy-based search index for call records.
pub struct SearchIndex {
    index: Index,
    fields: Fields,
}

impl SearchIndex {
    /// Open or create a search index at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SearchError> {
        let mut schema_builder = Schema::builder();
        schema_builder.add_u64_field("id", INDEXED | STORED);
        schema_builder.add_text_field("transcript", TEXT);
        schema_builder.add_text_field("customer_intent", TEXT);
        schema_builder.add_text_field("call_purpose", TEXT);
        schema_builder.add_text_field("key_results", TEXT);
        schema_builder.add_text_field("summary", TEXT);
        let schema = schema_builder.build();

        let index_path = path.as_ref();
        std::fs::create_dir_all(index_path)?;

        let index = Index::create_in_dir(index_path, schema.clone())
            .or_else(|_| Index::open_in_dir(index_path))?;

        let fields = Fields::resolve(&index.schema())?;
        Ok(Self { index, fields })
    }

    /// Index a call record for searching
    pub fn index_record(&self, record: &CallRecord) -> Result<(), SearchError> {
        let mut index_writer: IndexWriter = self.index.writer(50_000_000)?;
        let f = &self.fields;

        // Records are immutable, but re-indexing the same id must not duplicate it
        index_writer.delete_term(Term::from_field_u64(f.id, record.id));

        let insight = &record.insight;
        index_writer.add_document(doc!(
            f.id => record.id,
            f.transcript => record.transcript.clone(),
            f.customer_intent => insight.customer_intent.clone(),
            f.call_purpose => insight.call_purpose.clone(),
            f.key_results => insight.key_results.clone(),
            f.summary => insight.summary.clone(),
        ))?;

        index_writer.commit()?;
        Ok(())
    }

    /// Search for records matching the query, best match first
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<u64>, SearchError> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        let searcher = reader.searcher();
        let f = &self.fields;

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![f.transcript, f.customer_intent, f.call_purpose, f.key_results, f.summary],
        );
        let query = query_parser.parse_query(query_str)?;

        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut results = Vec::new();
        for (_score, doc_address) in top_docs {
            let retrieved_doc = searcher.doc::<TantivyDocument>(doc_address)?;
            if let Some(id) = retrieved_doc.get_first(f.id).and_then(|v| v.as_u64()) {
                results.push(id);
            }
        }

        Ok(results)
    }
}

impl Fields {
    fn resolve(schema: &Schema) -> Result<Self, SearchError> {
        Ok(Self {
            id: schema.get_field("id")?,
            transcript: schema.get_field("transcript")?,
            customer_intent: schema.get_field("customer_intent")?,
            call_purpose: schema.get_field("call_purpose")?,
            key_results: schema.get_field("key_results")?,
            summary: schema.get_field("summary")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::{Insight, Sentiment};
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(id: u64, transcript: &str, summary: &str) -> CallRecord {
        CallRecord {
            id,
            transcript: transcript.to_string(),
            insight: Insight {
                customer_intent: "payment".into(),
                call_purpose: "Collection".into(),
                call_objective_met: false,
                key_results: "none".into(),
                customer_statements_analysis: String::new(),
                non_payment_reasons: String::new(),
                sentiment_start: Sentiment::Negative,
                sentiment_end: Sentiment::Negative,
                overall_sentiment: Sentiment::Negative,
                agent_performance_rating: 6,
                agent_performance_feedback: String::new(),
                action_required: true,
                summary: summary.to_string(),
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn finds_records_by_transcript_and_summary() {
        let dir = TempDir::new().unwrap();
        let index = SearchIndex::open(dir.path()).unwrap();

        index
            .index_record(&record(1, "customer lost their job", "job loss"))
            .unwrap();
        index
            .index_record(&record(2, "wants a settlement", "OTS negotiation"))
            .unwrap();

        assert_eq!(index.search("settlement", 10).unwrap(), vec![2]);
        assert_eq!(index.search("job", 10).unwrap(), vec![1]);
        assert!(index.search("dispute", 10).unwrap().is_empty());
    }

    #[test]
    fn reindexing_does_not_duplicate() {
        let dir = TempDir::new().unwrap();
        let index = SearchIndex::open(dir.path()).unwrap();
        let rec = record(7, "rent is due", "hardship");

        index.index_record(&rec).unwrap();
        index.index_record(&rec).unwrap();

        assert_eq!(index.search("rent", 10).unwrap(), vec![7]);
    }

    #[test]
    fn reopens_existing_index() {
        let dir = TempDir::new().unwrap();
        SearchIndex::open(dir.path())
            .unwrap()
            .index_record(&record(3, "hospital bills", "restructuring"))
            .unwrap();

        let reopened = SearchIndex::open(dir.path()).unwrap();
        assert_eq!(reopened.search("hospital", 10).unwrap(), vec![3]);
    }
}
