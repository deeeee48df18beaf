//! Knowledge retrieval port

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::TimeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeDocKind {
    Runbook,
    Postmortem,
    Architecture,
    KnownIssue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDoc {
    pub id: String,
    pub document_id: String,
    pub title: String,
    pub content: String,
    pub doc_type: KnowledgeDocKind,
    #[serde(default)]
    pub services: Vec<String>,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub error_messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
}

impl KnowledgeRequest {
    pub fn for_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn with_services(mut self, services: Vec<String>) -> Self {
        self.services = services;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBundle {
    #[serde(default)]
    pub runbooks: Vec<KnowledgeDoc>,
    #[serde(default)]
    pub postmortems: Vec<KnowledgeDoc>,
    #[serde(default)]
    pub architecture: Vec<KnowledgeDoc>,
    #[serde(default)]
    pub known_issues: Vec<KnowledgeDoc>,
}

impl KnowledgeBundle {
    pub fn is_empty(&self) -> bool {
        self.runbooks.is_empty()
            && self.postmortems.is_empty()
            && self.architecture.is_empty()
            && self.known_issues.is_empty()
    }

    pub fn total(&self) -> usize {
        self.runbooks.len()
            + self.postmortems.len()
            + self.architecture.len()
            + self.known_issues.len()
    }

    pub fn all_docs(&self) -> impl Iterator<Item = &KnowledgeDoc> {
        self.runbooks
            .iter()
            .chain(self.postmortems.iter())
            .chain(self.architecture.iter())
            .chain(self.known_issues.iter())
    }
}

#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    async fn retrieve(&self, request: KnowledgeRequest) -> Result<KnowledgeBundle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runbook(title: &str) -> KnowledgeDoc {
        KnowledgeDoc {
            id: "k1".into(),
            document_id: "doc-1".into(),
            title: title.into(),
            content: "steps".into(),
            doc_type: KnowledgeDocKind::Runbook,
            services: vec!["redis".into()],
            score: 0.92,
            source_url: None,
        }
    }

    #[test]
    fn test_bundle_accounting() {
        let mut bundle = KnowledgeBundle::default();
        assert!(bundle.is_empty());

        bundle.runbooks.push(runbook("Redis Connection Exhaustion"));
        assert!(!bundle.is_empty());
        assert_eq!(bundle.total(), 1);
        assert_eq!(bundle.all_docs().count(), 1);
    }

    #[test]
    fn test_doc_kind_serde() {
        let json = serde_json::to_string(&KnowledgeDocKind::KnownIssue).unwrap();
        assert_eq!(json, "\"known_issue\"");
    }
}
