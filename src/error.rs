use thiserror::Error;

/// A single query against the observation store failed.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("query on {relation} failed: {source}")]
    Query {
        relation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("{relation} unavailable: {reason}")]
    Unavailable {
        relation: &'static str,
        reason: String,
    },
}

impl SourceError {
    pub fn relation(&self) -> &'static str {
        match self {
            SourceError::Query { relation, .. } | SourceError::Unavailable { relation, .. } => {
                relation
            }
        }
    }
}

/// A load cycle was aborted. Every fetch ran to completion first; all failures are kept.
#[derive(Debug, Error)]
#[error("load aborted, {} source(s) failed: {}", .failures.len(), failed_relations(.failures))]
pub struct LoadError {
    pub failures: Vec<SourceError>,
}

fn failed_relations(failures: &[SourceError]) -> String {
    failures
        .iter()
        .map(SourceError::relation)
        .collect::<Vec<_>>()
        .join(", ")
}
