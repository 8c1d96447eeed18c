use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::error::{LoadError, SourceError};
use crate::models::{
    DimensionScoreRow, EvolutionPoint, IndicatorDefinition, ObservationHeader, RawRecords,
    ResponseRow, TeacherRow,
};

/// Read-only access to the external observation store.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch_teachers(&self) -> Result<Vec<TeacherRow>, SourceError>;

    async fn fetch_headers(&self) -> Result<Vec<ObservationHeader>, SourceError>;

    async fn fetch_dimension_scores(&self) -> Result<Vec<DimensionScoreRow>, SourceError>;

    async fn fetch_indicators(&self) -> Result<Vec<IndicatorDefinition>, SourceError>;

    async fn fetch_responses(&self) -> Result<Vec<ResponseRow>, SourceError>;

    async fn fetch_evolution(&self) -> Result<Vec<EvolutionPoint>, SourceError>;

    /// Timestamp of the most recent response, or `None` when there are no responses.
    async fn latest_response_at(&self) -> Result<Option<DateTime<Utc>>, SourceError>;
}

/// Runs all six fetches concurrently and waits for every one of them.
///
/// Any failure aborts the cycle; the error carries all failures, not just the first.
pub async fn fetch_all(source: &dyn ObservationSource) -> Result<RawRecords, LoadError> {
    let (teachers, headers, dimension_scores, indicators, responses, evolution) = tokio::join!(
        source.fetch_teachers(),
        source.fetch_headers(),
        source.fetch_dimension_scores(),
        source.fetch_indicators(),
        source.fetch_responses(),
        source.fetch_evolution(),
    );

    let mut failures = Vec::new();
    let teachers = collect(teachers, &mut failures);
    let headers = collect(headers, &mut failures);
    let dimension_scores = collect(dimension_scores, &mut failures);
    let indicators = collect(indicators, &mut failures);
    let responses = collect(responses, &mut failures);
    let evolution = collect(evolution, &mut failures);

    if !failures.is_empty() {
        for failure in &failures {
            error!(relation = failure.relation(), error = %failure, "fetch failed");
        }
        return Err(LoadError { failures });
    }

    let records = RawRecords {
        teachers,
        headers,
        dimension_scores,
        indicators,
        responses,
        evolution,
    };
    debug!(
        teachers = records.teachers.len(),
        observations = records.headers.len(),
        responses = records.responses.len(),
        "fetched raw records"
    );
    Ok(records)
}

fn collect<T>(result: Result<Vec<T>, SourceError>, failures: &mut Vec<SourceError>) -> Vec<T> {
    match result {
        Ok(rows) => rows,
        Err(err) => {
            failures.push(err);
            Vec::new()
        }
    }
}
