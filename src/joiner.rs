//! Joins the raw relations into `Observation`s.
//!
//! Missing references never fail the load. Defaults applied here, and nowhere else:
//! - teacher name: [`UNKNOWN_TEACHER`] when the teacher id is absent, unknown or named blank
//! - indicator label: [`UNKNOWN_INDICATOR`] when the indicator id is absent, unknown or
//!   labelled blank
//! - indicator dimension: `None` when unresolved or outside the three known dimensions
//! - indicator value: raw value times 100, `None` when the store had no value (read as 0 by
//!   aggregation and KPIs)
//! - dimension score: 0 when the observation has no row for that dimension
//! - total percentage: 0; subject, course and observer: empty string

use std::collections::HashMap;

use tracing::debug;

use crate::models::{
    Dimension, DimensionScoreRow, DimensionScores, IndicatorItem, Observation, RawRecords,
    ResponseRow,
};

pub const UNKNOWN_TEACHER: &str = "Docente N/A";
pub const UNKNOWN_INDICATOR: &str = "Indicador";

pub fn join_records(records: &RawRecords) -> Vec<Observation> {
    let teacher_names: HashMap<&str, &str> = records
        .teachers
        .iter()
        .filter_map(|teacher| Some((teacher.id.as_str(), non_blank(teacher.name.as_deref())?)))
        .collect();

    let indicators: HashMap<&str, (Option<&str>, Option<Dimension>)> = records
        .indicators
        .iter()
        .map(|indicator| {
            (
                indicator.id.as_str(),
                (
                    non_blank(indicator.label.as_deref()),
                    indicator.dimension_id.and_then(Dimension::from_id),
                ),
            )
        })
        .collect();

    let mut scores_by_observation: HashMap<&str, Vec<&DimensionScoreRow>> = HashMap::new();
    for score in &records.dimension_scores {
        scores_by_observation
            .entry(score.observation_id.as_str())
            .or_default()
            .push(score);
    }

    let mut responses_by_observation: HashMap<&str, Vec<&ResponseRow>> = HashMap::new();
    for response in &records.responses {
        responses_by_observation
            .entry(response.observation_id.as_str())
            .or_default()
            .push(response);
    }

    let mut missing_teachers = 0usize;
    let mut missing_indicators = 0usize;
    let mut observations = Vec::with_capacity(records.headers.len());

    for header in &records.headers {
        let key = header.observation_id.as_str();

        let teacher_name = match header
            .teacher_id
            .as_deref()
            .and_then(|id| teacher_names.get(id))
        {
            Some(name) => name.to_string(),
            None => {
                missing_teachers += 1;
                UNKNOWN_TEACHER.to_string()
            }
        };

        let scores = scores_by_observation
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let indicator_items = responses_by_observation
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|response| {
                let resolved = response
                    .indicator_id
                    .as_deref()
                    .and_then(|id| indicators.get(id));
                let (label, dimension) = match resolved {
                    Some((label, dimension)) => (*label, *dimension),
                    None => {
                        missing_indicators += 1;
                        (None, None)
                    }
                };

                IndicatorItem {
                    label: label.unwrap_or(UNKNOWN_INDICATOR).to_string(),
                    value: response.value.map(|value| value * 100.0),
                    dimension,
                }
            })
            .collect();

        observations.push(Observation {
            observation_id: header.observation_id.clone(),
            teacher_id: header.teacher_id.clone(),
            teacher_name,
            subject: header.subject.clone().unwrap_or_default(),
            course: header.course.clone().unwrap_or_default(),
            date: header.date,
            observer_name: header.observer_name.clone().unwrap_or_default(),
            total_percentage: header.total_percentage.unwrap_or(0.0),
            dimension_scores: DimensionScores {
                ambiente: dimension_score(scores, Dimension::Ambiente),
                interaccion: dimension_score(scores, Dimension::Interaccion),
                organizacion: dimension_score(scores, Dimension::Organizacion),
            },
            indicator_items,
        });
    }

    if missing_teachers > 0 || missing_indicators > 0 {
        debug!(
            missing_teachers,
            missing_indicators, "substituted defaults for unresolved references"
        );
    }

    observations
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

/// First matching row wins; a missing or empty percentage counts as 0.
fn dimension_score(scores: &[&DimensionScoreRow], dimension: Dimension) -> f64 {
    scores
        .iter()
        .find(|score| {
            score
                .dimension_code
                .as_deref()
                .and_then(Dimension::from_code)
                == Some(dimension)
        })
        .and_then(|score| score.percentage)
        .unwrap_or(0.0)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn sample() -> RawRecords {
        RawRecords {
            teachers: vec![teacher("t1", "Avery Lee")],
            headers: vec![
                header("o1", "t1", 72.5, (2026, 3, 2)),
                header("o2", "t9", 64.0, (2026, 3, 9)),
            ],
            dimension_scores: vec![
                score("o1", "AMBIENTE", 80.0),
                score("o1", "INTERACCION", 70.0),
                score("o2", "ORGANIZACION", 55.0),
            ],
            indicators: vec![
                indicator("i1", "Clima de respeto", 1),
                indicator("i2", "Preguntas abiertas", 2),
            ],
            responses: vec![
                response("o1", "i2", 0.5),
                response("o1", "i1", 1.0),
                response("o1", "i404", 0.25),
                response("o2", "i1", 0.75),
            ],
            evolution: Vec::new(),
        }
    }

    #[test]
    fn joins_scores_and_responses_per_observation() {
        let observations = join_records(&sample());
        assert_eq!(observations.len(), 2);

        let first = &observations[0];
        assert_eq!(first.teacher_name, "Avery Lee");
        assert_eq!(first.dimension_scores.ambiente, 80.0);
        assert_eq!(first.dimension_scores.interaccion, 70.0);
        assert_eq!(first.dimension_scores.organizacion, 0.0);

        let labels: Vec<_> = first.indicator_items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["Preguntas abiertas", "Clima de respeto", UNKNOWN_INDICATOR]);
        assert_eq!(first.indicator_items[0].value, Some(50.0));
        assert_eq!(first.indicator_items[1].dimension, Some(Dimension::Ambiente));
        assert_eq!(first.indicator_items[2].dimension, None);
    }

    #[test]
    fn unknown_teacher_gets_placeholder_name() {
        let observations = join_records(&sample());
        assert_eq!(observations[1].observation_id, "o2");
        assert_eq!(observations[1].teacher_name, UNKNOWN_TEACHER);
        assert_eq!(observations[1].dimension_scores.organizacion, 55.0);
    }

    #[test]
    fn empty_reference_sets_degrade_to_defaults() {
        let mut records = sample();
        records.teachers.clear();
        records.dimension_scores.clear();
        records.indicators.clear();

        let observations = join_records(&records);
        assert_eq!(observations.len(), 2);
        assert!(observations.iter().all(|o| o.teacher_name == UNKNOWN_TEACHER));
        assert_eq!(observations[0].dimension_scores, DimensionScores::default());
        assert!(observations[0]
            .indicator_items
            .iter()
            .all(|item| item.label == UNKNOWN_INDICATOR && item.dimension.is_none()));
    }

    #[test]
    fn missing_values_stay_missing() {
        let mut records = sample();
        records.responses[0].value = None;
        records.headers[0].total_percentage = None;
        records.headers[0].subject = None;

        let observations = join_records(&records);
        assert_eq!(observations[0].indicator_items[0].value, None);
        assert_eq!(observations[0].total_percentage, 0.0);
        assert_eq!(observations[0].subject, "");
    }

    #[test]
    fn blank_names_and_labels_get_placeholders() {
        let mut records = sample();
        records.teachers[0].name = Some("  ".to_string());
        records.indicators[0].label = Some(String::new());

        let observations = join_records(&records);
        assert_eq!(observations[0].teacher_name, UNKNOWN_TEACHER);
        let blank = &observations[0].indicator_items[1];
        assert_eq!(blank.label, UNKNOWN_INDICATOR);
        assert_eq!(blank.dimension, Some(Dimension::Ambiente));
    }

    #[test]
    fn null_response_averages_as_zero_across_observations() {
        let records = RawRecords {
            teachers: vec![teacher("t1", "Avery Lee")],
            headers: vec![
                header("o1", "t1", 70.0, (2026, 3, 2)),
                header("o2", "t1", 60.0, (2026, 3, 9)),
            ],
            indicators: vec![indicator("i1", "X", 2)],
            responses: vec![
                response("o1", "i1", 0.8),
                ResponseRow {
                    value: None,
                    ..response("o2", "i1", 0.0)
                },
            ],
            ..RawRecords::default()
        };

        let observations = join_records(&records);
        let result = crate::aggregate::aggregate(&observations).unwrap();
        let x = &result.indicator_averages[0];
        assert_eq!(x.label, "X");
        assert!((x.value.unwrap() - 40.0).abs() < 1e-9);
        assert_eq!(crate::kpi::low_indicator_count(&result.indicator_averages), 1);
    }

    #[test]
    fn no_headers_means_no_observations() {
        let mut records = sample();
        records.headers.clear();
        assert!(join_records(&records).is_empty());
    }
}
