use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

pub type ObservationId = String;
pub type TeacherId = String;
pub type IndicatorId = String;

/// One of the three fixed evaluation categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Ambiente,
    Interaccion,
    Organizacion,
}

impl Dimension {
    /// Fixed listing order, also the tie-break order for the critical dimension.
    pub const ALL: [Dimension; 3] = [
        Dimension::Ambiente,
        Dimension::Interaccion,
        Dimension::Organizacion,
    ];

    /// Code used by the per-observation dimension view.
    pub fn code(&self) -> &'static str {
        match self {
            Dimension::Ambiente => "AMBIENTE",
            Dimension::Interaccion => "INTERACCION",
            Dimension::Organizacion => "ORGANIZACION",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|dimension| dimension.code().eq_ignore_ascii_case(code.trim()))
    }

    /// Catalog ids: 1 = Ambiente, 2 = Interacción, 3 = Organización.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Dimension::Ambiente),
            2 => Some(Dimension::Interaccion),
            3 => Some(Dimension::Organizacion),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Ambiente => "Ambiente",
            Dimension::Interaccion => "Interacción",
            Dimension::Organizacion => "Organización",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// Raw rows, one struct per relation. Every column the store may leave empty is optional;
// defaults are substituted by the joiner only.

#[derive(Debug, Clone)]
pub struct TeacherRow {
    pub id: TeacherId,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DimensionScoreRow {
    pub observation_id: ObservationId,
    pub dimension_code: Option<String>,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct IndicatorDefinition {
    pub id: IndicatorId,
    pub label: Option<String>,
    pub dimension_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ResponseRow {
    pub observation_id: ObservationId,
    pub indicator_id: Option<IndicatorId>,
    /// Raw score in `[0, 1]`.
    pub value: Option<f64>,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ObservationHeader {
    pub observation_id: ObservationId,
    pub teacher_id: Option<TeacherId>,
    pub subject: Option<String>,
    pub course: Option<String>,
    pub date: Option<NaiveDate>,
    pub observer_name: Option<String>,
    pub total_percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvolutionPoint {
    pub teacher_id: TeacherId,
    pub date: Option<NaiveDate>,
    pub average_percentage: Option<f64>,
}

/// Everything one load cycle fetches, before joining.
#[derive(Debug, Clone, Default)]
pub struct RawRecords {
    pub teachers: Vec<TeacherRow>,
    pub headers: Vec<ObservationHeader>,
    pub dimension_scores: Vec<DimensionScoreRow>,
    pub indicators: Vec<IndicatorDefinition>,
    pub responses: Vec<ResponseRow>,
    pub evolution: Vec<EvolutionPoint>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DimensionScores {
    pub ambiente: f64,
    pub interaccion: f64,
    pub organizacion: f64,
}

impl DimensionScores {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Ambiente => self.ambiente,
            Dimension::Interaccion => self.interaccion,
            Dimension::Organizacion => self.organizacion,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorItem {
    pub label: String,
    /// Percentage in `[0, 100]`; `None` when the store had no value.
    pub value: Option<f64>,
    pub dimension: Option<Dimension>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub observation_id: ObservationId,
    pub teacher_id: Option<TeacherId>,
    pub teacher_name: String,
    pub subject: String,
    pub course: String,
    pub date: Option<NaiveDate>,
    pub observer_name: String,
    pub total_percentage: f64,
    pub dimension_scores: DimensionScores,
    pub indicator_items: Vec<IndicatorItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub total_percentage: f64,
    pub dimension_scores: DimensionScores,
    pub indicator_averages: Vec<IndicatorItem>,
    pub observation_count: usize,
}

/// What a view renders: a single observation or an average over several.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayData {
    Observation(Observation),
    Aggregate(AggregateResult),
}

impl DisplayData {
    pub fn total_percentage(&self) -> f64 {
        match self {
            DisplayData::Observation(observation) => observation.total_percentage,
            DisplayData::Aggregate(aggregate) => aggregate.total_percentage,
        }
    }

    pub fn dimension_scores(&self) -> &DimensionScores {
        match self {
            DisplayData::Observation(observation) => &observation.dimension_scores,
            DisplayData::Aggregate(aggregate) => &aggregate.dimension_scores,
        }
    }

    pub fn indicator_items(&self) -> &[IndicatorItem] {
        match self {
            DisplayData::Observation(observation) => &observation.indicator_items,
            DisplayData::Aggregate(aggregate) => &aggregate.indicator_averages,
        }
    }
}
