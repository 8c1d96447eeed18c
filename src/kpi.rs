//! Secondary indicators derived from whatever a view displays.

use std::cmp::Ordering;

use serde::Serialize;

use crate::models::{Dimension, DisplayData, EvolutionPoint, IndicatorItem};
use crate::view::ViewMode;

/// Indicators strictly below this percentage count as low.
pub const LOW_INDICATOR_THRESHOLD: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CriticalDimension {
    pub dimension: Dimension,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "direction", rename_all = "snake_case")]
pub enum Trend {
    Up { delta: f64 },
    Down { delta: f64 },
    Stable,
    /// Not a teacher view, or fewer than two evolution points.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub critical: Option<CriticalDimension>,
    pub low_indicators: usize,
    pub trend: Trend,
}

impl Kpis {
    pub fn unavailable() -> Self {
        Self {
            critical: None,
            low_indicators: 0,
            trend: Trend::Unavailable,
        }
    }
}

pub fn derive_kpis(
    display: Option<&DisplayData>,
    mode: ViewMode,
    teacher_id: Option<&str>,
    evolution: &[EvolutionPoint],
) -> Kpis {
    let Some(display) = display else {
        return Kpis::unavailable();
    };

    let trend = match (mode, teacher_id) {
        (ViewMode::ByTeacher, Some(teacher_id)) => teacher_trend(evolution, teacher_id),
        _ => Trend::Unavailable,
    };

    Kpis {
        critical: Some(critical_dimension(display)),
        low_indicators: low_indicator_count(display.indicator_items()),
        trend,
    }
}

/// Lowest-scoring dimension; ties go to the earlier one in the fixed order.
pub fn critical_dimension(display: &DisplayData) -> CriticalDimension {
    let scores = display.dimension_scores();
    let mut ranked: Vec<CriticalDimension> = Dimension::ALL
        .into_iter()
        .map(|dimension| CriticalDimension {
            dimension,
            score: scores.get(dimension),
        })
        .collect();
    ranked.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));
    ranked[0]
}

/// Missing values count as 0, so they are always low.
pub fn low_indicator_count(items: &[IndicatorItem]) -> usize {
    items
        .iter()
        .filter(|item| item.value.unwrap_or(0.0) < LOW_INDICATOR_THRESHOLD)
        .count()
}

/// Last minus first average of the teacher's series, in date order.
pub fn teacher_trend(evolution: &[EvolutionPoint], teacher_id: &str) -> Trend {
    let mut series: Vec<&EvolutionPoint> = evolution
        .iter()
        .filter(|point| point.teacher_id == teacher_id)
        .collect();
    if series.len() < 2 {
        return Trend::Unavailable;
    }
    // Undated points sort first.
    series.sort_by_key(|point| point.date);

    let first = series[0].average_percentage.unwrap_or(0.0);
    let last = series[series.len() - 1].average_percentage.unwrap_or(0.0);
    let diff = last - first;

    if diff > 0.0 {
        Trend::Up { delta: diff }
    } else if diff < 0.0 {
        Trend::Down { delta: -diff }
    } else {
        Trend::Stable
    }
}

/// Rounds half toward positive infinity, matching how the dashboard has always shown percentages.
pub fn round_percent(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}
