use std::collections::HashMap;

use crate::models::{AggregateResult, Dimension, DimensionScores, IndicatorItem, Observation};

#[derive(Default)]
struct IndicatorTally {
    sum: f64,
    count: usize,
    dimension: Option<Dimension>,
}

/// Unweighted averages over `subset`. Returns `None` for an empty subset.
///
/// Indicators are grouped by display label and each label is averaged only over the
/// observations that contain it; an item without a value counts as 0. Output order is
/// first appearance.
pub fn aggregate<'a, I>(subset: I) -> Option<AggregateResult>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut count = 0usize;
    let mut total = 0.0;
    let mut dimensions = DimensionScores::default();
    let mut order: Vec<&str> = Vec::new();
    let mut tallies: HashMap<&str, IndicatorTally> = HashMap::new();

    for observation in subset {
        count += 1;
        total += observation.total_percentage;
        dimensions.ambiente += observation.dimension_scores.ambiente;
        dimensions.interaccion += observation.dimension_scores.interaccion;
        dimensions.organizacion += observation.dimension_scores.organizacion;

        for item in &observation.indicator_items {
            let tally = tallies.entry(item.label.as_str()).or_insert_with(|| {
                order.push(item.label.as_str());
                IndicatorTally {
                    dimension: item.dimension,
                    ..IndicatorTally::default()
                }
            });
            tally.sum += item.value.unwrap_or(0.0);
            tally.count += 1;
        }
    }

    if count == 0 {
        return None;
    }

    let n = count as f64;
    let indicator_averages = order
        .into_iter()
        .filter_map(|label| {
            let tally = tallies.get(label)?;
            Some(IndicatorItem {
                label: label.to_string(),
                value: Some(tally.sum / tally.count as f64),
                dimension: tally.dimension,
            })
        })
        .collect();

    Some(AggregateResult {
        total_percentage: total / n,
        dimension_scores: DimensionScores {
            ambiente: dimensions.ambiente / n,
            interaccion: dimensions.interaccion / n,
            organizacion: dimensions.organizacion / n,
        },
        indicator_averages,
        observation_count: count,
    })
}
