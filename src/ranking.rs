use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::Observation;

pub const TOP_LIMIT: usize = 5;

/// Highest `total_percentage` first, at most `limit` entries. Ties keep load order.
pub fn top_observations(observations: &[Observation], limit: usize) -> Vec<&Observation> {
    let mut ranked: Vec<&Observation> = observations.iter().collect();
    ranked.sort_by(|a, b| {
        b.total_percentage
            .partial_cmp(&a.total_percentage)
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(limit);
    ranked
}

/// Inclusive date window; an open end is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Observations without a date only pass an unbounded range.
    pub fn contains(&self, date: Option<NaiveDate>) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let Some(date) = date else {
            return false;
        };
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }

    pub fn filter(&self, observations: &[Observation]) -> Vec<Observation> {
        observations
            .iter()
            .filter(|observation| self.contains(observation.date))
            .cloned()
            .collect()
    }
}
