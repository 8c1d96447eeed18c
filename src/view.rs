use std::collections::HashMap;

use clap::ValueEnum;
use serde::Serialize;

use crate::aggregate::aggregate;
use crate::models::{DisplayData, Observation, ObservationId, TeacherId};

/// Minimum observations a teacher needs before their average is offered.
pub const MIN_TEACHER_OBSERVATIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewMode {
    /// One observation
    Single,
    /// Historical average of one teacher
    ByTeacher,
    /// Average over every observation
    Institution,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub observation_id: Option<ObservationId>,
    pub teacher_id: Option<TeacherId>,
}

impl Selection {
    /// First observation in load order, first eligible teacher.
    pub fn defaults(observations: &[Observation]) -> Self {
        Self {
            observation_id: observations
                .first()
                .map(|observation| observation.observation_id.clone()),
            teacher_id: eligible_teachers(observations)
                .into_iter()
                .next()
                .map(|teacher| teacher.teacher_id),
        }
    }

    /// Keeps explicit choices and fills the gaps with the defaults.
    pub fn or_defaults(self, observations: &[Observation]) -> Self {
        let defaults = Self::defaults(observations);
        Self {
            observation_id: self.observation_id.or(defaults.observation_id),
            teacher_id: self.teacher_id.or(defaults.teacher_id),
        }
    }
}

/// Picks what to display. `None` means there is nothing to show for this selection.
///
/// Teacher eligibility is not checked here.
pub fn select(
    mode: ViewMode,
    selection: &Selection,
    observations: &[Observation],
) -> Option<DisplayData> {
    match mode {
        ViewMode::Single => {
            let id = selection.observation_id.as_deref()?;
            observations
                .iter()
                .find(|observation| observation.observation_id == id)
                .cloned()
                .map(DisplayData::Observation)
        }
        ViewMode::ByTeacher => {
            let teacher_id = selection.teacher_id.as_deref()?;
            aggregate(
                observations
                    .iter()
                    .filter(|observation| observation.teacher_id.as_deref() == Some(teacher_id)),
            )
            .map(DisplayData::Aggregate)
        }
        ViewMode::Institution => aggregate(observations).map(DisplayData::Aggregate),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibleTeacher {
    pub teacher_id: TeacherId,
    pub teacher_name: String,
    pub observation_count: usize,
}

/// Teachers with at least [`MIN_TEACHER_OBSERVATIONS`], in first-appearance order.
pub fn eligible_teachers(observations: &[Observation]) -> Vec<EligibleTeacher> {
    let mut order: Vec<EligibleTeacher> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for observation in observations {
        let Some(teacher_id) = observation.teacher_id.as_deref() else {
            continue;
        };
        match index.get(teacher_id) {
            Some(&position) => order[position].observation_count += 1,
            None => {
                index.insert(teacher_id, order.len());
                order.push(EligibleTeacher {
                    teacher_id: teacher_id.to_string(),
                    teacher_name: observation.teacher_name.clone(),
                    observation_count: 1,
                });
            }
        }
    }

    order.retain(|teacher| teacher.observation_count >= MIN_TEACHER_OBSERVATIONS);
    order
}

/// First observation whose teacher name or subject contains `term`, ignoring case.
pub fn search<'a>(observations: &'a [Observation], term: &str) -> Option<&'a Observation> {
    let needle = term.to_lowercase();
    observations.iter().find(|observation| {
        observation.teacher_name.to_lowercase().contains(&needle)
            || observation.subject.to_lowercase().contains(&needle)
    })
}
