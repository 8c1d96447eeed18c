use std::fmt::Write;
use std::io;

use serde::Serialize;

use crate::dashboard::DashboardView;
use crate::kpi::{round_percent, Trend};
use crate::models::{DisplayData, Observation};
use crate::view::{EligibleTeacher, ViewMode};

pub fn view_title(mode: ViewMode) -> &'static str {
    match mode {
        ViewMode::Single => "Observación individual",
        ViewMode::ByTeacher => "Promedio histórico docente",
        ViewMode::Institution => "Promedio general institucional",
    }
}

pub fn format_trend(trend: &Trend) -> String {
    match trend {
        Trend::Up { delta } => format!("▲ +{}%", round_percent(*delta)),
        Trend::Down { delta } => format!("▼ {}%", round_percent(-delta)),
        Trend::Stable => "= estable".to_string(),
        Trend::Unavailable => "—".to_string(),
    }
}

pub fn format_observation(observation: &Observation) -> String {
    let date = observation
        .date
        .map(|date| date.to_string())
        .unwrap_or_else(|| "sin fecha".to_string());
    format!(
        "{} - {} ({}) {}%",
        observation.teacher_name,
        observation.subject,
        date,
        round_percent(observation.total_percentage)
    )
}

pub fn build_report(view: &DashboardView) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Observación en Aula");
    let _ = writeln!(output, "Vista: {}", view_title(view.mode));
    if !view.range.is_unbounded() {
        let from = view.range.from.map(|d| d.to_string()).unwrap_or_else(|| "…".to_string());
        let to = view.range.to.map(|d| d.to_string()).unwrap_or_else(|| "…".to_string());
        let _ = writeln!(output, "Periodo: {} a {}", from, to);
    }
    let _ = writeln!(output);

    let Some(display) = view.display.as_ref() else {
        let _ = writeln!(output, "No hay datos para esta selección.");
        return output;
    };

    match display {
        DisplayData::Observation(observation) => {
            let _ = writeln!(output, "## Detalle");
            let _ = writeln!(output, "- Docente: {}", observation.teacher_name);
            let _ = writeln!(output, "- Asignatura: {}", observation.subject);
            let _ = writeln!(output, "- Curso: {}", observation.course);
            if let Some(date) = observation.date {
                let _ = writeln!(output, "- Fecha: {}", date);
            }
            let _ = writeln!(output, "- Observador: {}", observation.observer_name);
        }
        DisplayData::Aggregate(aggregate) => {
            let _ = writeln!(output, "## Detalle");
            let _ = writeln!(
                output,
                "- Observaciones promediadas: {}",
                aggregate.observation_count
            );
        }
    }

    let scores = display.dimension_scores();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Desempeño");
    let _ = writeln!(output, "- Global: {}%", round_percent(display.total_percentage()));
    let _ = writeln!(output, "- Ambiente: {}%", round_percent(scores.ambiente));
    let _ = writeln!(output, "- Interacción: {}%", round_percent(scores.interaccion));
    let _ = writeln!(output, "- Organización: {}%", round_percent(scores.organizacion));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Indicadores clave");
    match view.kpis.critical {
        Some(critical) => {
            let _ = writeln!(
                output,
                "- Dimensión crítica: {} {}%",
                critical.dimension,
                round_percent(critical.score)
            );
        }
        None => {
            let _ = writeln!(output, "- Dimensión crítica: —");
        }
    }
    let _ = writeln!(output, "- Indicadores < 60%: {}", view.kpis.low_indicators);
    let _ = writeln!(output, "- Tendencia docente: {}", format_trend(&view.kpis.trend));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Análisis por indicador");
    let items = display.indicator_items();
    if items.is_empty() {
        let _ = writeln!(output, "Sin indicadores registrados.");
    } else {
        for item in items {
            let dimension = item
                .dimension
                .map(|dimension| dimension.label())
                .unwrap_or("Sin dimensión");
            let value = item
                .value
                .map(|value| format!("{}%", round_percent(value)))
                .unwrap_or_else(|| "—".to_string());
            let _ = writeln!(output, "- {} [{}]: {}", item.label, dimension, value);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top desempeños");
    if view.ranking.is_empty() {
        let _ = writeln!(output, "Sin observaciones en este periodo.");
    } else {
        for (position, observation) in view.ranking.iter().enumerate() {
            let _ = writeln!(output, "{}. {}", position + 1, format_observation(observation));
        }
    }

    output
}

pub fn build_teacher_list(teachers: &[EligibleTeacher]) -> String {
    let mut output = String::new();
    if teachers.is_empty() {
        let _ = writeln!(output, "Ningún docente tiene al menos dos observaciones.");
        return output;
    }
    for teacher in teachers {
        let _ = writeln!(
            output,
            "- {} ({}): {} observaciones",
            teacher.teacher_name, teacher.teacher_id, teacher.observation_count
        );
    }
    output
}

#[derive(Serialize)]
struct ObservationCsvRow<'a> {
    observation_id: &'a str,
    teacher_id: &'a str,
    teacher_name: &'a str,
    subject: &'a str,
    course: &'a str,
    date: String,
    observer_name: &'a str,
    total_percentage: f64,
    ambiente: f64,
    interaccion: f64,
    organizacion: f64,
    indicator_count: usize,
}

/// Writes one CSV row per observation, dimension scores flattened.
pub fn write_csv<W: io::Write>(writer: W, observations: &[Observation]) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for observation in observations {
        writer.serialize(ObservationCsvRow {
            observation_id: &observation.observation_id,
            teacher_id: observation.teacher_id.as_deref().unwrap_or_default(),
            teacher_name: &observation.teacher_name,
            subject: &observation.subject,
            course: &observation.course,
            date: observation.date.map(|date| date.to_string()).unwrap_or_default(),
            observer_name: &observation.observer_name,
            total_percentage: observation.total_percentage,
            ambiente: observation.dimension_scores.ambiente,
            interaccion: observation.dimension_scores.interaccion,
            organizacion: observation.dimension_scores.organizacion,
            indicator_count: observation.indicator_items.len(),
        })?;
    }
    writer.flush()?;
    Ok(())
}
