use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::config::Config;
use crate::error::SourceError;
use crate::models::{
    DimensionScoreRow, EvolutionPoint, IndicatorDefinition, ObservationHeader, ResponseRow,
    TeacherRow,
};
use crate::source::ObservationSource;

pub const TEACHERS: &str = "docentes";
pub const HEADERS: &str = "v_resultados_dimensiones";
pub const DIMENSION_SCORES: &str = "v_resultados_dimension";
pub const INDICATORS: &str = "indicadores";
pub const RESPONSES: &str = "respuestas";
pub const EVOLUTION: &str = "v_evolucion_docente";

pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
}

/// The observation store on Postgres. Ids are read as text so any key type works.
pub struct PgSource {
    pool: PgPool,
    schema: String,
}

impl PgSource {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    fn relation(&self, name: &str) -> String {
        format!("{}.{}", self.schema, name)
    }

    async fn rows(&self, relation: &'static str, sql: &str) -> Result<Vec<PgRow>, SourceError> {
        sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|source| SourceError::Query { relation, source })
    }
}

fn decode<T>(relation: &'static str, result: Result<T, sqlx::Error>) -> Result<T, SourceError> {
    result.map_err(|source| SourceError::Query { relation, source })
}

#[async_trait]
impl ObservationSource for PgSource {
    async fn fetch_teachers(&self) -> Result<Vec<TeacherRow>, SourceError> {
        let sql = format!(
            "SELECT id::text AS id, nombre AS name FROM {}",
            self.relation(TEACHERS)
        );
        let mut teachers = Vec::new();

        for row in self.rows(TEACHERS, &sql).await? {
            teachers.push(TeacherRow {
                id: decode(TEACHERS, row.try_get("id"))?,
                name: decode(TEACHERS, row.try_get("name"))?,
            });
        }

        Ok(teachers)
    }

    async fn fetch_headers(&self) -> Result<Vec<ObservationHeader>, SourceError> {
        let sql = format!(
            "SELECT observacion_id::text AS observation_id, docente_id::text AS teacher_id, \
             asignatura AS subject, curso AS course, fecha::date AS date, \
             observador AS observer_name, porcentaje_total::float8 AS total_percentage \
             FROM {}",
            self.relation(HEADERS)
        );
        let mut headers = Vec::new();

        for row in self.rows(HEADERS, &sql).await? {
            headers.push(ObservationHeader {
                observation_id: decode(HEADERS, row.try_get("observation_id"))?,
                teacher_id: decode(HEADERS, row.try_get("teacher_id"))?,
                subject: decode(HEADERS, row.try_get("subject"))?,
                course: decode(HEADERS, row.try_get("course"))?,
                date: decode(HEADERS, row.try_get("date"))?,
                observer_name: decode(HEADERS, row.try_get("observer_name"))?,
                total_percentage: decode(HEADERS, row.try_get("total_percentage"))?,
            });
        }

        Ok(headers)
    }

    async fn fetch_dimension_scores(&self) -> Result<Vec<DimensionScoreRow>, SourceError> {
        let sql = format!(
            "SELECT observacion_id::text AS observation_id, dimension_codigo AS dimension_code, \
             porcentaje::float8 AS percentage FROM {}",
            self.relation(DIMENSION_SCORES)
        );
        let mut scores = Vec::new();

        for row in self.rows(DIMENSION_SCORES, &sql).await? {
            scores.push(DimensionScoreRow {
                observation_id: decode(DIMENSION_SCORES, row.try_get("observation_id"))?,
                dimension_code: decode(DIMENSION_SCORES, row.try_get("dimension_code"))?,
                percentage: decode(DIMENSION_SCORES, row.try_get("percentage"))?,
            });
        }

        Ok(scores)
    }

    async fn fetch_indicators(&self) -> Result<Vec<IndicatorDefinition>, SourceError> {
        let sql = format!(
            "SELECT id::text AS id, columna_excel AS label, dimension_id::int4 AS dimension_id \
             FROM {}",
            self.relation(INDICATORS)
        );
        let mut indicators = Vec::new();

        for row in self.rows(INDICATORS, &sql).await? {
            indicators.push(IndicatorDefinition {
                id: decode(INDICATORS, row.try_get("id"))?,
                label: decode(INDICATORS, row.try_get("label"))?,
                dimension_id: decode(INDICATORS, row.try_get("dimension_id"))?,
            });
        }

        Ok(indicators)
    }

    async fn fetch_responses(&self) -> Result<Vec<ResponseRow>, SourceError> {
        let sql = format!(
            "SELECT observacion_id::text AS observation_id, indicador_id::text AS indicator_id, \
             valor::float8 AS value, created_at::timestamptz AS recorded_at FROM {}",
            self.relation(RESPONSES)
        );
        let mut responses = Vec::new();

        for row in self.rows(RESPONSES, &sql).await? {
            responses.push(ResponseRow {
                observation_id: decode(RESPONSES, row.try_get("observation_id"))?,
                indicator_id: decode(RESPONSES, row.try_get("indicator_id"))?,
                value: decode(RESPONSES, row.try_get("value"))?,
                recorded_at: decode(RESPONSES, row.try_get("recorded_at"))?,
            });
        }

        Ok(responses)
    }

    async fn fetch_evolution(&self) -> Result<Vec<EvolutionPoint>, SourceError> {
        let sql = format!(
            "SELECT docente_id::text AS teacher_id, fecha::date AS date, \
             porcentaje_promedio::float8 AS average_percentage FROM {}",
            self.relation(EVOLUTION)
        );
        let mut points = Vec::new();

        for row in self.rows(EVOLUTION, &sql).await? {
            points.push(EvolutionPoint {
                teacher_id: decode(EVOLUTION, row.try_get("teacher_id"))?,
                date: decode(EVOLUTION, row.try_get("date"))?,
                average_percentage: decode(EVOLUTION, row.try_get("average_percentage"))?,
            });
        }

        Ok(points)
    }

    async fn latest_response_at(&self) -> Result<Option<DateTime<Utc>>, SourceError> {
        let sql = format!(
            "SELECT created_at::timestamptz AS created_at FROM {} WHERE created_at IS NOT NULL \
             ORDER BY created_at DESC LIMIT 1",
            self.relation(RESPONSES)
        );

        let row = sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| SourceError::Query {
                relation: RESPONSES,
                source,
            })?;

        match row {
            Some(row) => Ok(Some(decode(RESPONSES, row.try_get("created_at"))?)),
            None => Ok(None),
        }
    }
}
