//! Parameter binding utilities for database queries.
//!
//! Binds `QueryParam` values to sqlx PostgreSQL queries. Used by every
//! statement path (single statements, transaction blocks, catalog queries).

use crate::models::QueryParam;
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::types::Json;

pub(crate) type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(query: PgQuery<'q>, param: &'q QueryParam) -> PgQuery<'q> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Build a query with all positional parameters bound in order.
pub(crate) fn build_query<'q>(sql: &'q str, params: &'q [QueryParam]) -> PgQuery<'q> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| bind_postgres_param(query, param))
}
