//! Builds parameterized SQL over the document table. Identifiers come from
//! configuration only; every value is a parameter.

use crate::query::{Direction, Ordering, Predicate, Query};
use crate::sql::params::SqlParam;

const DOCUMENT: &str = "document";

/// Quote identifier for PostgreSQL (safe: only from config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Adds a parameter and returns its cast placeholder, e.g. `$2::jsonb`.
    fn push_param(&mut self, p: SqlParam) -> String {
        let placeholder = format!("${}::{}", self.params.len() + 1, p.cast());
        self.params.push(p);
        placeholder
    }
}

/// Lax-mode jsonpath for a dotted document path. The trailing `[*]` unwraps
/// collections at the end of the path; intermediate arrays unwrap implicitly.
pub fn json_path(path: &str) -> String {
    let mut out = String::from("$");
    for segment in path.split('.') {
        out.push_str(".\"");
        out.push_str(&segment.replace('\\', "\\\\").replace('"', "\\\""));
        out.push('"');
    }
    out.push_str("[*]");
    out
}

/// `CREATE SCHEMA` and the document table with its path index.
pub fn create_document_table(schema: &str, table: &str) -> Vec<String> {
    let qualified = qualified_table(schema, table);
    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema)),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             seq BIGSERIAL NOT NULL, \
             entity_type TEXT NOT NULL, \
             identifier TEXT NOT NULL, \
             {} JSONB NOT NULL, \
             PRIMARY KEY (entity_type, identifier))",
            qualified, DOCUMENT
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING gin ({} jsonb_path_ops)",
            quoted(&format!("{}_document_idx", table)),
            qualified,
            DOCUMENT
        ),
    ]
}

/// SELECT documents of one entity type matching the query, ordered, then
/// insertion order as the final tiebreaker.
pub fn select_documents(table: &str, entity_type: &str, query: &Query) -> QueryBuf {
    let mut q = QueryBuf::new();
    let type_ph = q.push_param(SqlParam::Text(entity_type.to_string()));
    let mut sql = format!("SELECT {} FROM {} WHERE entity_type = {}", DOCUMENT, table, type_ph);
    if let Some(predicate) = &query.predicate {
        let condition = predicate_sql(&mut q, predicate);
        sql.push_str(&format!(" AND ({})", condition));
    }
    let mut order: Vec<String> = query.orderings.iter().map(|o| ordering_sql(&mut q, o)).collect();
    order.push("seq".to_string());
    sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
    if let Some(limit) = query.limit {
        let ph = q.push_param(SqlParam::BigInt(limit as i64));
        sql.push_str(&format!(" LIMIT {}", ph));
    }
    if let Some(offset) = query.offset {
        let ph = q.push_param(SqlParam::BigInt(offset as i64));
        sql.push_str(&format!(" OFFSET {}", ph));
    }
    q.sql = sql;
    q
}

fn ordering_sql(q: &mut QueryBuf, ordering: &Ordering) -> String {
    let path = q.push_param(SqlParam::JsonPath(json_path(&ordering.path)));
    let direction = match ordering.direction {
        Direction::Asc => "ASC NULLS LAST",
        Direction::Desc => "DESC NULLS FIRST",
    };
    format!(
        "NULLIF(jsonb_path_query_first({}, {}), 'null'::jsonb) {}",
        DOCUMENT, path, direction
    )
}

/// Comparisons over paths without a non-null value yield SQL NULL (unknown),
/// so `NOT` behaves the same as in three-valued logic.
fn present(path_ph: &str, condition: &str) -> String {
    let values = format!(
        "SELECT 1 FROM jsonb_path_query({}, {}) AS v(val) WHERE v.val <> 'null'::jsonb",
        DOCUMENT, path_ph
    );
    format!(
        "(CASE WHEN EXISTS ({values}) THEN EXISTS ({values} AND {condition}) END)",
        values = values,
        condition = condition
    )
}

pub fn predicate_sql(q: &mut QueryBuf, predicate: &Predicate) -> String {
    match predicate {
        Predicate::Equals { path, value } => {
            let path_ph = q.push_param(SqlParam::JsonPath(json_path(path)));
            let value_ph = q.push_param(SqlParam::Json(value.clone()));
            present(&path_ph, &format!("v.val = {}", value_ph))
        }
        Predicate::Like {
            path,
            pattern,
            case_sensitive,
        } => {
            let path_ph = q.push_param(SqlParam::JsonPath(json_path(path)));
            let pattern_ph = q.push_param(SqlParam::Text(pattern.clone()));
            let op = if *case_sensitive { "LIKE" } else { "ILIKE" };
            present(
                &path_ph,
                &format!(
                    "jsonb_typeof(v.val) IN ('string', 'number', 'boolean') AND (v.val #>> '{{}}') {} {}",
                    op, pattern_ph
                ),
            )
        }
        Predicate::Compare { path, op, value } => {
            let path_ph = q.push_param(SqlParam::JsonPath(json_path(path)));
            let value_ph = q.push_param(SqlParam::Json(value.clone()));
            present(
                &path_ph,
                &format!(
                    "jsonb_typeof(v.val) = jsonb_typeof({v}) AND v.val {op} {v}",
                    v = value_ph,
                    op = op.as_sql()
                ),
            )
        }
        Predicate::IsNull(path) => {
            let path_ph = q.push_param(SqlParam::JsonPath(json_path(path)));
            format!(
                "NOT EXISTS (SELECT 1 FROM jsonb_path_query({}, {}) AS v(val) WHERE v.val <> 'null'::jsonb)",
                DOCUMENT, path_ph
            )
        }
        Predicate::And(parts) => combine(q, parts, " AND ", "TRUE"),
        Predicate::Or(parts) => combine(q, parts, " OR ", "FALSE"),
        Predicate::Not(inner) => format!("NOT ({})", predicate_sql(q, inner)),
    }
}

fn combine(q: &mut QueryBuf, parts: &[Predicate], joiner: &str, empty: &str) -> String {
    if parts.is_empty() {
        return empty.to_string();
    }
    let sql: Vec<String> = parts.iter().map(|p| format!("({})", predicate_sql(q, p))).collect();
    sql.join(joiner)
}

pub fn select_by_identifier(table: &str, entity_type: &str, identifier: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let type_ph = q.push_param(SqlParam::Text(entity_type.to_string()));
    let id_ph = q.push_param(SqlParam::Text(identifier.to_string()));
    q.sql = format!(
        "SELECT {} FROM {} WHERE entity_type = {} AND identifier = {}",
        DOCUMENT, table, type_ph, id_ph
    );
    q
}

/// INSERT that affects no row when the identifier is taken.
pub fn insert(table: &str, entity_type: &str, identifier: &str, document: &serde_json::Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let type_ph = q.push_param(SqlParam::Text(entity_type.to_string()));
    let id_ph = q.push_param(SqlParam::Text(identifier.to_string()));
    let doc_ph = q.push_param(SqlParam::Json(document.clone()));
    q.sql = format!(
        "INSERT INTO {} (entity_type, identifier, {}) VALUES ({}, {}, {}) ON CONFLICT (entity_type, identifier) DO NOTHING",
        table, DOCUMENT, type_ph, id_ph, doc_ph
    );
    q
}

pub fn update(table: &str, entity_type: &str, identifier: &str, document: &serde_json::Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let doc_ph = q.push_param(SqlParam::Json(document.clone()));
    let type_ph = q.push_param(SqlParam::Text(entity_type.to_string()));
    let id_ph = q.push_param(SqlParam::Text(identifier.to_string()));
    q.sql = format!(
        "UPDATE {} SET {} = {} WHERE entity_type = {} AND identifier = {}",
        table, DOCUMENT, doc_ph, type_ph, id_ph
    );
    q
}

pub fn delete(table: &str, entity_type: &str, identifier: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let type_ph = q.push_param(SqlParam::Text(entity_type.to_string()));
    let id_ph = q.push_param(SqlParam::Text(identifier.to_string()));
    q.sql = format!(
        "DELETE FROM {} WHERE entity_type = {} AND identifier = {}",
        table, type_ph, id_ph
    );
    q
}
