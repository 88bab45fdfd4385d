//! Bind values for document queries. Every parameter travels as text and is
//! cast in its placeholder, so one bind type covers jsonb, jsonpath and bigint.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

#[derive(Clone, Debug, PartialEq)]
pub enum SqlParam {
    Text(String),
    Json(Value),
    JsonPath(String),
    BigInt(i64),
}

impl SqlParam {
    /// Postgres type named in the placeholder cast.
    pub fn cast(&self) -> &'static str {
        match self {
            SqlParam::Text(_) => "text",
            SqlParam::Json(_) => "jsonb",
            SqlParam::JsonPath(_) => "jsonpath",
            SqlParam::BigInt(_) => "bigint",
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            SqlParam::Text(s) | SqlParam::JsonPath(s) => s.clone(),
            SqlParam::Json(v) => v.to_string(),
            SqlParam::BigInt(n) => n.to_string(),
        }
    }
}

impl<'q> Encode<'q, Postgres> for SqlParam {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        let text = self.to_text();
        <&str as Encode<Postgres>>::encode_by_ref(&text.as_str(), buf)
    }
}

impl sqlx::Type<Postgres> for SqlParam {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}
