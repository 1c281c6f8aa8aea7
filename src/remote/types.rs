//! Wire vocabulary shared by the HTTP client and the development server:
//! error bodies and the `column=op.value` query encoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::filter::{canonical, Direction, Filter, Order, Query};

pub const REST_PREFIX: &str = "rest";
pub const REST_VERSION: &str = "v1";

// --- ERROR CODES ---

pub const CODE_MISSING_PROCEDURE: &str = "PGRST202";
pub const CODE_UNIQUE_VIOLATION: &str = "23505";
pub const CODE_NOT_FOUND: &str = "PGRST116";
pub const CODE_UNKNOWN_TABLE: &str = "PGRST205";
pub const CODE_BAD_QUERY: &str = "PGRST100";
pub const CODE_CONNECTION: &str = "PGRST000";
pub const CODE_CANCELLED: &str = "57014";

/// Error body returned with every non-2xx response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorBody {
    fn new(code: &str, message: String, details: Option<String>, hint: Option<String>) -> Self {
        Self { code: code.to_string(), message, details, hint }
    }

    pub fn status(&self) -> u16 {
        match self.code.as_str() {
            CODE_MISSING_PROCEDURE | CODE_NOT_FOUND | CODE_UNKNOWN_TABLE => 404,
            CODE_UNIQUE_VIOLATION => 409,
            CODE_CONNECTION => 503,
            _ => 400,
        }
    }

    pub fn into_error(self) -> StoreError {
        let details = self.details.unwrap_or_default();
        match self.code.as_str() {
            CODE_MISSING_PROCEDURE => StoreError::UnsupportedProcedure(details),
            CODE_UNIQUE_VIOLATION => StoreError::Conflict { table: self.hint.unwrap_or_default(), constraint: details },
            CODE_NOT_FOUND => StoreError::NotFound(details),
            CODE_UNKNOWN_TABLE => StoreError::UnknownTable(details),
            CODE_CONNECTION => StoreError::Transient(self.message),
            CODE_CANCELLED => StoreError::Cancelled,
            _ => StoreError::Rejected { code: self.code, message: self.message },
        }
    }
}

impl From<&StoreError> for ErrorBody {
    fn from(e: &StoreError) -> Self {
        let message = e.to_string();
        match e {
            StoreError::UnsupportedProcedure(name) => ErrorBody::new(CODE_MISSING_PROCEDURE, message, Some(name.clone()), None),
            StoreError::Conflict { table, constraint } => {
                ErrorBody::new(CODE_UNIQUE_VIOLATION, message, Some(constraint.clone()), Some(table.clone()))
            }
            StoreError::NotFound(what) => ErrorBody::new(CODE_NOT_FOUND, message, Some(what.clone()), None),
            StoreError::UnknownTable(name) => ErrorBody::new(CODE_UNKNOWN_TABLE, message, Some(name.clone()), None),
            StoreError::Transient(msg) => ErrorBody::new(CODE_CONNECTION, msg.clone(), None, None),
            StoreError::Rejected { code, message } => ErrorBody::new(code, message.clone(), None, None),
            StoreError::Cancelled => ErrorBody::new(CODE_CANCELLED, message, None, None),
        }
    }
}

// --- QUERY ENCODING ---

fn text(v: &Value) -> String {
    canonical(v).unwrap_or_default()
}

fn quote(s: &str) -> String {
    if s.contains([',', '(', ')', '"', '\\']) {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        s.to_string()
    }
}

/// `column=op.value` pair for one filter.
pub fn encode_filter(f: &Filter) -> (String, String) {
    let value = match f {
        Filter::Eq(_, Value::Null) | Filter::IsNull(_) => "is.null".to_string(),
        Filter::Eq(_, v) => format!("eq.{}", text(v)),
        Filter::Neq(_, v) => format!("neq.{}", text(v)),
        Filter::Like(_, p) => format!("like.{}", p),
        Filter::ILike(_, p) => format!("ilike.{}", p),
        Filter::In(_, vs) => {
            let items: Vec<String> = vs.iter().map(|v| quote(&text(v))).collect();
            format!("in.({})", items.join(","))
        }
    };
    (f.column().to_string(), value)
}

pub fn encode_filters(filters: &[Filter]) -> Vec<(String, String)> {
    filters.iter().map(encode_filter).collect()
}

pub fn encode_query(q: &Query) -> Vec<(String, String)> {
    let mut pairs = encode_filters(&q.filters);
    if !q.order.is_empty() {
        let order: Vec<String> = q
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.direction == Direction::Desc { "desc" } else { "asc" }))
            .collect();
        pairs.push(("order".to_string(), order.join(",")));
    }
    if let Some(offset) = q.offset {
        pairs.push(("offset".to_string(), offset.to_string()));
    }
    if let Some(limit) = q.limit {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    pairs
}

fn bad_query(msg: String) -> StoreError {
    StoreError::rejected(CODE_BAD_QUERY, msg)
}

/// Splits the inside of `in.(...)`, honouring double quotes.
fn split_list(inner: &str) -> Result<Vec<Value>, StoreError> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars();
    let mut quoted = false;
    let mut was_quoted = false;

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                was_quoted = true;
            }
            '\\' if quoted => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => return Err(bad_query("dangling escape in list".to_string())),
            },
            ',' if !quoted => {
                items.push(Value::String(std::mem::take(&mut current)));
                was_quoted = false;
            }
            c => current.push(c),
        }
    }
    if quoted {
        return Err(bad_query("unterminated quote in list".to_string()));
    }
    if !current.is_empty() || was_quoted || !items.is_empty() {
        items.push(Value::String(current));
    }
    Ok(items)
}

pub fn decode_filter(column: &str, raw: &str) -> Result<Filter, StoreError> {
    let (op, value) = raw
        .split_once('.')
        .ok_or_else(|| bad_query(format!("'{}={}' is missing an operator", column, raw)))?;
    let column = column.to_string();
    let value_s = value.to_string();

    match op {
        "eq" => Ok(Filter::Eq(column, Value::String(value_s))),
        "neq" => Ok(Filter::Neq(column, Value::String(value_s))),
        "like" => Ok(Filter::Like(column, value_s)),
        "ilike" => Ok(Filter::ILike(column, value_s)),
        "is" if value == "null" => Ok(Filter::IsNull(column)),
        "in" => {
            let inner = value
                .strip_prefix('(')
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| bad_query(format!("list for '{}' must be parenthesised", column)))?;
            Ok(Filter::In(column, split_list(inner)?))
        }
        other => Err(bad_query(format!("unknown operator '{}'", other))),
    }
}

fn decode_order(raw: &str) -> Result<Vec<Order>, StoreError> {
    raw.split(',')
        .filter(|s| !s.is_empty())
        .map(|part| {
            let (column, dir) = match part.rsplit_once('.') {
                Some((c, "asc")) => (c, Direction::Asc),
                Some((c, "desc")) => (c, Direction::Desc),
                _ => (part, Direction::Asc),
            };
            Ok(Order { column: column.to_string(), direction: dir })
        })
        .collect()
}

fn decode_usize(key: &str, raw: &str) -> Result<usize, StoreError> {
    raw.parse().map_err(|_| bad_query(format!("'{}' must be a non-negative integer", key)))
}

/// Rebuilds a query from URL pairs. `select` is accepted and ignored.
pub fn decode_query(pairs: &[(String, String)]) -> Result<Query, StoreError> {
    let mut q = Query::new();
    for (key, raw) in pairs {
        match key.as_str() {
            "select" => {}
            "order" => q.order = decode_order(raw)?,
            "offset" => q.offset = Some(decode_usize(key, raw)?),
            "limit" => q.limit = Some(decode_usize(key, raw)?),
            column => q.filters.push(decode_filter(column, raw)?),
        }
    }
    Ok(q)
}

/// Filters for a PATCH; ordering and windowing are not allowed there.
pub fn decode_filters_only(pairs: &[(String, String)]) -> Result<Vec<Filter>, StoreError> {
    let q = decode_query(pairs)?;
    if !q.order.is_empty() || q.offset.is_some() || q.limit.is_some() {
        return Err(bad_query("order, offset and limit are not supported on updates".to_string()));
    }
    Ok(q.filters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_survives_the_url() {
        let q = Query::new()
            .eq("entity_id", "e1")
            .filter(Filter::In("id".into(), vec![json!("a,b"), json!("c"), json!("say \"hi\"")]))
            .filter(Filter::IsNull("ended_at".into()))
            .order_by("name", Direction::Desc)
            .range(10, 5);

        let decoded = decode_query(&encode_query(&q)).unwrap();
        assert_eq!(decoded.filters[0], Filter::Eq("entity_id".into(), json!("e1")));
        assert_eq!(
            decoded.filters[1],
            Filter::In("id".into(), vec![json!("a,b"), json!("c"), json!("say \"hi\"")])
        );
        assert_eq!(decoded.filters[2], Filter::IsNull("ended_at".into()));
        assert_eq!(decoded.order, q.order);
        assert_eq!((decoded.offset, decoded.limit), (Some(10), Some(5)));
    }

    #[test]
    fn booleans_still_match_after_decoding() {
        let (col, raw) = encode_filter(&Filter::eq("active", true));
        let f = decode_filter(&col, &raw).unwrap();
        let row = crate::model::row([("active", json!(true))]);
        assert!(f.matches(&row));
    }

    #[test]
    fn empty_in_list() {
        assert_eq!(decode_filter("id", "in.()").unwrap(), Filter::In("id".into(), vec![]));
    }

    #[test]
    fn bad_operator_is_rejected() {
        let err = decode_filter("name", "gt.5").unwrap_err();
        assert!(matches!(err, StoreError::Rejected { ref code, .. } if code == CODE_BAD_QUERY));
        assert!(decode_filter("name", "cliente").is_err());
    }

    #[test]
    fn errors_map_both_ways() {
        let cases = [
            StoreError::UnsupportedProcedure("upsert_entity_tag".into()),
            StoreError::Conflict { table: "entity_tags".into(), constraint: "entity_tags_unique_0".into() },
            StoreError::NotFound("entity_tags".into()),
            StoreError::UnknownTable("nope".into()),
            StoreError::Cancelled,
            StoreError::rejected("22023", "missing argument"),
        ];
        for e in cases {
            let body = ErrorBody::from(&e);
            assert_eq!(body.clone().into_error(), e, "{:?}", body);
        }
        assert_eq!(ErrorBody::from(&StoreError::UnsupportedProcedure("x".into())).status(), 404);
    }
}
