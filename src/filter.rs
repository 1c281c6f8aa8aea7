use serde_json::Value;
use std::cmp::Ordering;

use crate::model::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// A single predicate over one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    /// `%` matches any run, `_` matches one character
    Like(String, String),
    /// Case-insensitive `Like`
    ILike(String, String),
    In(String, Vec<Value>),
    IsNull(String),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _)
            | Filter::Neq(c, _)
            | Filter::Like(c, _)
            | Filter::ILike(c, _)
            | Filter::In(c, _)
            | Filter::IsNull(c) => c,
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let cell = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Filter::Eq(_, v) => loose_eq(cell, v),
            Filter::Neq(_, v) => !cell.is_null() && !loose_eq(cell, v),
            Filter::Like(_, p) => canonical(cell).map_or(false, |s| like(&s, p)),
            Filter::ILike(_, p) => {
                canonical(cell).map_or(false, |s| like(&s.to_lowercase(), &p.to_lowercase()))
            }
            Filter::In(_, vs) => vs.iter().any(|v| loose_eq(cell, v)),
            Filter::IsNull(_) => cell.is_null(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

/// Filters, ordering and offset/limit for one read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, f: Filter) -> Self {
        self.filters.push(f);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order.push(Order { column: column.to_string(), direction });
        self
    }

    pub fn range(mut self, offset: usize, limit: usize) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Applies filters, ordering and the offset/limit window to `rows`.
    pub fn apply<'a, I>(&self, rows: I) -> Vec<Row>
    where
        I: IntoIterator<Item = &'a Row>,
    {
        let mut out: Vec<Row> = rows.into_iter().filter(|r| self.matches(r)).cloned().collect();

        if !self.order.is_empty() {
            // sort_by is stable: ties keep insertion order
            out.sort_by(|a, b| {
                for o in &self.order {
                    let ord = compare_cells(
                        a.get(&o.column).unwrap_or(&Value::Null),
                        b.get(&o.column).unwrap_or(&Value::Null),
                        o.direction,
                    );
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        out.into_iter().skip(offset).take(limit).collect()
    }
}

/// Text form used for equality, so `"5"` and `5` compare equal once they
/// have crossed a text-only transport.
pub fn canonical(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (canonical(a), canonical(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Nulls sort last in either direction.
fn compare_cells(a: &Value, b: &Value, direction: Direction) -> Ordering {
    let ord = match (a, b) {
        (Value::Null, Value::Null) => return Ordering::Equal,
        (Value::Null, _) => return Ordering::Greater,
        (_, Value::Null) => return Ordering::Less,
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => canonical(a).cmp(&canonical(b)),
    };
    match direction {
        Direction::Asc => ord,
        Direction::Desc => ord.reverse(),
    }
}

/// SQL `LIKE` over chars.
fn like(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut ti, mut pi) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            ti += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::row;
    use serde_json::json;

    fn people() -> Vec<Row> {
        vec![
            row([("id", json!("1")), ("name", json!("Bruna")), ("age", json!(31))]),
            row([("id", json!("2")), ("name", json!("ana")), ("age", Value::Null)]),
            row([("id", json!("3")), ("name", json!("Carlos")), ("age", json!(25))]),
        ]
    }

    #[test]
    fn like_wildcards() {
        assert!(like("fornecedor", "forn%"));
        assert!(like("fornecedor", "%dor"));
        assert!(like("abc", "a_c"));
        assert!(!like("abc", "a_"));
        assert!(like("", "%"));
    }

    #[test]
    fn ilike_ignores_case() {
        let rows = people();
        let q = Query::new().filter(Filter::ILike("name".into(), "a%".into()));
        let names: Vec<_> = q.apply(&rows).iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("ana")]);
    }

    #[test]
    fn eq_matches_across_text_and_numbers() {
        let rows = people();
        let q = Query::new().eq("age", "25");
        assert_eq!(q.apply(&rows).len(), 1);
    }

    #[test]
    fn order_puts_nulls_last_and_windows() {
        let rows = people();
        let q = Query::new().order_by("age", Direction::Desc).range(0, 2);
        let ids: Vec<_> = q.apply(&rows).iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("1"), json!("3")]);

        let q = Query::new().order_by("age", Direction::Asc).range(2, 5);
        let ids: Vec<_> = q.apply(&rows).iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("2")]);
    }

    #[test]
    fn is_null_and_in() {
        let rows = people();
        assert_eq!(Query::new().filter(Filter::IsNull("age".into())).apply(&rows).len(), 1);
        let q = Query::new().filter(Filter::In("id".into(), vec![json!("1"), json!("3")]));
        assert_eq!(q.apply(&rows).len(), 2);
    }
}
