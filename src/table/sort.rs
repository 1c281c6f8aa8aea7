use std::cmp::Ordering;
use std::fmt;

/// Comparable cell value extracted from a record by a column accessor.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SortValue {
    fn rank(&self) -> u8 {
        match self {
            SortValue::Null => 0,
            SortValue::Bool(_) => 1,
            SortValue::Int(_) | SortValue::Float(_) => 2,
            SortValue::Text(_) => 3,
        }
    }

    /// Plain `<` comparison; values of different kinds order by kind.
    pub fn compare(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Bool(a), SortValue::Bool(b)) => a.cmp(b),
            (SortValue::Int(a), SortValue::Int(b)) => a.cmp(b),
            // total_cmp gives NaN a fixed place among the numbers
            (SortValue::Int(a), SortValue::Float(b)) => (*a as f64).total_cmp(b),
            (SortValue::Float(a), SortValue::Int(b)) => a.total_cmp(&(*b as f64)),
            (SortValue::Float(a), SortValue::Float(b)) => a.total_cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SortValue::Null)
    }
}

impl fmt::Display for SortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortValue::Null => write!(f, "-"),
            SortValue::Bool(b) => write!(f, "{}", b),
            SortValue::Int(i) => write!(f, "{}", i),
            SortValue::Float(x) => write!(f, "{:.2}", x),
            SortValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for SortValue {
    fn from(s: &str) -> Self {
        SortValue::Text(s.to_string())
    }
}

impl From<String> for SortValue {
    fn from(s: String) -> Self {
        SortValue::Text(s)
    }
}

impl From<i64> for SortValue {
    fn from(i: i64) -> Self {
        SortValue::Int(i)
    }
}

impl From<f64> for SortValue {
    fn from(x: f64) -> Self {
        SortValue::Float(x)
    }
}

impl From<bool> for SortValue {
    fn from(b: bool) -> Self {
        SortValue::Bool(b)
    }
}

impl<T: Into<SortValue>> From<Option<T>> for SortValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SortValue::Null, Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// Current sort column and direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortState {
    pub key: Option<String>,
    pub direction: SortDirection,
}

impl SortState {
    /// Direction a click on `key` asks for: the same key flips, a new key
    /// starts ascending.
    pub fn next_for(&self, key: &str) -> SortDirection {
        if self.key.as_deref() == Some(key) {
            self.direction.toggled()
        } else {
            SortDirection::Asc
        }
    }
}

/// Who owns the ordering of the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// The table sorts its records itself.
    #[default]
    Internal,
    /// The caller sorts (usually server-side) and re-supplies the records;
    /// the table only reports what was asked for.
    External,
}

/// Emitted by a header click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortRequest {
    pub key: String,
    pub direction: SortDirection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_mixes_ints_and_floats() {
        assert_eq!(SortValue::Int(2).compare(&SortValue::Float(2.5)), Ordering::Less);
        assert_eq!(SortValue::Float(3.0).compare(&SortValue::Int(3)), Ordering::Equal);
    }

    #[test]
    fn nan_is_ordered_after_numbers() {
        let nan = SortValue::Float(f64::NAN);
        assert_eq!(nan.compare(&SortValue::Float(1.0)), Ordering::Greater);
        assert_eq!(SortValue::Int(7).compare(&nan), Ordering::Less);
        assert_eq!(nan.compare(&nan), Ordering::Equal);
    }

    #[test]
    fn nulls_sort_before_values() {
        assert_eq!(SortValue::Null.compare(&SortValue::from("a")), Ordering::Less);
        assert_eq!(SortValue::from(None::<i64>), SortValue::Null);
    }

    #[test]
    fn next_direction_toggles_only_on_same_key() {
        let state = SortState { key: Some("name".into()), direction: SortDirection::Asc };
        assert_eq!(state.next_for("name"), SortDirection::Desc);
        assert_eq!(state.next_for("email"), SortDirection::Asc);

        let state = SortState { key: Some("name".into()), direction: SortDirection::Desc };
        assert_eq!(state.next_for("name"), SortDirection::Asc);
    }
}
