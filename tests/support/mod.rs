#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeSet;

use roster::error::StoreError;
use roster::filter::{Filter, Query};
use roster::model::{row, Row};
use roster::procedures;
use roster::reconciler::TagSchema;
use roster::store::RecordStore;
use roster::RosterDb;
use serde_json::{json, Value};

/// One store call as seen by [`Scripted`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Query { table: String },
    Insert { table: String, row: Row },
    Update { table: String },
    Procedure { name: String, args: Value },
}

impl Call {
    pub fn is_procedure(&self, name: &str) -> bool {
        matches!(self, Call::Procedure { name: n, .. } if n == name)
    }

    pub fn is_insert_into(&self, table: &str) -> bool {
        matches!(self, Call::Insert { table: t, .. } if t == table)
    }

    pub fn tag_arg(&self) -> Option<&str> {
        match self {
            Call::Procedure { args, .. } => args.get("tag_name").and_then(Value::as_str),
            _ => None,
        }
    }
}

type Matcher = Box<dyn Fn(&Call) -> bool>;
type Hook<S> = Box<dyn FnMut(&Call, &S)>;

struct Rule {
    matches: Matcher,
    error: StoreError,
}

/// Wraps a store, records every call and injects failures or side effects.
pub struct Scripted<S> {
    pub inner: S,
    calls: RefCell<Vec<Call>>,
    rules: RefCell<Vec<Rule>>,
    hooks: RefCell<Vec<Hook<S>>>,
}

impl<S: RecordStore> Scripted<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, calls: RefCell::default(), rules: RefCell::default(), hooks: RefCell::default() }
    }

    /// Every call matching `matches` fails with `error`.
    pub fn fail_when(&self, matches: impl Fn(&Call) -> bool + 'static, error: StoreError) {
        self.rules.borrow_mut().push(Rule { matches: Box::new(matches), error });
    }

    /// Runs before each call reaches the inner store.
    pub fn before_call(&self, hook: impl FnMut(&Call, &S) + 'static) {
        self.hooks.borrow_mut().push(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn procedure_calls(&self, name: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.is_procedure(name)).collect()
    }

    fn enter(&self, call: Call) -> Result<(), StoreError> {
        self.calls.borrow_mut().push(call.clone());
        for hook in self.hooks.borrow_mut().iter_mut() {
            hook(&call, &self.inner);
        }
        match self.rules.borrow().iter().find(|r| (r.matches)(&call)) {
            Some(rule) => Err(rule.error.clone()),
            None => Ok(()),
        }
    }
}

impl<S: RecordStore> RecordStore for Scripted<S> {
    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        self.enter(Call::Query { table: table.to_string() })?;
        self.inner.query(table, query).await
    }

    async fn insert(&self, table: &str, r: Row) -> Result<Row, StoreError> {
        self.enter(Call::Insert { table: table.to_string(), row: r.clone() })?;
        self.inner.insert(table, r).await
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
        self.enter(Call::Update { table: table.to_string() })?;
        self.inner.update(table, filters, patch).await
    }

    async fn call_procedure(&self, name: &str, args: Value) -> Result<Value, StoreError> {
        self.enter(Call::Procedure { name: name.to_string(), args: args.clone() })?;
        self.inner.call_procedure(name, args).await
    }
}

// --- FIXTURES ---

/// A backend with the tag tables; procedures only when asked for.
pub fn backend(with_procedures: bool) -> RosterDb {
    let db = RosterDb::new();
    let schema = TagSchema::default();
    let installed = if with_procedures {
        procedures::install(&db, &schema)
    } else {
        procedures::install_tables(&db, &schema)
    };
    installed.expect("install schema");
    db
}

pub fn add_entity(db: &RosterDb, id: &str, name: &str) {
    db.insert_row(
        "entities",
        row([("id", json!(id)), ("name", json!(name)), ("email", json!(format!("{}@example.com", id))), ("active", json!(true))]),
    )
    .expect("insert entity");
}

/// Assigns `tags` to `entity` straight through the procedures' tables.
pub fn assign(db: &RosterDb, entity: &str, tags: &[&str]) {
    for t in tags {
        let tag_id = match db.select("tags", &Query::new().eq("name", *t)).expect("tags").into_iter().next() {
            Some(r) => r["id"].clone(),
            None => db
                .insert_row("tags", row([("name", json!(t)), ("active", json!(true))]))
                .expect("insert tag")["id"]
                .clone(),
        };
        db.insert_row(
            "entity_tags",
            row([
                ("entity_id", json!(entity)),
                ("tag_id", tag_id),
                ("active", json!(true)),
                ("started_at", json!(1)),
                ("ended_at", Value::Null),
            ]),
        )
        .expect("insert assignment");
    }
}

pub fn assignment_rows(db: &RosterDb, entity: &str) -> Vec<Row> {
    db.select("entity_tags", &Query::new().eq("entity_id", entity)).expect("assignments")
}

/// Names of the tags actively assigned to `entity`, read straight from the
/// tables.
pub fn active_names(db: &RosterDb, entity: &str) -> BTreeSet<String> {
    let tags = db.select("tags", &Query::new()).expect("tags");
    assignment_rows(db, entity)
        .iter()
        .filter(|a| a["active"] == json!(true))
        .filter_map(|a| tags.iter().find(|t| t["id"] == a["tag_id"]))
        .filter_map(|t| t["name"].as_str().map(str::to_string))
        .collect()
}

pub fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}
