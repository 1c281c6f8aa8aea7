//! Server-side convenience procedures the reconciler prefers when the
//! backend offers them.

use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::StoreError;
use crate::filter::{Filter, Query};
use crate::model::{self, now_secs, row};
use crate::reconciler::listing;
use crate::reconciler::TagSchema;
use crate::RosterDb;

/// Creates the tag, assignment and entity tables with their constraints.
pub fn install_tables(db: &RosterDb, schema: &TagSchema) -> Result<(), StoreError> {
    db.create_table(&schema.tags_table, &[&[schema.name_column.as_str()]])?;
    db.create_table(
        &schema.assignments_table,
        &[&[schema.entity_column.as_str(), schema.tag_column.as_str()]],
    )?;
    db.create_table(&schema.entities_table, &[])?;
    Ok(())
}

/// Tables plus every procedure named in `schema`.
pub fn install(db: &RosterDb, schema: &TagSchema) -> Result<(), StoreError> {
    install_tables(db, schema)?;

    if let Some(name) = &schema.upsert_procedure {
        let s = schema.clone();
        db.register_procedure(name, Arc::new(move |db: &RosterDb, args: &Value| upsert(db, &s, args)))?;
    }
    if let Some(name) = &schema.deactivate_procedure {
        let s = schema.clone();
        db.register_procedure(name, Arc::new(move |db: &RosterDb, args: &Value| deactivate(db, &s, args)))?;
    }
    if let Some(name) = &schema.listing_procedure {
        let s = schema.clone();
        db.register_procedure(name, Arc::new(move |db: &RosterDb, _: &Value| list(db, &s)))?;
    }
    Ok(())
}

fn arg<'a>(args: &'a Value, name: &str) -> Result<&'a str, StoreError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::rejected("22023", format!("missing argument '{}'", name)))
}

fn find_tag(db: &RosterDb, s: &TagSchema, name: &str) -> Result<Option<model::Row>, StoreError> {
    let q = Query::new().eq(&s.name_column, name).limit(1);
    Ok(db.select(&s.tags_table, &q)?.into_iter().next())
}

fn upsert(db: &RosterDb, s: &TagSchema, args: &Value) -> Result<Value, StoreError> {
    let entity_id = arg(args, "entity_id")?;
    let tag_name = arg(args, "tag_name")?;
    let now = now_secs();

    let tag = match find_tag(db, s, tag_name)? {
        Some(t) => {
            if !model::flag(&t, &s.active_column) {
                db.update_rows(
                    &s.tags_table,
                    &[Filter::eq("id", t["id"].clone())],
                    &row([(s.active_column.as_str(), json!(true))]),
                )?;
            }
            t
        }
        None => db.insert_row(
            &s.tags_table,
            row([(s.name_column.as_str(), json!(tag_name)), (s.active_column.as_str(), json!(true))]),
        )?,
    };
    let tag_id = tag["id"].clone();

    let pair = [Filter::eq(&s.entity_column, entity_id), Filter::eq(&s.tag_column, tag_id.clone())];
    let existing = db.select(&s.assignments_table, &Query { filters: pair.to_vec(), ..Query::default() })?;

    match existing.first() {
        Some(a) if model::flag(a, &s.active_column) => {}
        Some(_) => {
            db.update_rows(
                &s.assignments_table,
                &pair,
                &row([
                    (s.active_column.as_str(), json!(true)),
                    (s.ended_column.as_str(), Value::Null),
                    (s.updated_column.as_str(), json!(now)),
                ]),
            )?;
        }
        None => {
            db.insert_row(
                &s.assignments_table,
                row([
                    (s.entity_column.as_str(), json!(entity_id)),
                    (s.tag_column.as_str(), tag_id),
                    (s.active_column.as_str(), json!(true)),
                    (s.started_column.as_str(), json!(now)),
                    (s.ended_column.as_str(), Value::Null),
                    (s.updated_column.as_str(), json!(now)),
                ]),
            )?;
        }
    }
    Ok(Value::Bool(true))
}

fn deactivate(db: &RosterDb, s: &TagSchema, args: &Value) -> Result<Value, StoreError> {
    let entity_id = arg(args, "entity_id")?;
    let tag_name = arg(args, "tag_name")?;

    let Some(tag) = find_tag(db, s, tag_name)? else {
        return Ok(Value::Bool(true));
    };

    let now = now_secs();
    let res = db.update_rows(
        &s.assignments_table,
        &[
            Filter::eq(&s.entity_column, entity_id),
            Filter::eq(&s.tag_column, tag["id"].clone()),
            Filter::eq(&s.active_column, true),
        ],
        &row([
            (s.active_column.as_str(), json!(false)),
            (s.ended_column.as_str(), json!(now)),
            (s.updated_column.as_str(), json!(now)),
        ]),
    );
    match res {
        Ok(_) => Ok(Value::Bool(true)),
        Err(e) if e.is_not_found() => Ok(Value::Bool(true)),
        Err(e) => Err(e),
    }
}

fn list(db: &RosterDb, s: &TagSchema) -> Result<Value, StoreError> {
    let entities = db.select(&s.entities_table, &Query::new().eq(&s.active_column, true))?;
    let assignments = db.select(&s.assignments_table, &Query::new().eq(&s.active_column, true))?;
    let tags = db.select(&s.tags_table, &Query::new())?;

    let listing = listing::assemble(s, &entities, &assignments, &tags);
    serde_json::to_value(listing).map_err(|e| StoreError::rejected("encode", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> RosterDb {
        let db = RosterDb::new();
        install(&db, &TagSchema::default()).unwrap();
        db
    }

    fn active_rows(db: &RosterDb) -> usize {
        db.select("entity_tags", &Query::new().eq("active", true)).unwrap().len()
    }

    #[test]
    fn upsert_twice_keeps_one_active_row() {
        let db = db();
        let args = json!({ "entity_id": "e1", "tag_name": "cliente" });
        assert_eq!(db.call("upsert_entity_tag", &args).unwrap(), json!(true));
        assert_eq!(db.call("upsert_entity_tag", &args).unwrap(), json!(true));
        assert_eq!(active_rows(&db), 1);
    }

    #[test]
    fn deactivate_then_upsert_reuses_row() {
        let db = db();
        let args = json!({ "entity_id": "e1", "tag_name": "cliente" });
        db.call("upsert_entity_tag", &args).unwrap();
        db.call("deactivate_entity_tag", &args).unwrap();
        assert_eq!(active_rows(&db), 0);

        db.call("upsert_entity_tag", &args).unwrap();
        let all = db.select("entity_tags", &Query::new()).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0]["ended_at"].is_null());
    }

    #[test]
    fn deactivate_unknown_tag_succeeds() {
        let db = db();
        let args = json!({ "entity_id": "e1", "tag_name": "ghost" });
        assert_eq!(db.call("deactivate_entity_tag", &args).unwrap(), json!(true));
    }

    #[test]
    fn missing_argument_is_rejected() {
        let db = db();
        let err = db.call("upsert_entity_tag", &json!({ "entity_id": "e1" })).unwrap_err();
        assert!(matches!(err, StoreError::Rejected { .. }));
    }

    #[test]
    fn tables_only_install_has_no_procedures() {
        let db = RosterDb::new();
        install_tables(&db, &TagSchema::default()).unwrap();
        assert!(!db.has_procedure("upsert_entity_tag"));
    }
}
