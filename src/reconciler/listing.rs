use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::{self, EntityWithTags, Row};
use super::TagSchema;

/// Joins entity, assignment and tag rows into the listing shown by the
/// bulk editors. Only active assignments count; entities keep their row
/// order and are de-duplicated by id.
pub fn assemble(schema: &TagSchema, entities: &[Row], assignments: &[Row], tags: &[Row]) -> Vec<EntityWithTags> {
    let tag_names: HashMap<String, String> = tags
        .iter()
        .filter_map(|t| Some((model::text(t, "id")?, model::text(t, &schema.name_column)?)))
        .collect();

    let mut by_entity: HashMap<String, BTreeSet<String>> = HashMap::new();
    for a in assignments.iter().filter(|a| model::flag(a, &schema.active_column)) {
        let (Some(entity), Some(tag)) = (model::text(a, &schema.entity_column), model::text(a, &schema.tag_column)) else {
            continue;
        };
        if let Some(name) = tag_names.get(&tag) {
            by_entity.entry(entity).or_default().insert(name.clone());
        }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(entities.len());
    for e in entities {
        let Some(id) = model::text(e, "id") else { continue };
        if !seen.insert(id.clone()) {
            continue;
        }
        out.push(EntityWithTags {
            name: model::text(e, &schema.name_column).unwrap_or_default(),
            email: model::text(e, "email"),
            phone: model::text(e, "phone"),
            document: model::text(e, "document"),
            active: model::flag(e, &schema.active_column),
            tags: by_entity.remove(&id).map(|s| s.into_iter().collect()).unwrap_or_default(),
            source: schema.entities_table.clone(),
            id,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::row;
    use serde_json::json;

    #[test]
    fn joins_active_assignments_only_and_dedupes() {
        let s = TagSchema::default();
        let entities = vec![
            row([("id", json!("e1")), ("name", json!("Acme")), ("active", json!(true))]),
            row([("id", json!("e1")), ("name", json!("Acme dup")), ("active", json!(true))]),
            row([("id", json!("e2")), ("name", json!("Bia")), ("active", json!(true))]),
        ];
        let tags = vec![
            row([("id", json!("t1")), ("name", json!("fornecedor"))]),
            row([("id", json!("t2")), ("name", json!("cliente"))]),
        ];
        let assignments = vec![
            row([("entity_id", json!("e1")), ("tag_id", json!("t1")), ("active", json!(true))]),
            row([("entity_id", json!("e1")), ("tag_id", json!("t2")), ("active", json!(true))]),
            row([("entity_id", json!("e2")), ("tag_id", json!("t2")), ("active", json!(false))]),
        ];

        let out = assemble(&s, &entities, &assignments, &tags);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "Acme");
        assert_eq!(out[0].tags, vec!["cliente", "fornecedor"]);
        assert!(out[1].tags.is_empty());
    }
}
