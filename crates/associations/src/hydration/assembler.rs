//! Result assembler - folds flat joined rows into instance trees

use serde_json::Value;
use std::collections::HashMap;

use super::instance::{Instance, Loaded};
use crate::plan::node::{IncludeNode, JoinRole, SelectPlan, PATH_SEPARATOR};
use crate::record::{Key, Record, Row};

/// Builds instances from the rows of one or more statements of a plan.
///
/// Rows are deduplicated by primary key on every level, so the outer and
/// second-pass rows of a sub-query plan can be fed in one after another.
pub struct ResultAssembler<'a> {
    plan: &'a SelectPlan,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(plan: &'a SelectPlan) -> Self {
        Self { plan }
    }

    pub fn assemble(&self, rows: Vec<Row>) -> Vec<Instance> {
        let mut instances: Vec<Instance> = Vec::new();
        let mut positions: HashMap<Key, usize> = HashMap::new();

        for row in rows {
            let values = root_values(&row);
            let key = values
                .get(&self.plan.primary_key)
                .map(Key::from)
                .unwrap_or(Key::Null);

            let position = match positions.get(&key) {
                Some(position) if !key.is_null() => *position,
                _ => {
                    let record = Record::new(self.plan.model, values);
                    instances.push(Instance::with_includes(record, &self.plan.includes));
                    let position = instances.len() - 1;
                    if !key.is_null() {
                        positions.insert(key, position);
                    }
                    position
                }
            };

            merge_includes(&mut instances[position], &self.plan.includes, &row, None);
        }

        instances
    }
}

fn merge_includes(instance: &mut Instance, nodes: &[IncludeNode], row: &Row, parent_path: Option<&str>) {
    for node in nodes {
        if node.separate || node.role == JoinRole::Filter {
            continue;
        }
        let path = node.path(parent_path);
        let Some(values) = prefixed_values(row, &path) else {
            continue;
        };
        let key = values.get(&node.primary_key).map(Key::from).unwrap_or(Key::Null);
        let through = node.through.as_ref().and_then(|through| {
            prefixed_values(row, &format!("{}{}{}", path, PATH_SEPARATOR, through.name))
        });

        let loaded = instance
            .associations
            .entry(node.alias.clone())
            .or_insert_with(|| Loaded::empty(node.is_multi()));

        let child = match loaded {
            Loaded::Many(children) => {
                let existing = if key.is_null() {
                    None
                } else {
                    children.iter().position(|child| child.key(&node.primary_key) == key)
                };
                match existing {
                    Some(position) => &mut children[position],
                    None => {
                        children.push(new_child(node, values, through));
                        let last = children.len() - 1;
                        &mut children[last]
                    }
                }
            }
            Loaded::One(slot) => &mut **slot.get_or_insert_with(|| Box::new(new_child(node, values, through))),
        };

        merge_includes(child, &node.children, row, Some(&path));
    }
}

fn new_child(node: &IncludeNode, values: Row, through: Option<Row>) -> Instance {
    let mut child = Instance::with_includes(Record::new(node.model, values), &node.children);
    child.through = through;
    child
}

/// Root columns: keys without a path prefix
fn root_values(row: &Row) -> Row {
    row.iter()
        .filter(|(key, _)| !key.contains('.'))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Columns under `path`, or `None` when the join found nothing
fn prefixed_values(row: &Row, path: &str) -> Option<Row> {
    let prefix = format!("{}.", path);
    let values: Row = row
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(&prefix)
                .map(|column| (column.to_string(), value.clone()))
        })
        .collect();
    if values.values().all(Value::is_null) {
        None
    } else {
        Some(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::associations::options::AssociationOptions;
    use crate::include::Include;
    use crate::plan::{FindOptions, PlanBuilder};
    use crate::schema::attribute::{AttributeDef, DataType};
    use crate::schema::{ModelId, ModelOptions, ModelRegistry};
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn plan() -> (ModelRegistry, SelectPlan) {
        let mut registry = ModelRegistry::new();
        let team = registry
            .define(
                "Team",
                vec![("name", AttributeDef::new(DataType::String))],
                ModelOptions::default(),
            )
            .unwrap();
        let member = registry
            .define("Member", Vec::<(&str, AttributeDef)>::new(), ModelOptions::default())
            .unwrap();
        let clearance = registry
            .define("Clearance", Vec::<(&str, AttributeDef)>::new(), ModelOptions::default())
            .unwrap();
        let tag = registry
            .define("Tag", Vec::<(&str, AttributeDef)>::new(), ModelOptions::default())
            .unwrap();
        registry
            .has_many(team, member, AssociationOptions::new().alias("Members"))
            .unwrap();
        registry.has_one(member, clearance, AssociationOptions::new()).unwrap();
        registry
            .belongs_to_many(team, tag, AssociationOptions::new().through("TeamTags"))
            .unwrap();
        let plan = PlanBuilder::new(&registry)
            .build(
                team,
                &FindOptions::new()
                    .include(Include::alias("Members").include("Clearance"))
                    .include("Tags"),
            )
            .unwrap();
        (registry, plan)
    }

    #[test]
    fn test_rows_are_deduplicated_per_level() {
        let (_registry, plan) = plan();
        let rows = vec![
            row(json!({"id": 1, "name": "a", "Members.id": 10, "Members->Clearance.id": 100, "Tags.id": 7, "Tags->TeamTags.TeamId": 1})),
            row(json!({"id": 1, "name": "a", "Members.id": 11, "Members->Clearance.id": null, "Tags.id": 7, "Tags->TeamTags.TeamId": 1})),
            row(json!({"id": 1, "name": "a", "Members.id": 10, "Members->Clearance.id": 100, "Tags.id": 8, "Tags->TeamTags.TeamId": 1})),
            row(json!({"id": 2, "name": "b", "Members.id": null, "Members->Clearance.id": null, "Tags.id": null})),
        ];

        let instances = ResultAssembler::new(&plan).assemble(rows);
        assert_eq!(instances.len(), 2);

        let first = &instances[0];
        let members = first.many("Members");
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].one("Clearance").unwrap().key("id"), Key::Int(100));
        assert!(members[1].one("Clearance").is_none());
        assert!(matches!(members[1].loaded("Clearance"), Some(Loaded::One(None))));
        let tags = first.many("Tags");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].through.as_ref().unwrap()["TeamId"], json!(1));

        let second = &instances[1];
        assert!(matches!(second.loaded("Members"), Some(Loaded::Many(m)) if m.is_empty()));
        assert!(second.many("Tags").is_empty());
    }

    #[test]
    fn test_second_pass_rows_merge_into_outer_rows() {
        let (_registry, plan) = plan();
        let outer = vec![row(json!({"id": 2, "name": "b"})), row(json!({"id": 1, "name": "a"}))];
        let second = vec![
            row(json!({"id": 1, "name": "a", "Members.id": 10})),
            row(json!({"id": 2, "name": "b", "Members.id": 12})),
        ];

        let mut rows = outer;
        rows.extend(second);
        let instances = ResultAssembler::new(&plan).assemble(rows);
        let ids: Vec<Key> = instances.iter().map(|i| i.key("id")).collect();
        assert_eq!(ids, vec![Key::Int(2), Key::Int(1)]);
        assert_eq!(instances[0].many("Members")[0].key("id"), Key::Int(12));
        assert_eq!(instances[0].model(), ModelId::from_index(0));
    }
}
