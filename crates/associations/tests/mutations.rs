mod support;

use serde_json::json;
use support::{init_tracing, row, MemoryExecutor, Statement};

use elif_associations::{
    AssociationConfig, AssociationError, AssociationOptions, Associations, AttributeDef, DataType, GetOptions,
    ModelId, ModelOptions, ModelRegistry, QueryOptions, Record, Target, TransactionHandle,
    WhereCondition,
};

fn define(registry: &mut ModelRegistry, name: &str, attribute: &str) -> ModelId {
    registry
        .define(
            name,
            vec![(attribute, AttributeDef::new(DataType::String))],
            ModelOptions::default(),
        )
        .unwrap()
}

struct Tasks {
    registry: ModelRegistry,
    user: ModelId,
    task: ModelId,
}

fn tasks() -> Tasks {
    let mut registry = ModelRegistry::new();
    let user = define(&mut registry, "User", "name");
    let task = define(&mut registry, "Task", "title");
    registry
        .has_many(user, task, AssociationOptions::new().foreign_key("userId"))
        .unwrap();
    Tasks { registry, user, task }
}

fn seeded_tasks(t: &Tasks) -> MemoryExecutor {
    init_tracing();
    let executor = MemoryExecutor::new(&t.registry);
    executor.seed(t.user, vec![json!({"id": 1, "name": "ada"})]);
    executor.seed(
        t.task,
        vec![
            json!({"id": 1, "title": "a", "userId": null}),
            json!({"id": 2, "title": "b", "userId": null}),
            json!({"id": 3, "title": "c", "userId": null}),
        ],
    );
    executor
}

fn owner(executor: &MemoryExecutor, model: ModelId, id: i64, column: &str) -> serde_json::Value {
    executor.find(model, id).unwrap()[column].clone()
}

#[tokio::test]
async fn test_set_has_many_releases_and_points_in_two_statements() {
    let t = tasks();
    let executor = seeded_tasks(&t);
    let associations = Associations::new(&t.registry, &executor);
    let mut ada = Record::from_json(t.user, json!({"id": 1, "name": "ada"}));

    associations
        .set(&mut ada, "Tasks", Some(vec![Target::key(1), Target::key(2)]), &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(
        executor.writes(),
        vec![Statement::Update {
            model: t.task,
            values: row(json!({"userId": 1})),
            conditions: vec![WhereCondition::in_list("id", vec![json!(1), json!(2)])],
        }]
    );

    executor.clear_log();
    associations
        .set(&mut ada, "Tasks", Some(vec![Target::key(2), Target::key(3)]), &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(
        executor.writes(),
        vec![
            Statement::Update {
                model: t.task,
                values: row(json!({"userId": null})),
                conditions: vec![WhereCondition::eq("userId", 1), WhereCondition::eq("id", 1)],
            },
            Statement::Update {
                model: t.task,
                values: row(json!({"userId": 1})),
                conditions: vec![WhereCondition::eq("id", 3)],
            },
        ]
    );
    assert_eq!(owner(&executor, t.task, 1, "userId"), json!(null));
    assert_eq!(owner(&executor, t.task, 2, "userId"), json!(1));
    assert_eq!(owner(&executor, t.task, 3, "userId"), json!(1));

    let current = associations.get(&ada, "Tasks", &GetOptions::new()).await.unwrap();
    assert_eq!(current.len(), 2);
}

#[tokio::test]
async fn test_set_to_empty_or_none_clears() {
    let t = tasks();
    let executor = seeded_tasks(&t);
    let associations = Associations::new(&t.registry, &executor);
    let mut ada = Record::from_json(t.user, json!({"id": 1}));

    associations
        .set(&mut ada, "Tasks", Some(vec![Target::key(1), Target::key(2)]), &QueryOptions::new())
        .await
        .unwrap();
    associations
        .set(&mut ada, "Tasks", Some(Vec::new()), &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(associations.count(&ada, "Tasks", &GetOptions::new()).await.unwrap(), 0);

    associations
        .set(&mut ada, "Tasks", Some(vec![Target::key(3)]), &QueryOptions::new())
        .await
        .unwrap();
    associations
        .set(&mut ada, "Tasks", None, &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(associations.count(&ada, "Tasks", &GetOptions::new()).await.unwrap(), 0);
    assert_eq!(owner(&executor, t.task, 3, "userId"), json!(null));
}

#[tokio::test]
async fn test_add_and_remove_with_no_targets_issue_nothing() {
    let t = tasks();
    let executor = seeded_tasks(&t);
    let associations = Associations::new(&t.registry, &executor);
    let ada = Record::from_json(t.user, json!({"id": 1}));

    associations
        .add(&ada, "Tasks", Vec::new(), &QueryOptions::new())
        .await
        .unwrap();
    associations
        .remove(&ada, "Tasks", Vec::new(), &QueryOptions::new())
        .await
        .unwrap();
    assert!(executor.statements().is_empty());
}

#[tokio::test]
async fn test_add_and_remove_has_many() {
    let t = tasks();
    let executor = seeded_tasks(&t);
    let associations = Associations::new(&t.registry, &executor);
    let ada = Record::from_json(t.user, json!({"id": 1}));

    associations
        .add(&ada, "Tasks", vec![Target::key(1), Target::key(3)], &QueryOptions::new())
        .await
        .unwrap();
    assert!(associations.has(&ada, "Tasks", Target::key(3), &GetOptions::new()).await.unwrap());

    associations
        .remove(&ada, "Tasks", vec![Target::key(3)], &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(owner(&executor, t.task, 1, "userId"), json!(1));
    assert_eq!(owner(&executor, t.task, 3, "userId"), json!(null));
}

struct Memberships {
    registry: ModelRegistry,
    user: ModelId,
    membership: ModelId,
}

fn memberships() -> (Memberships, MemoryExecutor) {
    let mut registry = ModelRegistry::new();
    let user = define(&mut registry, "User", "name");
    let project = define(&mut registry, "Project", "title");
    let membership = define(&mut registry, "Membership", "role");
    registry
        .belongs_to_many(user, project, AssociationOptions::new().through("Membership"))
        .unwrap();

    init_tracing();
    let executor = MemoryExecutor::new(&registry);
    executor.seed(user, vec![json!({"id": 1, "name": "ada"})]);
    executor.seed(
        project,
        vec![
            json!({"id": 1, "title": "engine"}),
            json!({"id": 2, "title": "wings"}),
            json!({"id": 3, "title": "tail"}),
        ],
    );
    executor.seed(
        membership,
        vec![
            json!({"UserId": 1, "ProjectId": 1, "role": "a"}),
            json!({"UserId": 1, "ProjectId": 2, "role": "b"}),
        ],
    );
    (
        Memberships {
            registry,
            user,
            membership,
        },
        executor,
    )
}

fn role(role: &str) -> serde_json::Map<String, serde_json::Value> {
    row(json!({ "role": role }))
}

#[tokio::test]
async fn test_set_many_to_many_deletes_then_updates_then_inserts() {
    let (m, executor) = memberships();
    let associations = Associations::new(&m.registry, &executor);
    let mut ada = Record::from_json(m.user, json!({"id": 1}));

    associations
        .set(
            &mut ada,
            "Projects",
            Some(vec![
                Target::key(2).with_through(role("c")),
                Target::key(3).with_through(role("d")),
            ]),
            &QueryOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        executor.writes(),
        vec![
            Statement::Delete {
                model: m.membership,
                conditions: vec![WhereCondition::eq("UserId", 1), WhereCondition::eq("ProjectId", 1)],
            },
            Statement::Update {
                model: m.membership,
                values: role("c"),
                conditions: vec![WhereCondition::eq("UserId", 1), WhereCondition::eq("ProjectId", 2)],
            },
            Statement::Insert {
                model: m.membership,
                rows: vec![row(json!({"role": "d", "UserId": 1, "ProjectId": 3}))],
            },
        ]
    );

    let mut links = executor.rows(m.membership);
    links.sort_by_key(|link| link["ProjectId"].as_i64());
    assert_eq!(
        links,
        vec![
            row(json!({"UserId": 1, "ProjectId": 2, "role": "c"})),
            row(json!({"UserId": 1, "ProjectId": 3, "role": "d"})),
        ]
    );
}

#[tokio::test]
async fn test_add_many_to_many_skips_unchanged_links() {
    let (m, executor) = memberships();
    let associations = Associations::new(&m.registry, &executor);
    let ada = Record::from_json(m.user, json!({"id": 1}));

    associations
        .add(
            &ada,
            "Projects",
            vec![Target::key(2).with_through(role("b"))],
            &QueryOptions::new(),
        )
        .await
        .unwrap();
    assert!(executor.writes().is_empty());

    associations
        .add(&ada, "Projects", vec![Target::key(3)], &QueryOptions::new().through(role("guest")))
        .await
        .unwrap();
    assert_eq!(
        executor.writes(),
        vec![Statement::Insert {
            model: m.membership,
            rows: vec![row(json!({"role": "guest", "UserId": 1, "ProjectId": 3}))],
        }]
    );

    executor.clear_log();
    associations
        .remove(&ada, "Projects", vec![Target::key(1), Target::key(3)], &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(
        executor.writes(),
        vec![Statement::Delete {
            model: m.membership,
            conditions: vec![
                WhereCondition::eq("UserId", 1),
                WhereCondition::in_list("ProjectId", vec![json!(1), json!(3)]),
            ],
        }]
    );
    assert_eq!(executor.rows(m.membership).len(), 1);
}

#[tokio::test]
async fn test_set_has_one_moves_the_key() {
    let mut registry = ModelRegistry::new();
    let user = define(&mut registry, "User", "name");
    let profile = define(&mut registry, "Profile", "bio");
    registry.has_one(user, profile, AssociationOptions::new()).unwrap();

    let executor = MemoryExecutor::new(&registry);
    executor.seed(
        profile,
        vec![
            json!({"id": 1, "bio": "old", "UserId": 1}),
            json!({"id": 2, "bio": "new", "UserId": null}),
        ],
    );
    let associations = Associations::new(&registry, &executor);
    let mut ada = Record::from_json(user, json!({"id": 1}));

    associations
        .set(&mut ada, "Profile", Some(vec![Target::key(2)]), &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(executor.writes().len(), 2);
    assert_eq!(owner(&executor, profile, 1, "UserId"), json!(null));
    assert_eq!(owner(&executor, profile, 2, "UserId"), json!(1));

    let loaded = associations.get(&ada, "Profile", &GetOptions::new()).await.unwrap();
    assert_eq!(loaded.one().unwrap().get("bio"), Some(&json!("new")));

    let err = associations
        .set(&mut ada, "Profile", Some(vec![Target::key(1), Target::key(2)]), &QueryOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AssociationError::InvalidTarget(_)));
}

#[tokio::test]
async fn test_set_belongs_to_writes_the_source_key() {
    let mut registry = ModelRegistry::new();
    let user = define(&mut registry, "User", "name");
    let task = define(&mut registry, "Task", "title");
    registry
        .belongs_to(task, user, AssociationOptions::new().alias("owner"))
        .unwrap();

    let executor = MemoryExecutor::new(&registry);
    executor.seed(user, vec![json!({"id": 7, "name": "ada"})]);
    executor.seed(task, vec![json!({"id": 1, "title": "a", "ownerId": null})]);
    let associations = Associations::new(&registry, &executor);
    let mut chore = Record::from_json(task, json!({"id": 1, "title": "a"}));

    associations
        .set(&mut chore, "owner", Some(vec![Target::key(7)]), &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(chore.get("ownerId"), Some(&json!(7)));
    assert_eq!(
        executor.writes(),
        vec![Statement::Update {
            model: task,
            values: row(json!({"ownerId": 7})),
            conditions: vec![WhereCondition::eq("id", 1)],
        }]
    );
    let loaded = associations.get(&chore, "owner", &GetOptions::new()).await.unwrap();
    assert_eq!(loaded.one().unwrap().get("name"), Some(&json!("ada")));

    associations
        .set(&mut chore, "owner", None, &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(chore.get("ownerId"), Some(&json!(null)));

    let err = associations
        .add(&chore, "owner", vec![Target::key(7)], &QueryOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AssociationError::InvalidTarget(_)));
}

#[tokio::test]
async fn test_create_applies_key_and_scope() {
    let mut registry = ModelRegistry::new();
    let user = define(&mut registry, "User", "name");
    let task = define(&mut registry, "Task", "title");
    registry
        .has_many(
            user,
            task,
            AssociationOptions::new()
                .alias("chores")
                .foreign_key("userId")
                .scope(WhereCondition::eq("kind", "chore")),
        )
        .unwrap();

    let executor = MemoryExecutor::new(&registry);
    executor.seed(task, vec![json!({"id": 1, "title": "errand", "kind": "errand", "userId": 1})]);
    let associations = Associations::new(&registry, &executor);
    let mut ada = Record::from_json(user, json!({"id": 1}));

    let created = associations
        .create(&mut ada, "chores", row(json!({"title": "dishes"})), &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(created.get("id"), Some(&json!(2)));
    assert_eq!(
        executor.writes(),
        vec![Statement::Insert {
            model: task,
            rows: vec![row(json!({"title": "dishes", "userId": 1, "kind": "chore"}))],
        }]
    );

    let chores = associations.get(&ada, "chores", &GetOptions::new()).await.unwrap();
    assert_eq!(chores.len(), 1);
    let everything = associations
        .get(
            &ada,
            "chores",
            &GetOptions::new().query(QueryOptions::new().without_scope()),
        )
        .await
        .unwrap();
    assert_eq!(everything.len(), 2);
}

#[tokio::test]
async fn test_transaction_reaches_every_statement() {
    let (m, executor) = memberships();
    let associations = Associations::new(&m.registry, &executor);
    let mut ada = Record::from_json(m.user, json!({"id": 1}));
    let transaction = TransactionHandle::new("tx-1");
    let options = QueryOptions::new().transaction(transaction.clone());

    associations
        .set(&mut ada, "Projects", Some(vec![Target::key(2), Target::key(3)]), &options)
        .await
        .unwrap();
    associations
        .get(&ada, "Projects", &GetOptions::new().query(options.clone()))
        .await
        .unwrap();

    let logged = executor.logged();
    assert!(logged.len() >= 4);
    assert!(logged
        .iter()
        .all(|entry| entry.transaction.as_ref() == Some(&transaction)));
}

fn batched_registry() -> ModelRegistry {
    ModelRegistry::with_config(AssociationConfig::default().with_max_batch_size(2)).unwrap()
}

#[tokio::test]
async fn test_set_has_many_writes_in_key_chunks() {
    let mut registry = batched_registry();
    let user = define(&mut registry, "User", "name");
    let task = define(&mut registry, "Task", "title");
    registry.has_many(user, task, AssociationOptions::new()).unwrap();

    init_tracing();
    let executor = MemoryExecutor::new(&registry);
    executor.seed(user, vec![json!({"id": 1, "name": "ada"})]);
    for id in 1..=9 {
        let owner = if id > 7 { json!(1) } else { json!(null) };
        executor.seed(task, vec![json!({"id": id, "title": format!("t{}", id), "UserId": owner})]);
    }

    let associations = Associations::new(&registry, &executor);
    let mut ada = Record::from_json(user, json!({"id": 1}));
    associations
        .set(&mut ada, "Tasks", Some((1..=7).map(Target::key).collect()), &QueryOptions::new())
        .await
        .unwrap();

    let owned: Vec<i64> = executor
        .rows(task)
        .iter()
        .filter(|task| task["UserId"] == json!(1))
        .filter_map(|task| task["id"].as_i64())
        .collect();
    assert_eq!(owned, (1..=7).collect::<Vec<_>>());
    assert_eq!(executor.find(task, 8).unwrap()["UserId"], json!(null));

    // one release over tasks 8 and 9, then points over 2 + 2 + 2 + 1 keys
    let writes = executor.writes();
    assert_eq!(writes.len(), 5);
    assert!(writes.iter().all(|write| matches!(write, Statement::Update { .. })));
    assert_eq!(
        writes[4],
        Statement::Update {
            model: task,
            values: row(json!({"UserId": 1})),
            conditions: vec![WhereCondition::eq("id", 7)],
        }
    );
}

#[tokio::test]
async fn test_many_to_many_links_are_written_in_chunks() {
    let mut registry = batched_registry();
    let user = define(&mut registry, "User", "name");
    let project = define(&mut registry, "Project", "title");
    registry
        .belongs_to_many(user, project, AssociationOptions::new().through("Membership"))
        .unwrap();
    let membership = registry.lookup("Membership").unwrap();

    init_tracing();
    let executor = MemoryExecutor::new(&registry);
    executor.seed(user, vec![json!({"id": 1, "name": "ada"})]);
    for id in 1..=5 {
        executor.seed(project, vec![json!({"id": id, "title": format!("p{}", id)})]);
    }

    let associations = Associations::new(&registry, &executor);
    let ada = Record::from_json(user, json!({"id": 1}));
    associations
        .add(&ada, "Projects", (1..=5).map(Target::key).collect(), &QueryOptions::new())
        .await
        .unwrap();

    let inserted: Vec<usize> = executor
        .writes()
        .iter()
        .map(|write| match write {
            Statement::Insert { rows, .. } => rows.len(),
            other => panic!("expected an insert, got {:?}", other),
        })
        .collect();
    assert_eq!(inserted, vec![2, 2, 1]);
    assert_eq!(executor.rows(membership).len(), 5);
    assert_eq!(associations.count(&ada, "Projects", &GetOptions::new()).await.unwrap(), 5);

    executor.clear_log();
    associations
        .remove(&ada, "Projects", (1..=5).map(Target::key).collect(), &QueryOptions::new())
        .await
        .unwrap();
    let writes = executor.writes();
    assert_eq!(writes.len(), 3);
    assert!(writes.iter().all(|write| matches!(write, Statement::Delete { .. })));
    assert!(executor.rows(membership).is_empty());
}
