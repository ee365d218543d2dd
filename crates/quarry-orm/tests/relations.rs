//! Relation resolution end to end: derived statement text, batching, and the
//! merged shape of nested results.

mod common;

use serde_json::json;

use common::{row, MockRepository};
use quarry_orm::{execute_query, FieldSpec, OrmError, QueryRequest, RelationKind};

#[tokio::test]
async fn one_to_many_batches_all_parents_into_one_statement() {
    let request = QueryRequest {
        app_db: "appdb".to_string(),
        model_id: "author".to_string(),
        fields: vec![
            FieldSpec::column("id"),
            FieldSpec {
                field: "books".to_string(),
                field_type: Some(RelationKind::OneToMany),
                related_model_id: Some("book".to_string()),
                related_field: Some("author_id".to_string()),
                fields: Some(vec![FieldSpec::column("id"), FieldSpec::column("author_id")]),
                ..FieldSpec::default()
            },
        ],
        ..QueryRequest::default()
    };

    let parent_sql = "select id from appdb.author where 1=1 order by id asc limit 0,1000";
    let books_sql = "select id,author_id from appdb.book \
                     where (author_id in ('1','2')) order by id asc limit 0,1000";
    let repo = MockRepository::new()
        .with_response(
            parent_sql,
            vec![row(&[("id", json!("1"))]), row(&[("id", json!("2"))])],
        )
        .with_response(
            books_sql,
            vec![
                row(&[("id", json!("b1")), ("author_id", json!("1"))]),
                row(&[("id", json!("b2")), ("author_id", json!("1"))]),
                row(&[("id", json!("b3")), ("author_id", json!("2"))]),
            ],
        );

    let result = execute_query(&repo, &request, false).await.unwrap();

    assert_eq!(repo.statements(), vec![parent_sql, books_sql]);

    let first = result.list[0].get("books").unwrap().as_related().unwrap();
    assert_eq!(first.model_id, "book");
    assert_eq!(first.total, 2);
    let second = result.list[1].get("books").unwrap().as_related().unwrap();
    assert_eq!(second.total, 1);
    assert_eq!(
        second.list[0].get("id").unwrap().as_scalar().unwrap(),
        &json!("b3")
    );
}

#[tokio::test]
async fn many_to_many_costs_two_statements_beyond_the_parent_fetch() {
    let request = QueryRequest {
        app_db: "appdb".to_string(),
        model_id: "a".to_string(),
        fields: vec![
            FieldSpec::column("id"),
            FieldSpec {
                field: "bs".to_string(),
                field_type: Some(RelationKind::ManyToMany),
                related_model_id: Some("b".to_string()),
                fields: Some(vec![FieldSpec::column("id")]),
                ..FieldSpec::default()
            },
        ],
        ..QueryRequest::default()
    };

    let parent_sql = "select id from appdb.a where 1=1 order by id asc limit 0,1000";
    let junction_sql = "select a_id,b_id from appdb.a_b \
                        where (a_id in ('1','2')) order by id asc limit 0,1000";
    let far_sql = "select id from appdb.b \
                   where (id in ('10','11')) order by id asc limit 0,1000";
    let repo = MockRepository::new()
        .with_response(
            parent_sql,
            vec![row(&[("id", json!("1"))]), row(&[("id", json!("2"))])],
        )
        .with_response(
            junction_sql,
            vec![
                row(&[("a_id", json!("1")), ("b_id", json!("10"))]),
                row(&[("a_id", json!("1")), ("b_id", json!("11"))]),
            ],
        )
        .with_response(
            far_sql,
            vec![row(&[("id", json!("10"))]), row(&[("id", json!("11"))])],
        );

    let result = execute_query(&repo, &request, false).await.unwrap();

    assert_eq!(repo.statements(), vec![parent_sql, junction_sql, far_sql]);

    let linked = result.list[0].get("bs").unwrap().as_related().unwrap();
    assert_eq!(linked.model_id, "b");
    assert_eq!(linked.total, 2);
    assert_eq!(linked.list.len(), 2);
    assert!(result.list[1].get("bs").is_none());
}

#[tokio::test]
async fn many_to_one_replaces_foreign_keys_and_keeps_null_scalars() {
    let request = QueryRequest {
        app_db: "appdb".to_string(),
        model_id: "order".to_string(),
        fields: vec![
            FieldSpec::column("id"),
            FieldSpec {
                field: "customer_id".to_string(),
                field_type: Some(RelationKind::ManyToOne),
                related_model_id: Some("customer".to_string()),
                fields: Some(vec![FieldSpec::column("name")]),
                ..FieldSpec::default()
            },
        ],
        ..QueryRequest::default()
    };

    let parent_sql = "select id,customer_id from appdb.order where 1=1 \
                      order by id asc limit 0,1000";
    // The related id column is selected implicitly for the merge.
    let customer_sql = "select name,id from appdb.customer \
                        where (id in ('c1')) order by id asc limit 0,1000";
    let repo = MockRepository::new()
        .with_response(
            parent_sql,
            vec![
                row(&[("id", json!("1")), ("customer_id", json!("c1"))]),
                row(&[("id", json!("2")), ("customer_id", json!(null))]),
            ],
        )
        .with_response(
            customer_sql,
            vec![row(&[("id", json!("c1")), ("name", json!("Ada"))])],
        );

    let result = execute_query(&repo, &request, false).await.unwrap();

    let nested = result.list[0]
        .get("customer_id")
        .unwrap()
        .as_related()
        .unwrap();
    assert_eq!(nested.total, 1);
    assert_eq!(
        nested.list[0].get("name").unwrap().as_scalar().unwrap(),
        &json!("Ada")
    );
    assert_eq!(
        result.list[1].get("customer_id").unwrap().as_scalar(),
        Some(&json!(null))
    );
}

#[tokio::test]
async fn file_fields_resolve_from_the_attachment_store() {
    let request = QueryRequest {
        app_db: "appdb".to_string(),
        model_id: "report".to_string(),
        fields: vec![
            FieldSpec::column("id"),
            FieldSpec {
                field: "attachments".to_string(),
                field_type: Some(RelationKind::File),
                related_model_id: Some("core_file".to_string()),
                related_field: Some("owner_id".to_string()),
                fields: Some(vec![
                    FieldSpec::column("id"),
                    FieldSpec::column("owner_id"),
                    FieldSpec::column("path"),
                ]),
                ..FieldSpec::default()
            },
        ],
        ..QueryRequest::default()
    };

    let parent_sql = "select id from appdb.report where 1=1 order by id asc limit 0,1000";
    let file_sql = "select id,owner_id,path from appdb.core_file \
                    where (owner_id in ('r1')) order by id asc limit 0,1000";
    let repo = MockRepository::new()
        .with_response(parent_sql, vec![row(&[("id", json!("r1"))])])
        .with_response(
            file_sql,
            vec![row(&[
                ("id", json!("f1")),
                ("owner_id", json!("r1")),
                ("path", json!("/files/f1.pdf")),
            ])],
        );

    let result = execute_query(&repo, &request, false).await.unwrap();

    let attached = result.list[0]
        .get("attachments")
        .unwrap()
        .as_related()
        .unwrap();
    assert_eq!(attached.model_id, "core_file");
    assert_eq!(attached.total, 1);
    assert_eq!(
        attached.list[0].get("path").unwrap().as_scalar().unwrap(),
        &json!("/files/f1.pdf")
    );
}

#[tokio::test]
async fn relation_without_parent_keys_issues_no_statement() {
    let request = QueryRequest {
        app_db: "appdb".to_string(),
        model_id: "author".to_string(),
        fields: vec![
            FieldSpec::column("id"),
            FieldSpec {
                field: "books".to_string(),
                field_type: Some(RelationKind::OneToMany),
                related_model_id: Some("book".to_string()),
                related_field: Some("author_id".to_string()),
                fields: Some(vec![FieldSpec::column("id")]),
                ..FieldSpec::default()
            },
        ],
        ..QueryRequest::default()
    };

    let parent_sql = "select id from appdb.author where 1=1 order by id asc limit 0,1000";
    let repo = MockRepository::new().with_response(parent_sql, Vec::new());

    let result = execute_query(&repo, &request, false).await.unwrap();

    assert_eq!(result.total, 0);
    assert_eq!(repo.statements().len(), 1);
}

#[tokio::test]
async fn incomplete_relation_declarations_fail_validation() {
    // relatedField missing on a one2many declaration.
    let request = QueryRequest {
        app_db: "appdb".to_string(),
        model_id: "author".to_string(),
        fields: vec![
            FieldSpec::column("id"),
            FieldSpec {
                field: "books".to_string(),
                field_type: Some(RelationKind::OneToMany),
                related_model_id: Some("book".to_string()),
                fields: Some(vec![FieldSpec::column("id")]),
                ..FieldSpec::default()
            },
        ],
        ..QueryRequest::default()
    };

    let parent_sql = "select id from appdb.author where 1=1 order by id asc limit 0,1000";
    let repo = MockRepository::new().with_response(parent_sql, Vec::new());

    let err = execute_query(&repo, &request, false).await.unwrap_err();
    match err {
        OrmError::Validation(message) => {
            assert!(message.contains("books"), "message: {message}");
            assert!(message.contains("author"), "message: {message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}
