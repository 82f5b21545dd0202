//! The same persistence behaviour as the SQLite suites, checked against a real
//! Postgres. Needs Docker: `cargo test -p todos_server -- --ignored`.
use sea_orm::EntityTrait;
use todos_server::entities::account;
use todos_server::todo::{TodoService, TodoServiceError};

mod common;

#[tokio::test]
#[ignore = "needs Docker for the Postgres container"]
async fn lists_newest_first_on_timestamptz() {
    let pg = common::setup_postgres().await.expect("Failed to start Postgres");
    let ada = pg.ctx.sign_up("ada@example.com", None).await;
    for title in ["first", "second", "third"] {
        pg.ctx.add_todo(&ada, title).await;
    }

    let titles: Vec<String> = pg
        .ctx
        .todos_of(&ada)
        .await
        .into_iter()
        .map(|task| task.title)
        .collect();

    assert_eq!(titles, vec!["third", "second", "first"]);
}

#[tokio::test]
#[ignore = "needs Docker for the Postgres container"]
async fn completing_twice_still_counts_every_matched_row() {
    let pg = common::setup_postgres().await.expect("Failed to start Postgres");
    let ada = pg.ctx.sign_up("ada@example.com", None).await;
    let one = pg.ctx.add_todo(&ada, "one").await;
    let two = pg.ctx.add_todo(&ada, "two").await;
    let ids = vec![one.id.clone(), two.id.clone()];
    let service = TodoService::new(&pg.ctx.db);

    assert_eq!(service.set_completed(&ada.id, &ids, true).await.unwrap(), 2);
    assert_eq!(service.set_completed(&ada.id, &ids, true).await.unwrap(), 2);
    assert!(pg.ctx.todos_of(&ada).await.iter().all(|task| task.completed));
}

#[tokio::test]
#[ignore = "needs Docker for the Postgres container"]
async fn batch_with_foreign_id_is_rolled_back() {
    let pg = common::setup_postgres().await.expect("Failed to start Postgres");
    let ada = pg.ctx.sign_up("ada@example.com", None).await;
    let bob = pg.ctx.sign_up("bob@example.com", None).await;
    let mine = pg.ctx.add_todo(&ada, "mine").await;
    let theirs = pg.ctx.add_todo(&bob, "theirs").await;

    let result = TodoService::new(&pg.ctx.db)
        .delete_todos(&ada.id, &[mine.id.clone(), theirs.id.clone()])
        .await;

    assert!(matches!(
        result,
        Err(TodoServiceError::PartialBatch {
            requested: 2,
            affected: 1
        })
    ));
    assert_eq!(pg.ctx.todos_of(&ada).await.len(), 1);
    assert_eq!(pg.ctx.todos_of(&bob).await.len(), 1);
}

#[tokio::test]
#[ignore = "needs Docker for the Postgres container"]
async fn deleting_an_account_row_cascades_to_its_todos() {
    let pg = common::setup_postgres().await.expect("Failed to start Postgres");
    let ada = pg.ctx.sign_up("ada@example.com", None).await;
    let bob = pg.ctx.sign_up("bob@example.com", None).await;
    pg.ctx.add_todo(&ada, "gone with ada").await;
    pg.ctx.add_todo(&bob, "stays").await;

    account::Entity::delete_by_id(ada.id.clone())
        .exec(&pg.ctx.db)
        .await
        .unwrap();

    assert!(pg.ctx.todos_of(&ada).await.is_empty());
    assert_eq!(pg.ctx.todos_of(&bob).await.len(), 1);
}
