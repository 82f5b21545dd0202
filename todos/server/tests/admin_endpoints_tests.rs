use axum::http::StatusCode;
use todos_server::account::AccountService;

mod common;

use common::{form, get, send, session_cookie, task_in};

#[tokio::test]
async fn admin_sees_every_user() {
    let ctx = common::setup().await.unwrap();
    let admin = ctx.admin("root@example.com").await;
    ctx.sign_up("ada@example.com", Some("Ada Lovelace")).await;
    ctx.sign_up("bob@example.com", None).await;
    let cookie = session_cookie(&admin).await;

    let response = send(ctx.app(), get("/admin", &cookie)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Admin Panel"));
    assert!(response.body.contains("Ada Lovelace"));
    assert!(response.body.contains("bob@example.com"));
    assert!(response.body.contains("No name"));
    assert!(response.body.contains(">AL</span>"));
}

#[tokio::test]
async fn admin_cannot_act_on_own_account() {
    let ctx = common::setup().await.unwrap();
    let admin = ctx.admin("root@example.com").await;
    let cookie = session_cookie(&admin).await;

    let page = send(ctx.app(), get("/admin", &cookie)).await;
    assert!(!page
        .body
        .contains(&format!("/admin/users/{}/block", admin.id)));

    let response = send(
        ctx.app(),
        form("POST", &format!("/admin/users/{}/admin", admin.id), &cookie, ""),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.header("hx-retarget"), Some("#notice"));
    assert!(response.body.contains("Admins cannot change their own account"));
    assert!(AccountService::new(&ctx.db).get_account(&admin.id).await.unwrap().is_admin);
}

#[tokio::test]
async fn can_promote_block_and_delete_users() {
    let ctx = common::setup().await.unwrap();
    let admin = ctx.admin("root@example.com").await;
    let user = ctx.sign_up("user@example.com", None).await;
    ctx.add_todo(&user, "doomed").await;
    let cookie = session_cookie(&admin).await;

    let promoted = send(
        ctx.app(),
        form("POST", &format!("/admin/users/{}/admin", user.id), &cookie, ""),
    )
    .await;
    assert!(promoted.body.contains("User promoted to admin"));

    let demoted = send(
        ctx.app(),
        form("POST", &format!("/admin/users/{}/admin", user.id), &cookie, ""),
    )
    .await;
    assert!(demoted.body.contains("User removed from admin"));

    let blocked = send(
        ctx.app(),
        form("POST", &format!("/admin/users/{}/block", user.id), &cookie, ""),
    )
    .await;
    assert!(blocked.body.contains("User blocked"));
    assert!(blocked.body.contains("Unblock user"));

    let deleted = send(
        ctx.app(),
        form("DELETE", &format!("/admin/users/{}", user.id), &cookie, ""),
    )
    .await;
    assert!(deleted.body.contains("User deleted successfully"));
    assert!(!deleted.body.contains("user@example.com"));
    assert!(ctx.todos_of(&user).await.is_empty());
}

#[tokio::test]
async fn acting_on_missing_user_reports_not_found() {
    let ctx = common::setup().await.unwrap();
    let admin = ctx.admin("root@example.com").await;
    let cookie = session_cookie(&admin).await;

    let response = send(
        ctx.app(),
        form("POST", "/admin/users/missing/block", &cookie, ""),
    )
    .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body.contains("User not found"));
}

#[tokio::test]
async fn admin_views_user_todos_read_only() {
    let ctx = common::setup().await.unwrap();
    let admin = ctx.admin("root@example.com").await;
    let user = ctx.sign_up("user@example.com", Some("Ada")).await;
    let home = ctx.add_todo_with(&user, task_in("Clean", "Home", None)).await;
    ctx.add_todo_with(&user, task_in("Report", "Work", None)).await;
    let cookie = session_cookie(&admin).await;

    let response = send(
        ctx.app(),
        get(
            &format!("/admin/users/{}/todos?scope=pending&category=Home", user.id),
            &cookie,
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("user@example.com"));
    assert_eq!(response.todo_ids(), vec![home.id]);
    assert!(!response.body.contains(r#"name="selected""#));
    assert!(!response.body.contains("hx-delete"));
    assert!(!response.body.contains("Mark Complete"));
    assert!(response.body.contains(&format!(r#"action="/admin/users/{}/todos""#, user.id)));
}

#[tokio::test]
async fn unknown_user_todos_redirect_to_admin() {
    let ctx = common::setup().await.unwrap();
    let admin = ctx.admin("root@example.com").await;
    let cookie = session_cookie(&admin).await;

    let response = send(ctx.app(), get("/admin/users/missing/todos", &cookie)).await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), Some("/admin"));
}

#[tokio::test]
async fn can_assign_todo_to_user() {
    let ctx = common::setup().await.unwrap();
    let admin = ctx.admin("root@example.com").await;
    let user = ctx.sign_up("user@example.com", Some("Ada")).await;
    let cookie = session_cookie(&admin).await;

    let page = send(ctx.app(), get("/admin/assign", &cookie)).await;
    assert!(page.body.contains("Ada (user@example.com)"));

    let body = format!(
        "assignee_id={}&title=Review+PR&description=&due_date=&category=Work&priority=medium",
        user.id
    );
    let response = send(ctx.app(), form("POST", "/admin/assign", &cookie, &body)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Todo assigned to Ada successfully"));
    let todos = ctx.todos_of(&user).await;
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].title, "Review PR");
    assert_eq!(todos[0].owner_id, user.id);
    assert!(ctx.todos_of(&admin).await.is_empty());
}

#[tokio::test]
async fn assign_requires_a_user_and_a_title() {
    let ctx = common::setup().await.unwrap();
    let admin = ctx.admin("root@example.com").await;
    let cookie = session_cookie(&admin).await;

    let response = send(
        ctx.app(),
        form("POST", "/admin/assign", &cookie, "assignee_id=&title="),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("Please select a user"));
    assert!(response.body.contains("Title is required"));
}

#[tokio::test]
async fn blocked_users_cannot_receive_assignments() {
    let ctx = common::setup().await.unwrap();
    let admin = ctx.admin("root@example.com").await;
    let user = ctx.sign_up("user@example.com", None).await;
    AccountService::new(&ctx.db)
        .toggle_blocked(&admin.id, &user.id)
        .await
        .unwrap();
    let cookie = session_cookie(&admin).await;

    let body = format!("assignee_id={}&title=Nope", user.id);
    let response = send(ctx.app(), form("POST", "/admin/assign", &cookie, &body)).await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("Please select a user"));
    assert!(ctx.todos_of(&user).await.is_empty());
}
