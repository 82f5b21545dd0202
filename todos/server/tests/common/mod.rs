#![allow(dead_code)]

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use chrono::NaiveDate;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::collections::BTreeMap;
use todos_core::{Account, NewTask, Priority, Task};
use todos_server::account::AccountService;
use todos_server::auth::{AUTH_COOKIE, encode_jwt};
use todos_server::config::Config;
use todos_server::todo::TodoService;
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use testcontainers_modules::{postgres, testcontainers};
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test_secret";

/// Test context backed by a private in-memory SQLite database.
pub struct TestContext {
    pub config: Config,
    pub db: DatabaseConnection,
}

impl TestContext {
    /// Full application router sharing this context's database.
    pub fn app(&self) -> axum::Router {
        todos_server::web::create_app(&self.config, self.db.clone())
    }

    pub async fn sign_up(&self, email: &str, full_name: Option<&str>) -> Account {
        AccountService::new(&self.db)
            .sign_up(email, "password123", full_name.map(str::to_string))
            .await
            .unwrap()
    }

    pub async fn admin(&self, email: &str) -> Account {
        AccountService::new(&self.db)
            .ensure_admin(email, "password123")
            .await
            .unwrap()
    }

    pub async fn add_todo(&self, owner: &Account, title: &str) -> Task {
        self.add_todo_with(owner, new_task(title)).await
    }

    pub async fn add_todo_with(&self, owner: &Account, new_task: NewTask) -> Task {
        TodoService::new(&self.db)
            .create_todo(&owner.id, new_task)
            .await
            .unwrap()
    }

    pub async fn todos_of(&self, owner: &Account) -> Vec<Task> {
        TodoService::new(&self.db).list_todos(&owner.id).await.unwrap()
    }
}

/// Setup function for tests. Every call gets an empty, migrated database.
pub async fn setup() -> anyhow::Result<TestContext> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let config = Config {
        db_url: "sqlite::memory:".to_string(),
        port: 8080,
        jwt_secret: JWT_SECRET.to_string(),
        admin_email: "admin@example.com".to_string(),
        admin_password: "password123".to_string(),
    };
    let db = todos_server::web::connect_database(&config.db_url).await?;
    Ok(TestContext { config, db })
}

/// Test context backed by a throwaway Postgres container. The container lives
/// as long as this value.
pub struct PostgresContext {
    pub container: testcontainers::ContainerAsync<postgres::Postgres>,
    pub ctx: TestContext,
}

/// Starts Postgres in Docker and migrates it. Suites using this are `#[ignore]`d
/// and run with `cargo test -- --ignored`.
pub async fn setup_postgres() -> anyhow::Result<PostgresContext> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let container = postgres::Postgres::default().start().await?;
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let config = Config {
        db_url: format!("postgres://postgres:postgres@{}:{}/postgres", host, port),
        port: 8080,
        jwt_secret: JWT_SECRET.to_string(),
        admin_email: "admin@example.com".to_string(),
        admin_password: "password123".to_string(),
    };
    let db = todos_server::web::connect_database(&config.db_url).await?;
    Ok(PostgresContext {
        container,
        ctx: TestContext { config, db },
    })
}

pub fn new_task(title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: None,
        due_date: None,
        category: None,
        priority: None,
    }
}

pub fn task_due(title: &str, due_date: NaiveDate) -> NewTask {
    NewTask {
        due_date: Some(due_date),
        ..new_task(title)
    }
}

pub fn task_in(title: &str, category: &str, priority: Option<Priority>) -> NewTask {
    NewTask {
        category: Some(category.to_string()),
        priority,
        ..new_task(title)
    }
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Session cookie header value for `account`.
pub async fn session_cookie(account: &Account) -> String {
    let token = encode_jwt(account.id.clone(), JWT_SECRET).await.unwrap();
    format!("{}={}", AUTH_COOKIE, token)
}

pub async fn bearer(account: &Account) -> String {
    let token = encode_jwt(account.id.clone(), JWT_SECRET).await.unwrap();
    format!("Bearer {}", token)
}

/// Collected response parts.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }

    /// Ids of todo rows rendered in the body, in display order.
    pub fn todo_ids(&self) -> Vec<String> {
        let pattern = regex::Regex::new(r#"data-todo-id="([^"]+)""#).unwrap();
        pattern
            .captures_iter(&self.body)
            .map(|captures| captures[1].to_string())
            .collect()
    }

    pub fn snapshot(&self, test_context: &str) -> HttpResponseSnapshot {
        HttpResponseSnapshot::new(self.status, &self.headers, test_context)
    }
}

pub async fn send(app: axum::Router, request: Request<Body>) -> TestResponse {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    TestResponse {
        status,
        headers,
        body: String::from_utf8(body.to_vec()).unwrap(),
    }
}

pub fn get(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("cookie", cookie)
        .body(Body::empty())
        .unwrap()
}

pub fn form(method: &str, uri: &str, cookie: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("cookie", cookie)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// HTTP response snapshot for testing endpoints. Only the status and the
/// navigation headers are kept, everything else varies between runs.
#[derive(Debug, Serialize)]
pub struct HttpResponseSnapshot {
    test_context: String,
    status: u16,
    headers: BTreeMap<String, String>,
}

impl HttpResponseSnapshot {
    pub fn new(status: StatusCode, headers: &HeaderMap, test_context: &str) -> Self {
        Self {
            test_context: test_context.to_string(),
            status: status.as_u16(),
            headers: navigation_headers(headers),
        }
    }
}

fn navigation_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let kept_headers = ["location", "hx-redirect"];

    headers
        .iter()
        .filter_map(|(name, value)| {
            let name_str = name.as_str().to_lowercase();
            if kept_headers.contains(&name_str.as_str()) {
                value.to_str().ok().map(|v| (name_str, v.to_string()))
            } else {
                None
            }
        })
        .collect()
}
