#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use reqwest::{Client, RequestBuilder, StatusCode};
use rusqlite::Connection;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use ordo::{create_app, db, AppState};

pub struct TestServer {
    pub addr: String,
    pub client: Client,
}

impl TestServer {
    pub async fn new() -> Self {
        let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
        db::migrate(&conn).expect("Failed to create tables");

        let state = AppState {
            db: Arc::new(Mutex::new(conn)),
            base_path: Arc::new(String::new()),
            session_days: 7,
        };
        let app = create_app(state);

        // Bind to random available port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = format!("http://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = Client::builder()
            .cookie_store(true)
            .build()
            .expect("Failed to create client");

        TestServer { addr, client }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Registers and logs in a user, returning a handle that authenticates with its bearer
    /// token only.
    pub async fn user(&self, name: &str) -> TestUser {
        let email = format!("{name}@example.com");
        let resp = self
            .client
            .post(self.url("/api/register"))
            .json(&json!({ "name": name, "email": email, "password": "password123" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = self
            .client
            .post(self.url("/api/login"))
            .json(&json!({ "email": email, "password": "password123" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();

        TestUser {
            addr: self.addr.clone(),
            token: body["token"].as_str().unwrap().to_string(),
            id: body["user"]["id"].as_i64().unwrap(),
            client: Client::new(),
        }
    }
}

pub struct TestUser {
    pub addr: String,
    pub token: String,
    pub id: i64,
    pub client: Client,
}

impl TestUser {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(&self.token)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(&self.token)
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.client.put(self.url(path)).bearer_auth(&self.token)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path)).bearer_auth(&self.token)
    }

    /// Creates a todo and returns its id together with the id of its initial detail.
    pub async fn create_todo(&self, title: &str) -> (i64, i64) {
        let resp = self
            .post("/api/todos")
            .json(&json!({ "title": title, "description": format!("{title} detail") }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let todo: Value = resp.json().await.unwrap();
        (
            todo["id"].as_i64().unwrap(),
            todo["todo_details"][0]["id"].as_i64().unwrap(),
        )
    }

    pub async fn create_detail(&self, todo_id: i64, description: &str) -> i64 {
        let resp = self
            .post("/api/tododetails")
            .json(&json!({ "todo_id": todo_id, "description": description }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let detail: Value = resp.json().await.unwrap();
        detail["id"].as_i64().unwrap()
    }

    pub async fn list(&self) -> Vec<Value> {
        let resp = self.get("/api/todos").send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        resp.json().await.unwrap()
    }

    pub async fn listed_ids(&self) -> Vec<i64> {
        ids(&self.list().await)
    }

    /// `(id, order)` of every active todo, in listing order.
    pub async fn listed_orders(&self) -> Vec<(i64, i64)> {
        self.list()
            .await
            .iter()
            .map(|t| (t["id"].as_i64().unwrap(), t["order"].as_i64().unwrap()))
            .collect()
    }
}

pub fn ids(items: &[Value]) -> Vec<i64> {
    items.iter().map(|item| item["id"].as_i64().unwrap()).collect()
}
