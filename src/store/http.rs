//! TypeDB HTTP store
//!
//! Talks to a TypeDB 3 server through its HTTP API:
//!
//! ```text
//! POST   /v1/signin                         -> bearer token
//! GET    /v1/databases/{name}               existence check
//! POST   /v1/databases/{name}               create
//! DELETE /v1/databases/{name}               drop
//! POST   /v1/transactions/open              -> transactionId
//! POST   /v1/transactions/{id}/query        -> answers
//! POST   /v1/transactions/{id}/commit|rollback|close
//! ```
//!
//! The token is fetched lazily and refreshed once when a request comes back
//! unauthorized.

use super::{Store, Transaction};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Store backed by a TypeDB server
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Arc<Client>,
}

#[derive(Debug)]
struct Client {
    http: reqwest::Client,
    base: String,
    address: String,
    database: String,
    username: String,
    password: String,
    token: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct SignIn {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenTransaction {
    transaction_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryAnswer {
    answer_type: String,
    #[serde(default)]
    answers: Vec<serde_json::Value>,
}

impl QueryAnswer {
    /// Rows a write pipeline produced; `ok` answers carry no rows but succeeded
    fn rows(&self) -> usize {
        match self.answer_type.as_str() {
            "ok" => 1,
            _ => self.answers.len(),
        }
    }
}

/// `http://host:port` for a configured address, without a trailing slash
fn base_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

impl HttpStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            client: Arc::new(Client {
                http: reqwest::Client::new(),
                base: base_url(&config.address),
                address: config.address.clone(),
                database: config.database.clone(),
                username: config.username.clone(),
                password: config.password.clone(),
                token: RwLock::new(None),
            }),
        }
    }
}

impl Client {
    fn connection(&self, err: reqwest::Error) -> Error {
        Error::Connection {
            address: self.address.clone(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    async fn sign_in(&self) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/v1/signin", self.base))
            .json(&json!({ "username": self.username, "password": self.password }))
            .send()
            .await
            .map_err(|e| self.connection(e))?;
        let response = ensure_success(response).await?;
        let body: SignIn = response.json().await.map_err(|e| self.connection(e))?;
        *self.token.write().await = Some(body.token.clone());
        tracing::debug!(address = %self.address, "signed in");
        Ok(body.token)
    }

    async fn token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.sign_in().await
    }

    async fn send(&self, method: Method, path: &str, body: Option<&serde_json::Value>) -> Result<reqwest::Response> {
        let mut retried = false;
        loop {
            let token = self.token().await?;
            let mut request = self
                .http
                .request(method.clone(), format!("{}{}", self.base, path))
                .bearer_auth(token);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await.map_err(|e| self.connection(e))?;
            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                *self.token.write().await = None;
                retried = true;
                continue;
            }
            return Ok(response);
        }
    }

    async fn call(&self, method: Method, path: &str, body: Option<&serde_json::Value>) -> Result<serde_json::Value> {
        let response = ensure_success(self.send(method, path, body).await?).await?;
        let text = response.text().await.map_err(|e| self.connection(e))?;
        if text.trim().is_empty() {
            Ok(serde_json::Value::Null)
        } else {
            Ok(serde_json::from_str(&text)?)
        }
    }

    async fn database_exists(&self) -> Result<bool> {
        let response = self
            .send(Method::GET, &format!("/v1/databases/{}", self.database), None)
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => ensure_success(response).await.map(|_| true),
        }
    }

    async fn open(&self, transaction_type: &str) -> Result<String> {
        let body = json!({ "databaseName": self.database, "transactionType": transaction_type });
        let opened: OpenTransaction =
            serde_json::from_value(self.call(Method::POST, "/v1/transactions/open", Some(&body)).await?)?;
        Ok(opened.transaction_id)
    }

    async fn query(&self, transaction: &str, query: &str) -> Result<QueryAnswer> {
        let body = json!({ "query": query });
        let answer = self
            .call(Method::POST, &format!("/v1/transactions/{}/query", transaction), Some(&body))
            .await?;
        Ok(serde_json::from_value(answer)?)
    }

    async fn finish(&self, transaction: &str, action: &str) -> Result<()> {
        self.call(Method::POST, &format!("/v1/transactions/{}/{}", transaction, action), None)
            .await
            .map(|_| ())
    }

    /// Close a transaction whose outcome is already decided; failures are logged
    async fn close(&self, transaction: &str) -> bool {
        match self.finish(transaction, "close").await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(transaction, error = %e, "failed to close transaction");
                false
            }
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Store {
        message: format!("{}: {}", status, body.trim()),
    })
}

/// Store errors inside a transaction are transaction failures
fn in_transaction(err: Error) -> Error {
    match err {
        Error::Store { message } => Error::Transaction { message },
        other => other,
    }
}

#[async_trait]
impl Store for HttpStore {
    async fn setup(&self, schema: &[String], force: bool) -> Result<()> {
        let client = &self.client;
        let path = format!("/v1/databases/{}", client.database);

        if client.database_exists().await? {
            if !force {
                return Err(Error::Store {
                    message: format!("database '{}' already exists (use --force to recreate it)", client.database),
                });
            }
            client.call(Method::DELETE, &path, None).await?;
            tracing::info!(database = %client.database, "dropped database");
        }
        client.call(Method::POST, &path, None).await?;
        tracing::info!(database = %client.database, "created database");

        let transaction = client.open("schema").await?;
        for definition in schema {
            if let Err(e) = client.query(&transaction, definition).await {
                client.close(&transaction).await;
                return Err(in_transaction(e));
            }
        }
        client.finish(&transaction, "commit").await.map_err(in_transaction)?;
        tracing::info!(definitions = schema.len(), "schema defined");
        Ok(())
    }

    async fn begin_write(&self) -> Result<Box<dyn Transaction>> {
        let id = self.client.open("write").await?;
        Ok(Box::new(HttpTransaction {
            client: Arc::clone(&self.client),
            id,
        }))
    }

    async fn fetch(&self, query: &str) -> Result<Option<serde_json::Value>> {
        let transaction = self.client.open("read").await?;
        let answer = self.client.query(&transaction, query).await;
        self.client.close(&transaction).await;
        let answer = answer.map_err(in_transaction)?;
        Ok(answer.answers.into_iter().next())
    }
}

struct HttpTransaction {
    client: Arc<Client>,
    id: String,
}

#[async_trait]
impl Transaction for HttpTransaction {
    async fn query(&mut self, query: &str) -> Result<usize> {
        let answer = self.client.query(&self.id, query).await.map_err(in_transaction)?;
        Ok(answer.rows())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.client.finish(&self.id, "commit").await.map_err(in_transaction)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.client.finish(&self.id, "rollback").await.map_err(in_transaction)?;
        self.client.finish(&self.id, "close").await.map_err(in_transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("localhost:8000"), "http://localhost:8000");
        assert_eq!(base_url("https://db.example:8000/"), "https://db.example:8000");
        assert_eq!(base_url(" http://10.0.0.1:8000 "), "http://10.0.0.1:8000");
    }

    #[test]
    fn test_answer_rows() {
        let rows: QueryAnswer = serde_json::from_value(json!({
            "queryType": "write",
            "answerType": "conceptRows",
            "answers": [{"data": {}}, {"data": {}}]
        }))
        .unwrap();
        assert_eq!(rows.rows(), 2);

        let empty: QueryAnswer = serde_json::from_value(json!({
            "queryType": "write",
            "answerType": "conceptRows",
            "answers": []
        }))
        .unwrap();
        assert_eq!(empty.rows(), 0);

        let ok: QueryAnswer = serde_json::from_value(json!({"queryType": "schema", "answerType": "ok"})).unwrap();
        assert_eq!(ok.rows(), 1);
    }

    #[test]
    fn test_store_errors_become_transaction_errors() {
        let err = in_transaction(Error::Store {
            message: "400: bad query".to_string(),
        });
        assert!(matches!(err, Error::Transaction { .. }));
    }

    #[tokio::test]
    async fn test_close_failure_is_not_raised() {
        let store = HttpStore::new(&StoreConfig {
            address: "127.0.0.1:1".to_string(),
            ..StoreConfig::default()
        });
        assert!(!store.client.close("tx-1").await);
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let store = HttpStore::new(&StoreConfig {
            address: "127.0.0.1:1".to_string(),
            ..StoreConfig::default()
        });
        let result = store.begin_write().await;
        assert!(matches!(result, Err(Error::Connection { .. })));
    }
}
