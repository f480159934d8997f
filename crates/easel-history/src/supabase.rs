use async_trait::async_trait;
use easel_config::HistoryConfig;
use reqwest::Response;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use url::Url;

use crate::{
    error::{HistoryError, Result},
    store::HistoryStore,
    types::{HistoryRecord, NewHistoryRecord},
};

/// History store over Supabase's PostgREST interface
#[derive(Clone)]
pub struct SupabaseHistoryStore {
    http: reqwest::Client,
    table_url: Url,
    api_key: SecretString,
    user_id: String,
}

#[derive(Serialize)]
struct InsertRow<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    record: &'a NewHistoryRecord,
}

/// PostgREST table endpoint under the project URL, keeping any base path
fn table_url(base: &Url, table: &str) -> Result<Url> {
    let joined = format!(
        "{}/rest/v1/{}",
        base.as_str().trim_end_matches('/'),
        table.trim_start_matches('/')
    );

    Url::parse(&joined).map_err(|e| HistoryError::InvalidUrl(e.to_string()))
}

impl SupabaseHistoryStore {
    /// Create a store for the configured project and table
    ///
    /// A random user id is generated when none is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the table URL
    /// is invalid
    pub fn new(config: &HistoryConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build().map_err(HistoryError::Request)?;

        let table_url = table_url(&config.url, &config.table)?;

        let user_id = config.user_id.clone().unwrap_or_else(|| {
            let generated = uuid::Uuid::new_v4().to_string();
            tracing::info!(user_id = %generated, "no history user id configured, generated one");
            generated
        });

        Ok(Self {
            http,
            table_url,
            api_key: config.api_key.clone(),
            user_id,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let key = self.api_key.expose_secret();

        self.http
            .request(method, self.table_url.clone())
            .header("apikey", key)
            .bearer_auth(key)
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        tracing::error!(status, "history store request failed");
        Err(HistoryError::Api { status, message })
    }
}

#[async_trait]
impl HistoryStore for SupabaseHistoryStore {
    async fn save(&self, record: NewHistoryRecord) -> Result<HistoryRecord> {
        let row = InsertRow {
            user_id: &self.user_id,
            record: &record,
        };

        tracing::debug!(model = %record.model_id, "saving history record");

        let response = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;

        let mut rows: Vec<HistoryRecord> = ensure_success(response).await?.json().await?;

        if rows.is_empty() {
            return Err(HistoryError::EmptyInsert);
        }

        Ok(rows.swap_remove(0))
    }

    async fn fetch(&self) -> Result<Vec<HistoryRecord>> {
        let user_filter = format!("eq.{}", self.user_id);

        let response = self
            .request(reqwest::Method::GET)
            .query(&[
                ("select", "*"),
                ("user_id", user_filter.as_str()),
                ("order", "created_at.desc"),
            ])
            .send()
            .await?;

        let records: Vec<HistoryRecord> = ensure_success(response).await?.json().await?;

        tracing::debug!(count = records.len(), "fetched history records");

        Ok(records)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id_filter = format!("eq.{id}");
        let user_filter = format!("eq.{}", self.user_id);

        let response = self
            .request(reqwest::Method::DELETE)
            .query(&[("id", id_filter.as_str()), ("user_id", user_filter.as_str())])
            .send()
            .await?;

        ensure_success(response).await?;

        tracing::debug!(id, "deleted history record");

        Ok(())
    }
}

impl std::fmt::Debug for SupabaseHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseHistoryStore")
            .field("table_url", &self.table_url)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path, query_param},
    };

    use super::*;

    fn test_store(server: &MockServer) -> SupabaseHistoryStore {
        let config = HistoryConfig {
            url: Url::parse(&format!("{}/", server.uri())).unwrap(),
            api_key: SecretString::from("anon-key".to_owned()),
            table: "generation_history".to_owned(),
            user_id: Some("user-1".to_owned()),
        };

        SupabaseHistoryStore::new(&config).unwrap()
    }

    fn row(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": "user-1",
            "model_id": "gpt-image-1",
            "prompt": "a cat",
            "original_image_url": null,
            "result_image_url": "https://cdn/a.png",
            "width": 1024,
            "height": 1024,
            "request_id": null,
            "seed": null,
            "created_at": "2026-01-01T00:00:00+00:00"
        })
    }

    #[tokio::test]
    async fn save_posts_row_with_owner() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/generation_history"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .and(header("prefer", "return=representation"))
            .and(body_json(json!([{
                "user_id": "user-1",
                "model_id": "gpt-image-1",
                "prompt": "a cat",
                "result_image_url": "https://cdn/a.png",
                "width": 1024,
                "height": 1024
            }])))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([row("rec-1")])))
            .expect(1)
            .mount(&server)
            .await;

        let record = NewHistoryRecord {
            model_id: "gpt-image-1".to_owned(),
            prompt: Some("a cat".to_owned()),
            original_image_url: None,
            result_image_url: "https://cdn/a.png".to_owned(),
            width: Some(1024),
            height: Some(1024),
            request_id: None,
            seed: None,
        };

        let saved = test_store(&server).save(record).await.unwrap();
        assert_eq!(saved.id, "rec-1");
        assert_eq!(saved.user_id, "user-1");
    }

    #[tokio::test]
    async fn fetch_orders_newest_first_for_user() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/generation_history"))
            .and(query_param("select", "*"))
            .and(query_param("order", "created_at.desc"))
            .and(query_param("user_id", "eq.user-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row("rec-2"), row("rec-1")])))
            .mount(&server)
            .await;

        let records = test_store(&server).fetch().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "rec-2");
    }

    #[tokio::test]
    async fn delete_filters_by_id() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/rest/v1/generation_history"))
            .and(query_param("id", "eq.rec-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        test_store(&server).delete("rec-1").await.unwrap();
    }

    #[tokio::test]
    async fn non_success_is_an_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/generation_history"))
            .respond_with(ResponseTemplate::new(401).set_body_string("JWT expired"))
            .mount(&server)
            .await;

        let err = test_store(&server).fetch().await.unwrap_err();

        match err {
            HistoryError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "JWT expired");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn table_url_keeps_base_path() {
        for base in ["https://proxy.example/supabase", "https://proxy.example/supabase/"] {
            let url = table_url(&Url::parse(base).unwrap(), "generation_history").unwrap();
            assert_eq!(url.as_str(), "https://proxy.example/supabase/rest/v1/generation_history");
        }
    }

    #[test]
    fn generates_user_id_when_absent() {
        let config = HistoryConfig {
            url: Url::parse("https://project.supabase.co").unwrap(),
            api_key: SecretString::from("anon-key".to_owned()),
            table: "generation_history".to_owned(),
            user_id: None,
        };

        let store = SupabaseHistoryStore::new(&config).unwrap();
        assert!(uuid::Uuid::parse_str(store.user_id()).is_ok());
        assert_eq!(
            store.table_url.as_str(),
            "https://project.supabase.co/rest/v1/generation_history"
        );
    }
}
