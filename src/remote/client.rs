use crate::config::Config;
use crate::remote::types::{Category, Item, ItemPatch, NewCategory, NewItem, Profile};
use crate::remote::RemoteStore;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// PostgREST client for the inventory backend
#[derive(Clone)]
pub struct RestClient {
  http: reqwest::Client,
  base: Url,
}

impl RestClient {
  pub fn new(config: &Config) -> Result<Self> {
    let api_key = Config::get_api_key()?;
    let bearer = Config::get_access_token().unwrap_or_else(|| api_key.clone());

    let mut headers = HeaderMap::new();
    headers.insert(
      "apikey",
      HeaderValue::from_str(&api_key).map_err(|e| eyre!("Invalid API key: {}", e))?,
    );
    headers.insert(
      AUTHORIZATION,
      HeaderValue::from_str(&format!("Bearer {}", bearer))
        .map_err(|e| eyre!("Invalid access token: {}", e))?,
    );

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(Duration::from_secs(config.remote.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let base = Url::parse(&config.remote.url)
      .and_then(|u| u.join("rest/v1/"))
      .map_err(|e| eyre!("Invalid remote url {}: {}", config.remote.url, e))?;

    Ok(Self { http, base })
  }

  fn request(&self, method: Method, table: &str, query: &[(&str, &str)]) -> Result<RequestBuilder> {
    let mut url = self
      .base
      .join(table)
      .map_err(|e| eyre!("Invalid table path {}: {}", table, e))?;
    url.query_pairs_mut().extend_pairs(query);

    Ok(self.http.request(method, url))
  }

  async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, &str)]) -> Result<Vec<T>> {
    let response = self
      .request(Method::GET, table, query)?
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", table, e))?;

    check_status(response, table)
      .await?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse {}: {}", table, e))
  }

  async fn insert<B: Serialize, T: DeserializeOwned>(&self, table: &str, body: &B) -> Result<T> {
    let response = self
      .request(Method::POST, table, &[("select", "*")])?
      .header("Prefer", "return=representation")
      .json(body)
      .send()
      .await
      .map_err(|e| eyre!("Failed to insert into {}: {}", table, e))?;

    // PostgREST answers inserts with an array of the created rows
    let mut rows: Vec<T> = check_status(response, table)
      .await?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse inserted {}: {}", table, e))?;

    rows
      .pop()
      .ok_or_else(|| eyre!("Insert into {} returned no rows", table))
  }

  async fn patch<B: Serialize>(&self, table: &str, id: &str, body: &B) -> Result<()> {
    let filter = format!("eq.{}", id);
    let response = self
      .request(Method::PATCH, table, &[("id", filter.as_str())])?
      .header("Prefer", "return=minimal")
      .json(body)
      .send()
      .await
      .map_err(|e| eyre!("Failed to update {} {}: {}", table, id, e))?;

    check_status(response, table).await?;
    Ok(())
  }
}

/// Turn a non-2xx response into an error carrying the server message.
async fn check_status(response: Response, table: &str) -> Result<Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let body = response
    .text()
    .await
    .unwrap_or_else(|_| "Unknown error".to_string());
  Err(eyre!("{} request failed with HTTP {}: {}", table, status, body))
}

impl RemoteStore for RestClient {
  async fn list_items(&self) -> Result<Vec<Item>> {
    self
      .select(
        "items",
        &[
          ("select", "*"),
          ("is_deleted", "eq.false"),
          ("order", "created_at.desc"),
        ],
      )
      .await
  }

  async fn list_categories(&self) -> Result<Vec<Category>> {
    self
      .select("categories", &[("select", "*"), ("order", "name.asc")])
      .await
  }

  async fn list_profiles(&self) -> Result<Vec<Profile>> {
    self
      .select("profiles", &[("select", "id,email,username,avatar_url")])
      .await
  }

  async fn insert_item(&self, item: &NewItem) -> Result<Item> {
    self.insert("items", item).await
  }

  async fn update_item(&self, id: &str, patch: &ItemPatch) -> Result<()> {
    self.patch("items", id, patch).await
  }

  async fn soft_delete_item(&self, id: &str, deleted_at: &str) -> Result<()> {
    let body = serde_json::json!({
      "is_deleted": true,
      "deleted_at": deleted_at,
    });
    self.patch("items", id, &body).await
  }

  async fn insert_category(&self, category: &NewCategory) -> Result<Category> {
    self.insert("categories", category).await
  }
}
