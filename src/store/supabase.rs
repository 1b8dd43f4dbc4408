//! Supabase REST API client using service_role key

use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};

/// Supabase client for server-side database operations
/// Uses service_role key which bypasses RLS - handle with care!
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, service_role_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
        }
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SupabaseError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(SupabaseError::Api {
            status: status.as_u16(),
            body,
        })
    }

    /// Authenticated request for a table. Query values are URL-encoded by
    /// reqwest, so filters may carry arbitrary client-supplied strings.
    fn request(
        &self,
        method: Method,
        table: &str,
        query: &[(&str, String)],
    ) -> RequestBuilder {
        self.authed(self.client.request(method, self.rest_url(table)))
            .query(query)
    }

    /// Make an authenticated GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, SupabaseError> {
        let response = self
            .request(Method::GET, table, query)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(SupabaseError::Parse)
    }

    /// Make an authenticated GET request expecting a single row
    pub async fn get_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, SupabaseError> {
        let response = self
            .request(Method::GET, table, query)
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        if response.status() == reqwest::StatusCode::NOT_ACCEPTABLE {
            // No rows found
            return Ok(None);
        }

        Self::check(response)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(SupabaseError::Parse)
    }

    /// Make an authenticated PATCH request (update)
    pub async fn update<T: Serialize>(
        &self,
        table: &str,
        query: &[(&str, String)],
        data: &T,
    ) -> Result<(), SupabaseError> {
        let response = self
            .request(Method::PATCH, table, query)
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response).await.map(|_| ())
    }

    /// Upsert (insert or update on conflict)
    pub async fn upsert<T: Serialize>(
        &self,
        table: &str,
        data: &T,
        on_conflict: &str,
    ) -> Result<(), SupabaseError> {
        let response = self
            .request(Method::POST, table, &[("on_conflict", on_conflict.to_string())])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response).await.map(|_| ())
    }
}

/// PostgREST equality filter, `column=eq.value`
pub fn eq<'a>(column: &'a str, value: &str) -> (&'a str, String) {
    (column, format!("eq.{}", value))
}

/// Supabase errors
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(#[source] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_pairs(builder: RequestBuilder) -> Vec<(String, String)> {
        let request = builder.build().unwrap();
        request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn filter_values_are_encoded() {
        let client = SupabaseClient::new("https://example.supabase.co/", "key");
        for id in ["a&b", "x+y", "50%", "tag#1", "plain"] {
            let pairs = query_pairs(client.request(Method::GET, "players", &[eq("player_id", id)]));
            assert_eq!(pairs, vec![("player_id".to_string(), format!("eq.{}", id))]);
        }
    }

    #[test]
    fn requests_target_the_rest_endpoint() {
        let client = SupabaseClient::new("https://example.supabase.co/", "key");
        let request = client
            .request(Method::PATCH, "players", &[eq("player_id", "alice")])
            .build()
            .unwrap();
        assert_eq!(request.url().path(), "/rest/v1/players");
        assert_eq!(*request.method(), Method::PATCH);
        assert_eq!(request.headers()["apikey"], "key");
    }
}
