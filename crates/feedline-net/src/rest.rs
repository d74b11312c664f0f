//! REST client for the hosted data service.
//!
//! Tables are exposed PostgREST-style under `/rest/v1/<table>`: filters are
//! query parameters (`user_id=eq.<id>`, `post_id=in.(a,b)`), writes ask for
//! the affected rows back with `Prefer: return=representation`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use feedline_shared::constants::{DEFAULT_HEARTBEAT_SECS, DEFAULT_HTTP_TIMEOUT_SECS};
use feedline_shared::models::{Comment, Like, NewComment, NewPost, Post, Profile, ProfilePatch};
use feedline_shared::realtime::{ChangeFilter, Subscription, Table};
use feedline_shared::service::DataService;
use feedline_shared::types::{PostId, UserId};
use feedline_shared::{ServiceError, ServiceResult};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use url::Url;

use crate::error::{error_message, NetError, NetResult};
use crate::realtime::{self, RealtimeParams};

/// Connection settings for the hosted data/auth/realtime service.
#[derive(Debug, Clone)]
pub struct HostedConfig {
    /// Project base URL, e.g. `https://xyz.example.co/`.
    pub data_url: Url,
    /// Public API key sent with every request.
    pub anon_key: String,
    pub http_timeout: Duration,
    pub heartbeat: Duration,
}

impl HostedConfig {
    pub fn new(data_url: &str, anon_key: impl Into<String>) -> NetResult<Self> {
        let mut data_url = Url::parse(data_url)?;
        // Url::join drops the last segment unless the path ends in '/'
        if !data_url.path().ends_with('/') {
            let path = format!("{}/", data_url.path());
            data_url.set_path(&path);
        }

        Ok(Self {
            data_url,
            anon_key: anon_key.into(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            heartbeat: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
        })
    }
}

/// Hosted data service client. Cheap to clone; clones share the session token.
#[derive(Clone)]
pub struct HostedData {
    pub(crate) config: Arc<HostedConfig>,
    pub(crate) http: reqwest::Client,
    /// Current bearer token; realtime channels watch it to re-authenticate.
    pub(crate) access_token: Arc<watch::Sender<Option<String>>>,
}

/// Ids per `in.(...)` filter. 100 UUIDs keep a request URL near 4 KB.
const IN_FILTER_BATCH: usize = 100;

#[derive(Debug, Deserialize)]
struct PostIdRow {
    post_id: PostId,
}

impl HostedData {
    pub fn new(config: HostedConfig) -> NetResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            http,
            access_token: Arc::new(watch::Sender::new(None)),
        })
    }

    /// Token for the signed-in user, if any.
    pub fn access_token(&self) -> Option<String> {
        self.access_token.borrow().clone()
    }

    pub(crate) fn set_access_token(&self, token: Option<String>) {
        self.access_token.send_replace(token);
    }

    pub(crate) fn realtime_params(&self) -> NetResult<RealtimeParams> {
        Ok(RealtimeParams {
            socket_url: realtime::socket_url(&self.config.data_url, &self.config.anon_key)?,
            anon_key: self.config.anon_key.clone(),
            access_token: self.access_token.subscribe(),
            heartbeat: self.config.heartbeat,
        })
    }

    pub(crate) fn endpoint(&self, path: &str) -> NetResult<Url> {
        Ok(self.config.data_url.join(path)?)
    }

    pub(crate) fn table_url(&self, table: Table, query: &[(&str, String)]) -> NetResult<Url> {
        let mut url = self.endpoint(&format!("rest/v1/{}", table.as_str()))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Request carrying the API key and the best available bearer token.
    pub(crate) async fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let bearer = self
            .access_token()
            .unwrap_or_else(|| self.config.anon_key.clone());

        self.http
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
    }

    /// Send a request and decode the JSON array it returns.
    async fn rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> NetResult<Vec<T>> {
        let response = checked(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: Table,
        query: &[(&str, String)],
    ) -> NetResult<Vec<T>> {
        let url = self.table_url(table, query)?;
        let request = self.request(Method::GET, url).await;
        self.rows(request).await
    }

    async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: Table,
        body: &B,
    ) -> NetResult<T> {
        let url = self.table_url(table, &[])?;
        let request = self
            .request(Method::POST, url)
            .await
            .header("Prefer", "return=representation")
            .json(body);

        self.rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| NetError::InvalidResponse(format!("insert into {table} returned no row")))
    }

    /// Delete matching rows, returning how many went away.
    async fn delete_where(&self, table: Table, query: &[(&str, String)]) -> NetResult<usize> {
        let url = self.table_url(table, query)?;
        let request = self
            .request(Method::DELETE, url)
            .await
            .header("Prefer", "return=representation");
        let deleted: Vec<serde_json::Value> = self.rows(request).await?;
        Ok(deleted.len())
    }

    async fn post_id_rows(&self, table: Table, query: &[(&str, String)]) -> NetResult<Vec<PostId>> {
        let rows: Vec<PostIdRow> = self.select(table, query).await?;
        Ok(rows.into_iter().map(|r| r.post_id).collect())
    }

    /// `post_id` column of every row whose post is in `post_ids`, fetched in
    /// batches so the query string stays short.
    async fn rows_for_posts(&self, table: Table, post_ids: &[PostId]) -> NetResult<Vec<PostId>> {
        let mut found = Vec::new();
        for filter in id_batches(post_ids) {
            let rows = self
                .post_id_rows(table, &[("select", "post_id".into()), ("post_id", filter)])
                .await?;
            found.extend(rows);
        }
        Ok(found)
    }
}

/// Map a non-success status to [`NetError::Api`], reading the body for a message.
pub(crate) async fn checked(response: reqwest::Response) -> NetResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    tracing::warn!(status, message = %message, "hosted service error");
    Err(NetError::Api { status, message })
}

pub(crate) fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

pub(crate) fn in_list<T: std::fmt::Display>(values: &[T]) -> String {
    let joined = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({joined})")
}

/// One `in.(...)` filter per [`IN_FILTER_BATCH`] ids.
pub(crate) fn id_batches<T: std::fmt::Display>(values: &[T]) -> Vec<String> {
    values.chunks(IN_FILTER_BATCH).map(in_list).collect()
}

fn select_all() -> (&'static str, String) {
    ("select", "*".to_string())
}

#[async_trait]
impl DataService for HostedData {
    async fn list_posts(&self) -> ServiceResult<Vec<Post>> {
        Ok(self
            .select(
                Table::Posts,
                &[select_all(), ("order", "created_at.desc".into())],
            )
            .await?)
    }

    async fn posts_by_user(&self, user_id: UserId) -> ServiceResult<Vec<Post>> {
        Ok(self
            .select(
                Table::Posts,
                &[
                    select_all(),
                    ("user_id", eq(user_id)),
                    ("order", "created_at.desc".into()),
                ],
            )
            .await?)
    }

    async fn insert_post(&self, post: &NewPost) -> ServiceResult<Post> {
        Ok(self.insert(Table::Posts, post).await?)
    }

    async fn delete_post(&self, post_id: PostId, owner: UserId) -> ServiceResult<bool> {
        let removed = self
            .delete_where(Table::Posts, &[("id", eq(post_id)), ("user_id", eq(owner))])
            .await?;
        Ok(removed > 0)
    }

    async fn profiles_by_ids(&self, ids: &[UserId]) -> ServiceResult<Vec<Profile>> {
        let mut profiles = Vec::with_capacity(ids.len());
        for filter in id_batches(ids) {
            let rows: Vec<Profile> = self
                .select(Table::Profiles, &[select_all(), ("id", filter)])
                .await?;
            profiles.extend(rows);
        }
        Ok(profiles)
    }

    async fn get_profile(&self, id: UserId) -> ServiceResult<Profile> {
        let rows: Vec<Profile> = self
            .select(Table::Profiles, &[select_all(), ("id", eq(id))])
            .await?;
        rows.into_iter().next().ok_or(ServiceError::NotFound)
    }

    async fn insert_profile(&self, profile: &Profile) -> ServiceResult<Profile> {
        Ok(self.insert(Table::Profiles, profile).await?)
    }

    async fn update_profile(&self, id: UserId, patch: &ProfilePatch) -> ServiceResult<()> {
        let url = self.table_url(Table::Profiles, &[("id", eq(id))])?;
        let request = self
            .request(Method::PATCH, url)
            .await
            .header("Prefer", "return=representation")
            .json(patch);

        let updated: Vec<serde_json::Value> = self.rows(request).await?;
        if updated.is_empty() {
            return Err(ServiceError::NotFound);
        }
        Ok(())
    }

    async fn liked_post_ids(&self, user_id: UserId) -> ServiceResult<Vec<PostId>> {
        Ok(self
            .post_id_rows(
                Table::Likes,
                &[("select", "post_id".into()), ("user_id", eq(user_id))],
            )
            .await?)
    }

    async fn like_post_ids(&self, post_ids: &[PostId]) -> ServiceResult<Vec<PostId>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.rows_for_posts(Table::Likes, post_ids).await?)
    }

    async fn insert_like(&self, like: &Like) -> ServiceResult<()> {
        let _: serde_json::Value = self.insert(Table::Likes, like).await?;
        Ok(())
    }

    async fn delete_like(&self, like: &Like) -> ServiceResult<bool> {
        let removed = self
            .delete_where(
                Table::Likes,
                &[("post_id", eq(like.post_id)), ("user_id", eq(like.user_id))],
            )
            .await?;
        Ok(removed > 0)
    }

    async fn comment_post_ids(&self, post_ids: &[PostId]) -> ServiceResult<Vec<PostId>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.rows_for_posts(Table::Comments, post_ids).await?)
    }

    async fn comments_for_post(&self, post_id: PostId) -> ServiceResult<Vec<Comment>> {
        Ok(self
            .select(
                Table::Comments,
                &[
                    select_all(),
                    ("post_id", eq(post_id)),
                    ("order", "created_at.asc".into()),
                ],
            )
            .await?)
    }

    async fn insert_comment(&self, comment: &NewComment) -> ServiceResult<Comment> {
        Ok(self.insert(Table::Comments, comment).await?)
    }

    async fn subscribe(&self, filter: ChangeFilter) -> ServiceResult<Subscription> {
        Ok(realtime::subscribe(self.realtime_params()?, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HostedData {
        HostedData::new(HostedConfig::new("https://demo.example.co", "anon-key").unwrap()).unwrap()
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let config = HostedConfig::new("https://demo.example.co/project", "k").unwrap();
        assert_eq!(config.data_url.as_str(), "https://demo.example.co/project/");
    }

    #[test]
    fn table_url_with_filters() {
        let user: UserId = "1a2b3c4d-0000-4000-8000-000000000000".parse().unwrap();
        let url = client()
            .table_url(
                Table::Posts,
                &[
                    select_all(),
                    ("user_id", eq(user)),
                    ("order", "created_at.desc".into()),
                ],
            )
            .unwrap();

        assert_eq!(url.path(), "/rest/v1/posts");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("select".into(), "*".into()),
                ("user_id".into(), format!("eq.{user}")),
                ("order".into(), "created_at.desc".into()),
            ]
        );
    }

    #[test]
    fn in_list_joins_with_commas() {
        assert_eq!(in_list(&["a", "b", "c"]), "in.(a,b,c)");
        assert_eq!(in_list::<&str>(&[]), "in.()");
    }

    #[test]
    fn profile_insert_body_matches_columns() {
        let id: UserId = "1a2b3c4d-0000-4000-8000-000000000000".parse().unwrap();
        let profile = Profile::placeholder(id);
        let body = serde_json::to_value(&profile).unwrap();

        assert_eq!(body["id"], id.to_string());
        assert_eq!(body["username"], "user_1a2b3c4d");
        assert_eq!(body["bio"], "");
        assert!(body["avatar_url"].is_null());
        assert!(body.get("updated_at").is_none());
    }

    #[test]
    fn rows_decode_from_service_json() {
        let posts: Vec<Post> = serde_json::from_str(
            r#"[{"id":"1a2b3c4d-0000-4000-8000-000000000001","user_id":null,"text":null,
                 "image_url":null,"created_at":"2024-05-01T10:00:00.123456+00:00"}]"#,
        )
        .unwrap();
        assert_eq!(posts[0].user_id, None);
        assert_eq!(posts[0].text, "");
    }

    #[tokio::test]
    async fn anon_key_used_until_signed_in() {
        let data = client();
        let url = data.table_url(Table::Posts, &[]).unwrap();

        let request = data.request(Method::GET, url.clone()).await.build().unwrap();
        assert_eq!(request.headers()["authorization"], "Bearer anon-key");
        assert_eq!(request.headers()["apikey"], "anon-key");

        data.set_access_token(Some("user-token".into()));
        let request = data.request(Method::GET, url).await.build().unwrap();
        assert_eq!(request.headers()["authorization"], "Bearer user-token");
    }

    #[test]
    fn long_id_lists_are_split_into_short_filters() {
        let ids: Vec<PostId> = (0..250).map(|_| PostId::new()).collect();
        let batches = id_batches(&ids);

        assert_eq!(batches.len(), 3);
        let covered: usize = batches.iter().map(|b| b.matches(',').count() + 1).sum();
        assert_eq!(covered, ids.len());

        let data = client();
        for filter in batches {
            let url = data
                .table_url(Table::Likes, &[("select", "post_id".into()), ("post_id", filter)])
                .unwrap();
            assert!(url.as_str().len() < 8 * 1024);
        }
        assert!(id_batches::<PostId>(&[]).is_empty());
    }

    #[tokio::test]
    async fn realtime_params_follow_session_token() {
        let data = client();
        let params = data.realtime_params().unwrap();
        assert_eq!(*params.access_token.borrow(), None);

        data.set_access_token(Some("user-token".into()));
        assert_eq!(params.access_token.borrow().as_deref(), Some("user-token"));

        data.set_access_token(None);
        assert_eq!(*params.access_token.borrow(), None);
    }
}
