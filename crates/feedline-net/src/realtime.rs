//! Realtime change feed over the hosted service's WebSocket.
//!
//! Every [`subscribe`] call opens its own socket and joins one Phoenix
//! channel carrying a single `postgres_changes` binding. Matching row
//! changes are forwarded to the returned [`Subscription`]; dropping it
//! closes the socket. Lost connections are retried with capped backoff.
//! Channels follow the session token: a join always carries the current
//! one, and a token change on a live channel is pushed as an
//! `access_token` message.

use std::time::Duration;

use feedline_shared::constants::{REALTIME_SCHEMA, SUBSCRIPTION_BUFFER};
use feedline_shared::realtime::{ChangeEvent, ChangeFilter, ChangeKind, Subscription, Table};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{NetError, NetResult};

const PROTOCOL_VSN: &str = "1.0.0";
const RECONNECT_BASE: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// What a channel task needs to (re)connect.
#[derive(Debug, Clone)]
pub struct RealtimeParams {
    pub socket_url: Url,
    /// Sent as the token when no user is signed in.
    pub anon_key: String,
    /// The signed-in user's token, shared with the REST client.
    pub access_token: watch::Receiver<Option<String>>,
    pub heartbeat: Duration,
}

impl RealtimeParams {
    /// Join frame authenticated with whatever token is current right now.
    fn join_frame(&self, topic: &str, filter: &ChangeFilter, reference: String) -> Frame {
        let token = self.access_token.borrow().clone();
        Frame::join(topic, filter, token.as_deref(), reference)
    }

    /// Re-authentication frame for a token change on a joined channel.
    fn token_frame(&self, topic: &str, token: Option<&str>, reference: String) -> Frame {
        Frame::access_token(topic, token.unwrap_or(&self.anon_key), reference)
    }
}

/// `wss://<host>/realtime/v1/websocket?apikey=..&vsn=1.0.0`
pub fn socket_url(data_url: &Url, anon_key: &str) -> NetResult<Url> {
    let mut url = data_url.join("realtime/v1/websocket")?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| NetError::Realtime(format!("cannot use {data_url} as a socket base")))?;
    url.query_pairs_mut()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", PROTOCOL_VSN);
    Ok(url)
}

/// One Phoenix channel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl Frame {
    fn join(topic: &str, filter: &ChangeFilter, access_token: Option<&str>, reference: String) -> Self {
        let mut binding = json!({
            "event": filter.event_name(),
            "schema": REALTIME_SCHEMA,
            "table": filter.table.as_str(),
        });
        if let Some(expr) = filter.filter_expr() {
            binding["filter"] = Value::String(expr);
        }

        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [binding],
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }

        Self {
            topic: topic.to_string(),
            event: "phx_join".into(),
            payload,
            join_ref: Some(reference.clone()),
            reference: Some(reference),
        }
    }

    fn access_token(topic: &str, token: &str, reference: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: "access_token".into(),
            payload: json!({ "access_token": token }),
            reference: Some(reference),
            join_ref: None,
        }
    }

    fn heartbeat(reference: String) -> Self {
        Self {
            topic: "phoenix".into(),
            event: "heartbeat".into(),
            payload: json!({}),
            reference: Some(reference),
            join_ref: None,
        }
    }

    fn to_message(&self) -> NetResult<Message> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }

    /// The row change carried by a `postgres_changes` frame.
    pub(crate) fn change_event(&self) -> Option<ChangeEvent> {
        if self.event != "postgres_changes" {
            return None;
        }
        let data = self.payload.get("data")?;
        let table = Table::from_name(data.get("table")?.as_str()?)?;
        let kind = ChangeKind::from_name(data.get("type")?.as_str()?)?;

        Some(ChangeEvent {
            table,
            kind,
            record: data.get("record").cloned().unwrap_or(Value::Null),
            old_record: data.get("old_record").cloned().unwrap_or(Value::Null),
        })
    }

    fn reply_status(&self) -> Option<&str> {
        if self.event != "phx_reply" {
            return None;
        }
        self.payload.get("status")?.as_str()
    }

    /// True for the server's acceptance of the join sent with `join_ref`.
    fn join_accepted(&self, join_ref: &str) -> bool {
        self.reply_status() == Some("ok") && self.reference.as_deref() == Some(join_ref)
    }

    /// Reason given when the server refuses a join.
    fn join_error(&self) -> Option<String> {
        if self.reply_status()? != "error" {
            return None;
        }
        Some(
            self.payload
                .pointer("/response/reason")
                .and_then(Value::as_str)
                .unwrap_or("join refused")
                .to_string(),
        )
    }
}

enum Ended {
    SubscriberGone,
    ServerClosed,
}

/// Open a channel for `filter`. Must be called inside a Tokio runtime.
pub fn subscribe(params: RealtimeParams, filter: ChangeFilter) -> Subscription {
    let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
    let topic = format!(
        "realtime:{}-{}",
        filter.table,
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    );

    tokio::spawn(run_channel(params, filter.clone(), topic, tx));
    Subscription::new(filter, rx)
}

async fn run_channel(
    params: RealtimeParams,
    filter: ChangeFilter,
    topic: String,
    tx: mpsc::Sender<ChangeEvent>,
) {
    let mut backoff = RECONNECT_BASE;

    loop {
        match connect_once(&params, &filter, &topic, &tx, &mut backoff).await {
            Ok(Ended::SubscriberGone) => break,
            Ok(Ended::ServerClosed) => {
                info!(topic = %topic, "realtime channel closed by server");
                backoff = RECONNECT_BASE;
            }
            Err(e) => warn!(topic = %topic, error = %e, "realtime channel failed"),
        }

        tokio::select! {
            _ = tx.closed() => break,
            _ = sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(RECONNECT_MAX);
    }

    debug!(topic = %topic, "realtime subscription closed");
}

/// Run one connection until it ends. `backoff` is reset once the server
/// accepts the join.
async fn connect_once(
    params: &RealtimeParams,
    filter: &ChangeFilter,
    topic: &str,
    tx: &mpsc::Sender<ChangeEvent>,
    backoff: &mut Duration,
) -> NetResult<Ended> {
    let (ws_stream, _) = connect_async(params.socket_url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    let mut next_ref = 0u64;
    let mut bump = move || {
        next_ref += 1;
        next_ref.to_string()
    };

    let mut token = params.access_token.clone();
    token.mark_unchanged();
    let mut token_open = true;

    let join_ref = bump();
    write
        .send(params.join_frame(topic, filter, join_ref.clone()).to_message()?)
        .await?;
    debug!(topic = %topic, table = %filter.table, event = filter.event_name(), "joining realtime channel");

    let mut heartbeat = interval(params.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = tx.closed() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(Ended::SubscriberGone);
            }
            _ = heartbeat.tick() => {
                write.send(Frame::heartbeat(bump()).to_message()?).await?;
            }
            changed = token.changed(), if token_open => {
                if changed.is_err() {
                    // the REST client is gone; keep the current token
                    token_open = false;
                    continue;
                }
                let current = token.borrow_and_update().clone();
                debug!(topic = %topic, signed_in = current.is_some(), "realtime token changed");
                write
                    .send(params.token_frame(topic, current.as_deref(), bump()).to_message()?)
                    .await?;
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let frame: Frame = match serde_json::from_str(text.as_str()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(error = %e, "unparseable realtime frame");
                            continue;
                        }
                    };

                    if frame.topic != topic {
                        continue;
                    }
                    if let Some(reason) = frame.join_error() {
                        return Err(NetError::Realtime(reason));
                    }
                    if frame.join_accepted(&join_ref) {
                        debug!(topic = %topic, "realtime channel joined");
                        *backoff = RECONNECT_BASE;
                        continue;
                    }
                    if frame.event == "phx_close" || frame.event == "phx_error" {
                        return Ok(Ended::ServerClosed);
                    }
                    if let Some(event) = frame.change_event() {
                        if tx.send(event).await.is_err() {
                            return Ok(Ended::SubscriberGone);
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => write.send(Message::Pong(data)).await?,
                Some(Ok(Message::Close(_))) | None => return Ok(Ended::ServerClosed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_switches_scheme_and_adds_key() {
        let base = Url::parse("https://demo.example.co/").unwrap();
        let url = socket_url(&base, "anon").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://demo.example.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );

        let local = Url::parse("http://127.0.0.1:54321/").unwrap();
        assert_eq!(socket_url(&local, "k").unwrap().scheme(), "ws");
    }

    #[test]
    fn join_frame_carries_binding() {
        let filter = ChangeFilter::table(Table::Profiles)
            .on(ChangeKind::Update)
            .where_eq("id", "abc");
        let frame = Frame::join("realtime:profiles-1", &filter, Some("jwt"), "1".into());
        let value = serde_json::to_value(&frame).unwrap();

        assert_eq!(value["event"], "phx_join");
        assert_eq!(value["ref"], "1");
        assert_eq!(value["payload"]["access_token"], "jwt");
        let binding = &value["payload"]["config"]["postgres_changes"][0];
        assert_eq!(binding["event"], "UPDATE");
        assert_eq!(binding["schema"], "public");
        assert_eq!(binding["table"], "profiles");
        assert_eq!(binding["filter"], "id=eq.abc");
    }

    #[test]
    fn any_kind_binding_has_no_filter() {
        let frame = Frame::join("t", &ChangeFilter::table(Table::Likes), None, "1".into());
        let binding = &frame.payload["config"]["postgres_changes"][0];
        assert_eq!(binding["event"], "*");
        assert!(binding.get("filter").is_none());
        assert!(frame.payload.get("access_token").is_none());
    }

    #[test]
    fn heartbeat_goes_to_phoenix_topic() {
        let value = serde_json::to_value(Frame::heartbeat("7".into())).unwrap();
        assert_eq!(value["topic"], "phoenix");
        assert_eq!(value["event"], "heartbeat");
        assert_eq!(value["ref"], "7");
    }

    #[test]
    fn postgres_changes_frame_becomes_event() {
        let frame: Frame = serde_json::from_str(
            r#"{
                "topic": "realtime:comments-1",
                "event": "postgres_changes",
                "ref": null,
                "payload": {
                    "ids": [1],
                    "data": {
                        "schema": "public",
                        "table": "comments",
                        "commit_timestamp": "2024-05-01T10:00:00Z",
                        "type": "INSERT",
                        "record": {"id": "c1", "post_id": "p1"},
                        "old_record": null,
                        "columns": []
                    }
                }
            }"#,
        )
        .unwrap();

        let event = frame.change_event().unwrap();
        assert_eq!(event.table, Table::Comments);
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.record["post_id"], "p1");
        assert!(event.old_record.is_null());
    }

    #[test]
    fn refused_join_reports_reason() {
        let frame: Frame = serde_json::from_str(
            r#"{"topic":"t","event":"phx_reply","ref":"1",
                "payload":{"status":"error","response":{"reason":"unauthorized"}}}"#,
        )
        .unwrap();
        assert_eq!(frame.join_error().as_deref(), Some("unauthorized"));
        assert!(frame.change_event().is_none());
    }

    #[test]
    fn ok_reply_accepts_only_its_own_join() {
        let frame: Frame = serde_json::from_str(
            r#"{"topic":"t","event":"phx_reply","ref":"1","payload":{"status":"ok","response":{}}}"#,
        )
        .unwrap();
        assert!(frame.join_error().is_none());
        assert!(frame.join_accepted("1"));
        assert!(!frame.join_accepted("2"));
    }

    fn params() -> (RealtimeParams, watch::Sender<Option<String>>) {
        let (token_tx, token_rx) = watch::channel(None);
        let params = RealtimeParams {
            socket_url: Url::parse("wss://demo.example.co/realtime/v1/websocket").unwrap(),
            anon_key: "anon".into(),
            access_token: token_rx,
            heartbeat: Duration::from_secs(30),
        };
        (params, token_tx)
    }

    #[test]
    fn rejoin_uses_token_current_at_join_time() {
        let (params, token_tx) = params();
        let filter = ChangeFilter::table(Table::Posts).on(ChangeKind::Insert);

        let before = params.join_frame("realtime:posts-1", &filter, "1".into());
        assert!(before.payload.get("access_token").is_none());

        token_tx.send_replace(Some("user-jwt".into()));
        let after = params.join_frame("realtime:posts-1", &filter, "1".into());
        assert_eq!(after.payload["access_token"], "user-jwt");

        token_tx.send_replace(None);
        let signed_out = params.join_frame("realtime:posts-1", &filter, "1".into());
        assert!(signed_out.payload.get("access_token").is_none());
    }

    #[test]
    fn token_change_frame_targets_the_channel() {
        let (params, _token_tx) = params();

        let value =
            serde_json::to_value(params.token_frame("realtime:likes-1", Some("user-jwt"), "4".into()))
                .unwrap();
        assert_eq!(value["topic"], "realtime:likes-1");
        assert_eq!(value["event"], "access_token");
        assert_eq!(value["payload"]["access_token"], "user-jwt");

        // signing out falls back to the public key
        let signed_out = params.token_frame("realtime:likes-1", None, "5".into());
        assert_eq!(signed_out.payload["access_token"], "anon");
    }
}
