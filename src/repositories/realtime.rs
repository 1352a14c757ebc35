use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::AbortHandle;
use tokio_tungstenite::connect_async;
use tungstenite::protocol::Message;

use super::backend::Table;
use crate::models::session::Session;

#[derive(Clone, Debug, PartialEq)]
pub struct TableChange {
    pub table: Table,
    pub event: String,
}

pub fn websocket_url(backend_url: &str, anon_key: &str) -> String {
    let base = backend_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };

    format!("{}/realtime/v1/websocket?apikey={}&vsn=1.0.0", base, anon_key)
}

pub fn join_message(table: Table, join_ref: u64, access_token: Option<&str>) -> Value {
    let mut payload = json!({
        "config": {
            "postgres_changes": [
                { "event": "*", "schema": "public", "table": table.name() }
            ]
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = json!(token);
    }

    json!({
        "topic": format!("realtime:{}_changes", table.name()),
        "event": "phx_join",
        "payload": payload,
        "ref": join_ref.to_string(),
    })
}

pub fn heartbeat_message(heartbeat_ref: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": heartbeat_ref.to_string(),
    })
}

pub fn parse_change(value: &Value) -> Option<TableChange> {
    if value.get("event").and_then(|e| e.as_str()) != Some("postgres_changes") {
        return None;
    }

    let data = value.get("payload")?.get("data")?;
    let table = Table::from_name(data.get("table")?.as_str()?)?;
    let event = data
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("*")
        .to_string();

    Some(TableChange { table, event })
}

/// Aborts a connection helper task once the connection is done with it.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Change notifications for a set of tables, fanned out to every subscriber.
#[derive(Clone)]
pub struct RealtimeFeed {
    url: String,
    reconnect: Duration,
    heartbeat: Duration,
    session: watch::Receiver<Option<Session>>,
    sender: broadcast::Sender<TableChange>,
}

impl RealtimeFeed {
    pub fn new(
        backend_url: &str,
        anon_key: &str,
        reconnect: Duration,
        heartbeat: Duration,
        session: watch::Receiver<Option<Session>>,
    ) -> Self {
        let (sender, _) = broadcast::channel(64);

        Self {
            url: websocket_url(backend_url, anon_key),
            reconnect,
            heartbeat,
            session,
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TableChange> {
        self.sender.subscribe()
    }

    pub fn notify(&self, change: TableChange) {
        // no subscribers is fine
        let _ = self.sender.send(change);
    }

    pub fn start(&self, tables: Vec<Table>) {
        let feed = self.clone();

        tokio::spawn(async move {
            loop {
                if let Err(e) = feed.listen(&tables).await {
                    log::error!("Realtime connection failed: {}", e);
                }

                log::warn!(
                    "Realtime connection closed, reconnecting in {}s.",
                    feed.reconnect.as_secs()
                );
                tokio::time::sleep(feed.reconnect).await;
            }
        });

        log::info!("Realtime feed started.");
    }

    async fn listen(&self, tables: &[Table]) -> Result<(), anyhow::Error> {
        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    log::error!("Error sending realtime message: {}", e);
                    break;
                }
            }
        });
        let _writer = AbortOnDrop(writer.abort_handle());

        let mut session = self.session.clone();
        let access_token = session
            .borrow_and_update()
            .as_ref()
            .map(|s| s.access_token.clone());
        let mut next_ref: u64 = 1;
        for table in tables {
            let join = join_message(*table, next_ref, access_token.as_deref());
            tx.send(Message::Text(join.to_string().into()))?;
            next_ref += 1;
        }

        let heartbeat_tx = tx.clone();
        let heartbeat_every = self.heartbeat;
        let heartbeat = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_every);
            let mut heartbeat_ref = 1_000_000u64;

            loop {
                interval.tick().await;
                heartbeat_ref += 1;
                let msg = heartbeat_message(heartbeat_ref).to_string();
                if heartbeat_tx.send(Message::Text(msg.into())).is_err() {
                    break;
                }
            }
        });
        let _heartbeat = AbortOnDrop(heartbeat.abort_handle());

        loop {
            let frame = tokio::select! {
                frame = read.next() => frame,
                changed = session.changed() => {
                    // rejoin with the new access token
                    if changed.is_ok() {
                        log::info!("Session changed, rejoining realtime channels.");
                    }
                    break;
                }
            };
            let Some(frame) = frame else {
                break;
            };

            let text = match frame? {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let value: Value = match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(e) => {
                    log::warn!("Unparseable realtime frame: {}", e);
                    continue;
                }
            };
            log::debug!("Realtime received: {}", value);

            if let Some(change) = parse_change(&value) {
                self.notify(change);
            }
        }

        Ok(())
    }
}
