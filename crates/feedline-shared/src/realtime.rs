//! Realtime change-feed vocabulary.
//!
//! A subscription is keyed by table, an optional event kind and an optional
//! `column = value` row filter. Events carry the affected row as JSON; most
//! consumers only react to the fact that something changed.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Posts,
    Profiles,
    Likes,
    Comments,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Posts => "posts",
            Table::Profiles => "profiles",
            Table::Likes => "likes",
            Table::Comments => "comments",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "posts" => Some(Table::Posts),
            "profiles" => Some(Table::Profiles),
            "likes" => Some(Table::Likes),
            "comments" => Some(Table::Comments),
            _ => None,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// What a subscriber wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: Table,
    /// `None` means every kind of change.
    pub kind: Option<ChangeKind>,
    /// Row filter `column = value`.
    pub column_eq: Option<(String, String)>,
}

impl ChangeFilter {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            kind: None,
            column_eq: None,
        }
    }

    pub fn on(mut self, kind: ChangeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn where_eq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.column_eq = Some((column.into(), value.to_string()));
        self
    }

    /// Event name as the hosted feed spells it (`*` for any).
    pub fn event_name(&self) -> &'static str {
        self.kind.map(|k| k.as_str()).unwrap_or("*")
    }

    /// Row filter in `column=eq.value` form.
    pub fn filter_expr(&self) -> Option<String> {
        self.column_eq
            .as_ref()
            .map(|(column, value)| format!("{column}=eq.{value}"))
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        if let Some(kind) = self.kind {
            if event.kind != kind {
                return false;
            }
        }
        match &self.column_eq {
            None => true,
            Some((column, value)) => event
                .row()
                .get(column)
                .map(|v| json_scalar_eq(v, value))
                .unwrap_or(false),
        }
    }
}

fn json_scalar_eq(v: &serde_json::Value, expected: &str) -> bool {
    match v {
        serde_json::Value::String(s) => s == expected,
        serde_json::Value::Number(n) => n.to_string() == expected,
        serde_json::Value::Bool(b) => b.to_string() == expected,
        _ => false,
    }
}

/// A row-level change delivered by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    /// New row for inserts and updates.
    #[serde(default)]
    pub record: serde_json::Value,
    /// Previous row for updates and deletes, when the feed provides it.
    #[serde(default)]
    pub old_record: serde_json::Value,
}

impl ChangeEvent {
    /// The row a filter is evaluated against: the new row, or the old one for deletes.
    pub fn row(&self) -> &serde_json::Value {
        if self.record.is_null() {
            &self.old_record
        } else {
            &self.record
        }
    }

    /// Decode the new row.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.record.clone()).ok()
    }
}

/// Receiving end of one realtime subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    filter: ChangeFilter,
    rx: mpsc::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(filter: ChangeFilter, rx: mpsc::Receiver<ChangeEvent>) -> Self {
        Self { filter, rx }
    }

    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }

    /// Next matching event, or `None` once the feed has closed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}
