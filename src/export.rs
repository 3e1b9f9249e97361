use crate::errors::AppResult;
use crate::models::ExportResponse;
use crate::store::document::{ACHIEVEMENTS_DOC, LOGS_DOC, PROFILE_DOC, PROGRESS_DOC, WALLET_DOC};
use crate::store::{write_json_file, CollectionStore, DocumentStore};
use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;

pub const FULL_EXPORT_FILE: &str = "devjournal-full-export.json";
pub const RECENT_EXPORT_FILE: &str = "devjournal-recent-export.json";
pub const DEFAULT_WINDOW_DAYS: u32 = 14;

/// Everything the stores hold at one moment, exactly as stored. Absent sources
/// stay empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub daily_logs: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_profile: Option<Value>,
    pub goals: Vec<Value>,
    pub bounties: Vec<Value>,
    pub notes: Vec<Value>,
    pub snippets: Vec<Value>,
    pub chats: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achievements: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalCounts {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub log_days: usize,
    pub date_range: Option<DateRange>,
    pub total_hours: f64,
    pub goals: GoalCounts,
    pub bounty_count: usize,
    pub bounties_won: usize,
    pub finding_count: usize,
    pub note_count: usize,
    pub snippet_count: usize,
    pub transaction_count: usize,
    pub chat_count: usize,
    pub total_earnings: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub export_date: DateTime<Utc>,
    pub export_type: String,
    pub summary: ExportSummary,
    #[serde(flatten)]
    pub data: Snapshot,
}

/// Numbers may be stored as JSON numbers or numeric strings.
fn number(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|number| number.is_finite())
}

fn has_status(value: &Value, status: &str) -> bool {
    value
        .get("status")
        .and_then(Value::as_str)
        .map(|stored| stored.trim().eq_ignore_ascii_case(status))
        .unwrap_or(false)
}

fn array_len(value: Option<&Value>, key: &str) -> usize {
    value
        .and_then(|value| value.get(key))
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

/// Date ranges are lexicographic, which is only meaningful for `YYYY-MM-DD`.
/// Fields that are missing or of the wrong type count as absent.
pub fn summarize(snapshot: &Snapshot) -> ExportSummary {
    let dates: BTreeSet<&str> = snapshot
        .daily_logs
        .iter()
        .filter_map(|log| log.get("date").and_then(Value::as_str))
        .collect();
    let date_range = match (dates.iter().next(), dates.iter().next_back()) {
        (Some(from), Some(to)) => Some(DateRange {
            from: from.to_string(),
            to: to.to_string(),
        }),
        _ => None,
    };

    let completed = snapshot
        .goals
        .iter()
        .filter(|goal| has_status(goal, "completed"))
        .count();

    let total_earnings = snapshot
        .progress
        .as_ref()
        .and_then(|progress| number(progress, "earnings"))
        .or_else(|| snapshot.wallet.as_ref().and_then(|wallet| number(wallet, "balance")))
        .unwrap_or(0.0);

    ExportSummary {
        log_days: dates.len(),
        date_range,
        total_hours: snapshot
            .daily_logs
            .iter()
            .filter_map(|log| number(log, "hours"))
            .sum(),
        goals: GoalCounts {
            total: snapshot.goals.len(),
            completed,
            pending: snapshot.goals.len() - completed,
        },
        bounty_count: snapshot.bounties.len(),
        bounties_won: snapshot
            .bounties
            .iter()
            .filter(|bounty| has_status(bounty, "won"))
            .count(),
        finding_count: snapshot
            .bounties
            .iter()
            .map(|bounty| array_len(Some(bounty), "findings"))
            .sum(),
        note_count: snapshot.notes.len(),
        snippet_count: snapshot.snippets.len(),
        transaction_count: array_len(snapshot.wallet.as_ref(), "transactions"),
        chat_count: snapshot.chats.len(),
        total_earnings,
    }
}

/// Keeps logs dated on or after `now - days`. Comparison is on the ISO date
/// string, so the boundary day itself is included. Undated logs are dropped.
pub fn filter_recent_logs(logs: &[Value], days: u32, now: DateTime<Local>) -> Vec<Value> {
    let cutoff = (now - Duration::days(i64::from(days))).format("%Y-%m-%d").to_string();
    logs.iter()
        .filter(|log| {
            log.get("date")
                .and_then(Value::as_str)
                .map(|date| date >= cutoff.as_str())
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone)]
pub struct ExportEngine {
    documents: DocumentStore,
    collections: CollectionStore,
    export_dir: PathBuf,
}

impl ExportEngine {
    pub fn new(documents: DocumentStore, collections: CollectionStore, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            documents,
            collections,
            export_dir: export_dir.into(),
        }
    }

    pub fn export_dir(&self) -> &PathBuf {
        &self.export_dir
    }

    /// Best effort: a missing or unreadable source is logged and left empty.
    /// Records are kept as stored so fields the app does not model survive.
    pub fn collect_snapshot(&self) -> Snapshot {
        let daily_logs = match self.optional_document(LOGS_DOC) {
            Some(Value::Object(mut logs)) => match logs.remove("logs") {
                Some(Value::Array(entries)) => entries,
                _ => Vec::new(),
            },
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                tracing::warn!(document = LOGS_DOC, "daily logs document has an unexpected shape");
                Vec::new()
            }
            None => Vec::new(),
        };
        Snapshot {
            daily_logs,
            user_profile: self.optional_document(PROFILE_DOC),
            goals: self.collection("goals"),
            bounties: self.collection("bounties"),
            notes: self.collection("notes"),
            snippets: self.collection("snippets"),
            chats: self.collection("chats"),
            wallet: self.optional_document(WALLET_DOC),
            progress: self.optional_document(PROGRESS_DOC),
            achievements: self.optional_document(ACHIEVEMENTS_DOC),
        }
    }

    pub fn export_full(&self) -> AppResult<ExportResponse> {
        let data = self.collect_snapshot();
        self.write_export(FULL_EXPORT_FILE, "Full Export".to_string(), data)
    }

    pub fn export_window(&self, days: u32) -> AppResult<ExportResponse> {
        self.export_window_at(days, Local::now())
    }

    pub fn export_window_at(&self, days: u32, now: DateTime<Local>) -> AppResult<ExportResponse> {
        let mut data = self.collect_snapshot();
        data.daily_logs = filter_recent_logs(&data.daily_logs, days, now);
        self.write_export(RECENT_EXPORT_FILE, format!("Recent Export (Last {} Days)", days), data)
    }

    fn write_export(&self, file_name: &str, export_type: String, data: Snapshot) -> AppResult<ExportResponse> {
        let document = ExportDocument {
            export_date: Utc::now(),
            export_type: export_type.clone(),
            summary: summarize(&data),
            data,
        };
        let path = self.export_dir.join(file_name);
        write_json_file(&path, &document)?;
        tracing::info!(path = %path.display(), export_type = %export_type, "export written");
        Ok(ExportResponse { path, export_type })
    }

    fn optional_document(&self, name: &str) -> Option<Value> {
        match self.documents.load_optional(name) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(document = name, error = %error, "leaving unreadable document out of export");
                None
            }
        }
    }

    fn collection(&self, folder: &str) -> Vec<Value> {
        match self.collections.list_all(folder) {
            Ok(items) => items,
            Err(error) => {
                tracing::warn!(folder = folder, error = %error, "leaving unreadable collection out of export");
                Vec::new()
            }
        }
    }
}
