use super::{next_nested_id, require_date, StoreContext};
use crate::errors::{AppError, AppResult};
use crate::models::{BasicLogs, DailyLog, DailyLogPatch, ExtraFields, NewDailyLog, RecordId};
use crate::store::document::LOGS_DOC;

fn validate_hours(hours: f64) -> AppResult<f64> {
    if !hours.is_finite() || hours < 0.0 {
        return Err(AppError::Validation(format!("Hours must be zero or more, got {}", hours)));
    }
    Ok(hours)
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

/// Logs written without an `id` get one; returns whether anything changed.
fn assign_missing_ids(book: &mut BasicLogs) -> bool {
    let mut changed = false;
    for index in 0..book.logs.len() {
        if book.logs[index].id == 0 {
            let id = next_nested_id(book.logs.iter().map(|log| log.id));
            book.logs[index].id = id;
            changed = true;
        }
    }
    changed
}

/// Daily logs live together in `BasicLogs.json`; a missing file is an empty log book.
#[derive(Clone)]
pub struct DailyLogManager {
    ctx: StoreContext,
}

impl DailyLogManager {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    /// Logs stored without ids are given ids and written back, unless a
    /// mutation holds the book, in which case that mutation assigns them.
    pub fn list(&self) -> AppResult<Vec<DailyLog>> {
        let mut book = self.ctx.documents.load_or_default::<BasicLogs>(LOGS_DOC)?;
        if book.logs.iter().any(|log| log.id == 0) {
            let path = self.ctx.documents.path_for(LOGS_DOC)?;
            if let Some(_guard) = self.ctx.locks.try_acquire(&path) {
                book = self.ctx.documents.load_or_default(LOGS_DOC)?;
                if assign_missing_ids(&mut book) {
                    self.ctx.documents.save(LOGS_DOC, &book)?;
                    tracing::info!(document = LOGS_DOC, "assigned ids to daily logs stored without one");
                }
            }
        }
        let mut logs = book.logs;
        logs.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
        Ok(logs)
    }

    pub async fn add(&self, request: NewDailyLog) -> AppResult<DailyLog> {
        let date = require_date(&request.date, "Log date")?;
        let hours = validate_hours(request.hours)?;
        self.mutate(|book| {
            let log = DailyLog {
                id: next_nested_id(book.logs.iter().map(|log| log.id)),
                date,
                hours,
                mood: blank_to_none(request.mood),
                activities: request.activities,
                learnings: request.learnings,
                ai_review: None,
                extra: ExtraFields::new(),
            };
            book.logs.push(log.clone());
            Ok(log)
        })
        .await
    }

    pub async fn update(&self, log_id: RecordId, patch: DailyLogPatch) -> AppResult<DailyLog> {
        let date = patch.date.as_deref().map(|date| require_date(date, "Log date")).transpose()?;
        let hours = patch.hours.map(validate_hours).transpose()?;
        self.mutate(|book| {
            let log = find_log(book, log_id)?;
            if let Some(date) = date {
                log.date = date;
            }
            if let Some(hours) = hours {
                log.hours = hours;
            }
            if patch.mood.is_some() {
                log.mood = blank_to_none(patch.mood);
            }
            if let Some(activities) = patch.activities {
                log.activities = activities;
            }
            if let Some(learnings) = patch.learnings {
                log.learnings = learnings;
            }
            Ok(log.clone())
        })
        .await
    }

    pub async fn set_review(&self, log_id: RecordId, review: Option<String>) -> AppResult<DailyLog> {
        self.mutate(|book| {
            let log = find_log(book, log_id)?;
            log.ai_review = blank_to_none(review);
            Ok(log.clone())
        })
        .await
    }

    pub async fn delete(&self, log_id: RecordId) -> AppResult<()> {
        self.mutate(|book| {
            let before = book.logs.len();
            book.logs.retain(|log| log.id != log_id);
            if book.logs.len() == before {
                return Err(missing_log(log_id));
            }
            Ok(())
        })
        .await
    }

    async fn mutate<R, F>(&self, change: F) -> AppResult<R>
    where
        F: FnOnce(&mut BasicLogs) -> AppResult<R>,
    {
        let result = self
            .ctx
            .mutate_document(LOGS_DOC, |book: &mut BasicLogs| {
                assign_missing_ids(book);
                change(book)
            })
            .await?;
        self.ctx.touched("daily_logs");
        Ok(result)
    }
}

fn find_log(book: &mut BasicLogs, log_id: RecordId) -> AppResult<&mut DailyLog> {
    book.logs
        .iter_mut()
        .find(|log| log.id == log_id)
        .ok_or_else(|| missing_log(log_id))
}

fn missing_log(log_id: RecordId) -> AppError {
    AppError::NotFound(format!("Daily log {} not found", log_id))
}
