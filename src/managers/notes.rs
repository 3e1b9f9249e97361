use super::{require_text, StoreContext};
use crate::errors::AppResult;
use crate::models::{ExtraFields, NewNote, Note, NotePatch, RecordId};
use chrono::Utc;
use std::cmp::Ordering;

pub const NOTES_FOLDER: &str = "notes";
const DEFAULT_COLOR: &str = "default";

/// Pinned first, then most recently edited, then newest id. Notes with no
/// recorded edit time sort as the oldest.
pub fn compare_notes(a: &Note, b: &Note) -> Ordering {
    b.is_pinned
        .cmp(&a.is_pinned)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| b.id.cmp(&a.id))
}

#[derive(Clone)]
pub struct NoteManager {
    ctx: StoreContext,
}

impl NoteManager {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    pub fn list(&self) -> AppResult<Vec<Note>> {
        let mut notes: Vec<Note> = self.ctx.collections.list(NOTES_FOLDER)?;
        notes.sort_by(compare_notes);
        Ok(notes)
    }

    pub fn get(&self, note_id: RecordId) -> AppResult<Note> {
        self.ctx.load_item(NOTES_FOLDER, note_id)
    }

    pub fn search(&self, query: &str) -> AppResult<Vec<Note>> {
        let needle = query.trim().to_lowercase();
        let notes = self.list()?;
        if needle.is_empty() {
            return Ok(notes);
        }
        Ok(notes
            .into_iter()
            .filter(|note| {
                note.title.to_lowercase().contains(&needle) || note.content.to_lowercase().contains(&needle)
            })
            .collect())
    }

    pub async fn create(&self, request: NewNote) -> AppResult<Note> {
        let title = require_text(&request.title, "Note title")?;
        let note = self
            .ctx
            .create_item(NOTES_FOLDER, |id| {
                let now = Utc::now();
                Ok(Note {
                    id,
                    title,
                    content: request.content,
                    color: request.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
                    category: request.category,
                    is_pinned: false,
                    created_at: Some(now),
                    updated_at: Some(now),
                    extra: ExtraFields::new(),
                })
            })
            .await?;
        self.ctx.touched("notes");
        Ok(note)
    }

    pub async fn update(&self, note_id: RecordId, patch: NotePatch) -> AppResult<Note> {
        let note = self
            .ctx
            .mutate_item(NOTES_FOLDER, note_id, |note: &mut Note| {
                if let Some(title) = patch.title {
                    note.title = require_text(&title, "Note title")?;
                }
                if let Some(content) = patch.content {
                    note.content = content;
                }
                if let Some(color) = patch.color {
                    note.color = color;
                }
                if let Some(category) = patch.category {
                    note.category = category;
                }
                note.updated_at = Some(Utc::now());
                Ok(note.clone())
            })
            .await?;
        self.ctx.touched("notes");
        Ok(note)
    }

    /// Pinning is not an edit, so `updatedAt` is left alone.
    pub async fn toggle_pin(&self, note_id: RecordId) -> AppResult<Note> {
        let note = self
            .ctx
            .mutate_item(NOTES_FOLDER, note_id, |note: &mut Note| {
                note.is_pinned = !note.is_pinned;
                Ok(note.clone())
            })
            .await?;
        self.ctx.touched("notes");
        Ok(note)
    }

    pub async fn delete(&self, note_id: RecordId) -> AppResult<()> {
        self.ctx.remove_item(NOTES_FOLDER, note_id).await?;
        self.ctx.touched("notes");
        Ok(())
    }
}
