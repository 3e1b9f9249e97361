use super::{require_text, StoreContext};
use crate::errors::AppResult;
use crate::models::{ExtraFields, NewSnippet, RecordId, Snippet, SnippetFilter, SnippetPatch};
use chrono::Utc;

pub const SNIPPETS_FOLDER: &str = "snippets";

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[derive(Clone)]
pub struct SnippetManager {
    ctx: StoreContext,
}

impl SnippetManager {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    pub fn list(&self, filter: &SnippetFilter) -> AppResult<Vec<Snippet>> {
        let snippets: Vec<Snippet> = self.ctx.collections.list(SNIPPETS_FOLDER)?;
        let language = filter.language.as_deref().map(str::to_lowercase);
        let tag = filter.tag.as_deref().map(|tag| tag.trim().to_lowercase());
        Ok(snippets
            .into_iter()
            .filter(|snippet| !filter.favorites_only || snippet.is_favorite)
            .filter(|snippet| match &language {
                Some(language) => snippet.language.to_lowercase() == *language,
                None => true,
            })
            .filter(|snippet| match &tag {
                Some(tag) => snippet.tags.iter().any(|t| t == tag),
                None => true,
            })
            .collect())
    }

    pub fn get(&self, snippet_id: RecordId) -> AppResult<Snippet> {
        self.ctx.load_item(SNIPPETS_FOLDER, snippet_id)
    }

    pub async fn create(&self, request: NewSnippet) -> AppResult<Snippet> {
        let title = require_text(&request.title, "Snippet title")?;
        let snippet = self
            .ctx
            .create_item(SNIPPETS_FOLDER, |id| {
                let now = Utc::now();
                Ok(Snippet {
                    id,
                    title,
                    code: request.code,
                    language: request.language.trim().to_string(),
                    category: request.category,
                    tags: normalize_tags(request.tags),
                    is_favorite: false,
                    created_at: Some(now),
                    updated_at: Some(now),
                    extra: ExtraFields::new(),
                })
            })
            .await?;
        self.ctx.touched("snippets");
        Ok(snippet)
    }

    pub async fn update(&self, snippet_id: RecordId, patch: SnippetPatch) -> AppResult<Snippet> {
        let snippet = self
            .ctx
            .mutate_item(SNIPPETS_FOLDER, snippet_id, |snippet: &mut Snippet| {
                if let Some(title) = patch.title {
                    snippet.title = require_text(&title, "Snippet title")?;
                }
                if let Some(code) = patch.code {
                    snippet.code = code;
                }
                if let Some(language) = patch.language {
                    snippet.language = language.trim().to_string();
                }
                if let Some(category) = patch.category {
                    snippet.category = category;
                }
                if let Some(tags) = patch.tags {
                    snippet.tags = normalize_tags(tags);
                }
                snippet.updated_at = Some(Utc::now());
                Ok(snippet.clone())
            })
            .await?;
        self.ctx.touched("snippets");
        Ok(snippet)
    }

    pub async fn toggle_favorite(&self, snippet_id: RecordId) -> AppResult<Snippet> {
        let snippet = self
            .ctx
            .mutate_item(SNIPPETS_FOLDER, snippet_id, |snippet: &mut Snippet| {
                snippet.is_favorite = !snippet.is_favorite;
                Ok(snippet.clone())
            })
            .await?;
        self.ctx.touched("snippets");
        Ok(snippet)
    }

    pub async fn delete(&self, snippet_id: RecordId) -> AppResult<()> {
        self.ctx.remove_item(SNIPPETS_FOLDER, snippet_id).await?;
        self.ctx.touched("snippets");
        Ok(())
    }
}
