use super::{require_text, StoreContext};
use crate::errors::AppResult;
use crate::models::{LearningState, MentalState, ProfileIdentity, SavedMedia, SkillLevel, UserProfile};
use crate::store::document::PROFILE_DOC;
use crate::store::MediaStore;
use std::collections::BTreeMap;
use std::str::FromStr;

/// `solidity` -> `Solidity`; all-caps keys such as `EVM` are kept.
pub fn normalize_skill_key(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().any(char::is_alphabetic) && !trimmed.chars().any(char::is_lowercase) {
        return trimmed.to_string();
    }
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn rank(level: SkillLevel) -> u8 {
    match level {
        SkillLevel::Beginner => 0,
        SkillLevel::Intermediate => 1,
        SkillLevel::Advanced => 2,
    }
}

/// Rewrites keys into their normalized form. When two keys collapse into one the
/// higher level is kept.
pub fn normalize_skills(skills: BTreeMap<String, SkillLevel>) -> BTreeMap<String, SkillLevel> {
    let mut merged: BTreeMap<String, SkillLevel> = BTreeMap::new();
    for (key, level) in skills {
        let key = normalize_skill_key(&key);
        if key.is_empty() {
            continue;
        }
        merged
            .entry(key)
            .and_modify(|existing| {
                if rank(level) > rank(*existing) {
                    *existing = level;
                }
            })
            .or_insert(level);
    }
    merged
}

#[derive(Clone)]
pub struct ProfileManager {
    ctx: StoreContext,
    media: MediaStore,
}

impl ProfileManager {
    pub fn new(ctx: StoreContext, media: MediaStore) -> Self {
        Self { ctx, media }
    }

    pub fn get(&self) -> AppResult<UserProfile> {
        self.ctx.documents.load_or_default(PROFILE_DOC)
    }

    pub async fn save(&self, profile: UserProfile) -> AppResult<UserProfile> {
        self.mutate(|current| {
            *current = profile;
            Ok(())
        })
        .await
    }

    pub async fn set_skill(&self, skill: &str, level: &str) -> AppResult<UserProfile> {
        let skill = normalize_skill_key(&require_text(skill, "Skill name")?);
        let level = SkillLevel::from_str(level)?;
        self.mutate(|profile| {
            profile.skill_levels.insert(skill, level);
            Ok(())
        })
        .await
    }

    pub async fn remove_skill(&self, skill: &str) -> AppResult<UserProfile> {
        let name = skill.trim().to_string();
        self.mutate(|profile| {
            profile.skill_levels.retain(|key, _| !key.eq_ignore_ascii_case(&name));
            Ok(())
        })
        .await
    }

    pub async fn update_identity(&self, identity: ProfileIdentity) -> AppResult<UserProfile> {
        self.mutate(|profile| {
            profile.identity = ProfileIdentity {
                nickname: identity.nickname.trim().to_string(),
                ai_instructions: identity.ai_instructions,
            };
            Ok(())
        })
        .await
    }

    pub async fn update_learning(&self, learning: LearningState) -> AppResult<UserProfile> {
        self.mutate(|profile| {
            profile.learning = learning;
            Ok(())
        })
        .await
    }

    pub async fn update_mental_state(&self, mental_state: MentalState) -> AppResult<UserProfile> {
        self.mutate(|profile| {
            profile.mental_state = mental_state;
            Ok(())
        })
        .await
    }

    /// Stores the photo bytes under the media folder and points the profile at them.
    pub async fn set_photo(&self, filename: &str, bytes: &[u8]) -> AppResult<SavedMedia> {
        let saved = self.media.save_binary(filename, bytes)?;
        let photo = filename.to_string();
        self.mutate(|profile| {
            profile.photo_path = Some(photo);
            Ok(())
        })
        .await?;
        Ok(saved)
    }

    /// Skill keys are normalized on every write, whichever operation made it.
    async fn mutate<F>(&self, change: F) -> AppResult<UserProfile>
    where
        F: FnOnce(&mut UserProfile) -> AppResult<()>,
    {
        let profile = self
            .ctx
            .mutate_document(PROFILE_DOC, |profile: &mut UserProfile| {
                change(profile)?;
                profile.skill_levels = normalize_skills(std::mem::take(&mut profile.skill_levels));
                profile.traits.retain(|t| !t.trim().is_empty());
                Ok(profile.clone())
            })
            .await?;
        self.ctx.touched("profile");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::test_context;

    fn manager() -> (tempfile::TempDir, ProfileManager) {
        let (dir, ctx) = test_context();
        let media = MediaStore::new(dir.path().join("media"));
        (dir, ProfileManager::new(ctx, media))
    }

    #[test]
    fn skill_keys_are_capitalized() {
        assert_eq!(normalize_skill_key("solidity"), "Solidity");
        assert_eq!(normalize_skill_key(" rUST "), "Rust");
        assert_eq!(normalize_skill_key("EVM"), "EVM");
        assert_eq!(normalize_skill_key("   "), "");
    }

    #[test]
    fn colliding_keys_keep_the_higher_level() {
        let mut raw = BTreeMap::new();
        raw.insert("rust".to_string(), SkillLevel::Advanced);
        raw.insert("Rust".to_string(), SkillLevel::Beginner);
        raw.insert("go".to_string(), SkillLevel::Intermediate);
        let merged = normalize_skills(raw);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["Rust"], SkillLevel::Advanced);
        assert_eq!(merged["Go"], SkillLevel::Intermediate);
    }

    #[tokio::test]
    async fn absent_profile_reads_as_default() {
        let (_dir, profiles) = manager();
        assert_eq!(profiles.get().expect("get"), UserProfile::default());
    }

    #[tokio::test]
    async fn save_normalizes_and_round_trips() {
        let (_dir, profiles) = manager();
        let mut profile = UserProfile::default();
        profile.identity.nickname = "0xcat".to_string();
        profile.skill_levels.insert("foundry".to_string(), SkillLevel::Intermediate);
        profile.traits = vec!["curious".to_string(), " ".to_string()];

        let saved = profiles.save(profile).await.expect("save");
        assert!(saved.skill_levels.contains_key("Foundry"));
        assert_eq!(saved.traits, vec!["curious".to_string()]);
        assert_eq!(profiles.get().expect("reload"), saved);
    }

    #[tokio::test]
    async fn set_skill_validates_level() {
        let (_dir, profiles) = manager();
        let profile = profiles.set_skill("huff", "Advanced").await.expect("set");
        assert_eq!(profile.skill_levels["Huff"], SkillLevel::Advanced);

        let error = profiles.set_skill("huff", "wizard").await.expect_err("bad level");
        assert_eq!(error.code(), "VALIDATION");

        let profile = profiles.set_skill("HuFf", "beginner").await.expect("downgrade");
        assert_eq!(profile.skill_levels.len(), 1);
        assert_eq!(profile.skill_levels["Huff"], SkillLevel::Beginner);

        let profile = profiles.remove_skill(" HUFF ").await.expect("remove");
        assert!(profile.skill_levels.is_empty());
    }

    #[tokio::test]
    async fn photo_is_written_to_media() {
        let (dir, profiles) = manager();
        let saved = profiles.set_photo("avatar.png", &[1, 2, 3]).await.expect("photo");
        assert_eq!(saved.size, 3);
        assert!(dir.path().join("media").join("avatar.png").is_file());
        assert_eq!(profiles.get().expect("get").photo_path.as_deref(), Some("avatar.png"));
    }
}
