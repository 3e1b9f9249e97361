use super::StoreContext;
use crate::errors::AppResult;
use crate::export::ExportSummary;
use crate::models::{Achievements, Notification, NotificationKind};
use crate::notify::{self, Notifier};
use crate::store::document::ACHIEVEMENTS_DOC;
use serde::Serialize;

pub struct AchievementDef {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub reached: fn(&ExportSummary) -> bool,
}

pub static CATALOGUE: &[AchievementDef] = &[
    AchievementDef {
        id: "first-log",
        title: "Day One",
        description: "Write your first daily log",
        reached: |s| s.log_days >= 1,
    },
    AchievementDef {
        id: "week-streak",
        title: "Seven Days In",
        description: "Log seven different days",
        reached: |s| s.log_days >= 7,
    },
    AchievementDef {
        id: "hundred-hours",
        title: "Centurion",
        description: "Log 100 hours of work",
        reached: |s| s.total_hours >= 100.0,
    },
    AchievementDef {
        id: "first-goal-done",
        title: "Goal Getter",
        description: "Complete a goal",
        reached: |s| s.goals.completed >= 1,
    },
    AchievementDef {
        id: "five-goals-done",
        title: "Finisher",
        description: "Complete five goals",
        reached: |s| s.goals.completed >= 5,
    },
    AchievementDef {
        id: "first-bounty",
        title: "Hunter",
        description: "Join your first bounty",
        reached: |s| s.bounty_count >= 1,
    },
    AchievementDef {
        id: "first-finding",
        title: "Bug Spotter",
        description: "Record a finding",
        reached: |s| s.finding_count >= 1,
    },
    AchievementDef {
        id: "first-win",
        title: "Paid Out",
        description: "Win a bounty",
        reached: |s| s.bounties_won >= 1,
    },
    AchievementDef {
        id: "note-taker",
        title: "Note Taker",
        description: "Keep ten notes",
        reached: |s| s.note_count >= 10,
    },
    AchievementDef {
        id: "snippet-collector",
        title: "Snippet Collector",
        description: "Save ten snippets",
        reached: |s| s.snippet_count >= 10,
    },
    AchievementDef {
        id: "first-earnings",
        title: "In The Black",
        description: "Reach positive total earnings",
        reached: |s| s.total_earnings > 0.0,
    },
    AchievementDef {
        id: "ten-k",
        title: "Five Figures",
        description: "Reach 10,000 in total earnings",
        reached: |s| s.total_earnings >= 10_000.0,
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementStatus {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub unlocked: bool,
}

#[derive(Clone)]
pub struct AchievementManager {
    ctx: StoreContext,
    notifier: Notifier,
}

impl AchievementManager {
    pub fn new(ctx: StoreContext, notifier: Notifier) -> Self {
        Self { ctx, notifier }
    }

    pub fn unlocked(&self) -> AppResult<Achievements> {
        self.ctx.documents.load_or_default(ACHIEVEMENTS_DOC)
    }

    pub fn status(&self) -> AppResult<Vec<AchievementStatus>> {
        let unlocked = self.unlocked()?;
        Ok(CATALOGUE
            .iter()
            .map(|def| AchievementStatus {
                id: def.id,
                title: def.title,
                description: def.description,
                unlocked: unlocked.unlocked_ids.iter().any(|id| id == def.id),
            })
            .collect())
    }

    /// Unlocks every achievement the summary now satisfies. Ids are only ever
    /// appended; ids unknown to the catalogue are kept as they are. Does not
    /// tick the change counter, which would re-trigger evaluation.
    pub async fn evaluate(&self, summary: &ExportSummary) -> AppResult<Vec<Notification>> {
        let fresh: Vec<&'static AchievementDef> = self
            .ctx
            .mutate_document(ACHIEVEMENTS_DOC, |state: &mut Achievements| {
                let fresh: Vec<&'static AchievementDef> = CATALOGUE
                    .iter()
                    .filter(|def| (def.reached)(summary))
                    .filter(|def| !state.unlocked_ids.iter().any(|id| id == def.id))
                    .collect();
                state
                    .unlocked_ids
                    .extend(fresh.iter().map(|def| def.id.to_string()));
                Ok(fresh)
            })
            .await?;

        let notifications: Vec<Notification> = fresh
            .into_iter()
            .map(|def| {
                notify::build(
                    NotificationKind::Achievement,
                    format!("Achievement unlocked: {}", def.title),
                    def.description.to_string(),
                )
            })
            .collect();
        for notification in &notifications {
            self.notifier.publish(notification.clone());
        }
        Ok(notifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::test_context;

    fn summary() -> ExportSummary {
        ExportSummary::default()
    }

    #[test]
    fn catalogue_ids_are_unique() {
        let mut ids: Vec<&str> = CATALOGUE.iter().map(|def| def.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), CATALOGUE.len());
    }

    #[tokio::test]
    async fn unlocks_once_and_notifies() {
        let (_dir, ctx) = test_context();
        let notifier = Notifier::new();
        let mut receiver = notifier.subscribe();
        let achievements = AchievementManager::new(ctx, notifier);

        let mut reached = summary();
        reached.log_days = 1;
        reached.bounty_count = 2;
        let first = achievements.evaluate(&reached).await.expect("evaluate");
        assert_eq!(first.len(), 2);
        assert_eq!(receiver.recv().await.expect("notification").kind, NotificationKind::Achievement);

        let again = achievements.evaluate(&reached).await.expect("evaluate again");
        assert!(again.is_empty());
        assert_eq!(
            achievements.unlocked().expect("unlocked").unlocked_ids,
            vec!["first-log".to_string(), "first-bounty".to_string()]
        );
    }

    #[tokio::test]
    async fn unlocked_ids_are_never_removed() {
        let (_dir, ctx) = test_context();
        ctx.documents
            .save(
                ACHIEVEMENTS_DOC,
                &Achievements {
                    unlocked_ids: vec!["legacy-badge".to_string(), "first-win".to_string()],
                },
            )
            .expect("seed");
        let achievements = AchievementManager::new(ctx, Notifier::new());

        let fresh = achievements.evaluate(&summary()).await.expect("evaluate");
        assert!(fresh.is_empty());
        let state = achievements.unlocked().expect("unlocked");
        assert_eq!(state.unlocked_ids, vec!["legacy-badge".to_string(), "first-win".to_string()]);

        let status = achievements.status().expect("status");
        assert!(status.iter().find(|s| s.id == "first-win").expect("first-win").unlocked);
        assert!(!status.iter().find(|s| s.id == "first-log").expect("first-log").unlocked);
    }
}
