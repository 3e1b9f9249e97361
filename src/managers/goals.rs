use super::{next_nested_id, require_text, StoreContext};
use crate::errors::{AppError, AppResult};
use crate::models::{
    clamp_progress, ExtraFields, Goal, GoalPatch, GoalStatus, Milestone, MilestonePatch, NewGoal, RecordId,
};
use chrono::Utc;

pub const GOALS_FOLDER: &str = "goals";

#[derive(Clone)]
pub struct GoalManager {
    ctx: StoreContext,
}

impl GoalManager {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    pub fn list(&self) -> AppResult<Vec<Goal>> {
        self.ctx.collections.list(GOALS_FOLDER)
    }

    pub fn get(&self, goal_id: RecordId) -> AppResult<Goal> {
        self.ctx.load_item(GOALS_FOLDER, goal_id)
    }

    pub async fn create(&self, request: NewGoal) -> AppResult<Goal> {
        let title = require_text(&request.title, "Goal title")?;
        let goal = self
            .ctx
            .create_item(GOALS_FOLDER, |id| {
                let now = Utc::now();
                let mut milestones: Vec<Milestone> = Vec::new();
                for raw in &request.milestones {
                    let Ok(title) = require_text(raw, "Milestone title") else {
                        continue;
                    };
                    let id = next_nested_id(milestones.iter().map(|m| m.id));
                    milestones.push(Milestone {
                        id,
                        title,
                        completed: false,
                    });
                }
                Ok(Goal {
                    id,
                    title,
                    description: request.description.trim().to_string(),
                    status: GoalStatus::Active,
                    progress: 0.0,
                    category: request.category.trim().to_string(),
                    priority: request.priority,
                    deadline: request.deadline.clone(),
                    milestones,
                    image_path: request.image_path.clone(),
                    created_at: Some(now),
                    updated_at: Some(now),
                    completed_at: None,
                    extra: ExtraFields::new(),
                })
            })
            .await?;
        self.ctx.touched("goals");
        Ok(goal)
    }

    /// Writes a caller-built goal as-is, clamping progress.
    pub async fn save(&self, mut goal: Goal) -> AppResult<Goal> {
        require_text(&goal.title, "Goal title")?;
        goal.progress = clamp_progress(goal.progress);
        ensure_unique_milestones(&goal)?;
        self.ctx.put_item(GOALS_FOLDER, goal.id, &goal).await?;
        self.ctx.touched("goals");
        Ok(goal)
    }

    pub async fn update(&self, goal_id: RecordId, patch: GoalPatch) -> AppResult<Goal> {
        let goal = self
            .ctx
            .mutate_item(GOALS_FOLDER, goal_id, |goal: &mut Goal| {
                apply_patch(goal, patch)?;
                Ok(goal.clone())
            })
            .await?;
        self.ctx.touched("goals");
        Ok(goal)
    }

    pub async fn delete(&self, goal_id: RecordId) -> AppResult<()> {
        self.ctx.remove_item(GOALS_FOLDER, goal_id).await?;
        self.ctx.touched("goals");
        Ok(())
    }

    pub async fn add_milestone(&self, goal_id: RecordId, title: &str) -> AppResult<Milestone> {
        let title = require_text(title, "Milestone title")?;
        let milestone = self
            .ctx
            .mutate_item(GOALS_FOLDER, goal_id, |goal: &mut Goal| {
                let milestone = Milestone {
                    id: next_nested_id(goal.milestones.iter().map(|m| m.id)),
                    title,
                    completed: false,
                };
                goal.milestones.push(milestone.clone());
                goal.updated_at = Some(Utc::now());
                Ok(milestone)
            })
            .await?;
        self.ctx.touched("goals");
        Ok(milestone)
    }

    pub async fn update_milestone(
        &self,
        goal_id: RecordId,
        milestone_id: RecordId,
        patch: MilestonePatch,
    ) -> AppResult<Milestone> {
        let milestone = self
            .ctx
            .mutate_item(GOALS_FOLDER, goal_id, |goal: &mut Goal| {
                let milestone = find_milestone(goal, milestone_id)?;
                if let Some(title) = patch.title {
                    milestone.title = require_text(&title, "Milestone title")?;
                }
                if let Some(completed) = patch.completed {
                    milestone.completed = completed;
                }
                let updated = milestone.clone();
                goal.updated_at = Some(Utc::now());
                Ok(updated)
            })
            .await?;
        self.ctx.touched("goals");
        Ok(milestone)
    }

    pub async fn toggle_milestone(&self, goal_id: RecordId, milestone_id: RecordId) -> AppResult<Milestone> {
        let milestone = self
            .ctx
            .mutate_item(GOALS_FOLDER, goal_id, |goal: &mut Goal| {
                let milestone = find_milestone(goal, milestone_id)?;
                milestone.completed = !milestone.completed;
                let updated = milestone.clone();
                goal.updated_at = Some(Utc::now());
                Ok(updated)
            })
            .await?;
        self.ctx.touched("goals");
        Ok(milestone)
    }

    pub async fn delete_milestone(&self, goal_id: RecordId, milestone_id: RecordId) -> AppResult<()> {
        self.ctx
            .mutate_item(GOALS_FOLDER, goal_id, |goal: &mut Goal| {
                let before = goal.milestones.len();
                goal.milestones.retain(|m| m.id != milestone_id);
                if goal.milestones.len() == before {
                    return Err(AppError::NotFound(format!(
                        "Milestone {} not found in goal {}",
                        milestone_id, goal_id
                    )));
                }
                goal.updated_at = Some(Utc::now());
                Ok(())
            })
            .await?;
        self.ctx.touched("goals");
        Ok(())
    }
}

fn apply_patch(goal: &mut Goal, patch: GoalPatch) -> AppResult<()> {
    if let Some(title) = patch.title {
        goal.title = require_text(&title, "Goal title")?;
    }
    if let Some(description) = patch.description {
        goal.description = description;
    }
    if let Some(category) = patch.category {
        goal.category = category;
    }
    if let Some(priority) = patch.priority {
        goal.priority = priority;
    }
    if let Some(deadline) = patch.deadline {
        goal.deadline = if deadline.trim().is_empty() { None } else { Some(deadline) };
    }
    if let Some(image_path) = patch.image_path {
        goal.image_path = Some(image_path);
    }
    if let Some(progress) = patch.progress {
        goal.progress = clamp_progress(progress);
    }
    if let Some(status) = patch.status {
        match status {
            GoalStatus::Completed => {
                goal.progress = 100.0;
                if goal.completed_at.is_none() {
                    goal.completed_at = Some(Utc::now());
                }
            }
            GoalStatus::Active | GoalStatus::Paused => goal.completed_at = None,
        }
        goal.status = status;
    }
    goal.updated_at = Some(Utc::now());
    Ok(())
}

fn find_milestone(goal: &mut Goal, milestone_id: RecordId) -> AppResult<&mut Milestone> {
    let goal_id = goal.id;
    goal.milestones
        .iter_mut()
        .find(|m| m.id == milestone_id)
        .ok_or_else(|| AppError::NotFound(format!("Milestone {} not found in goal {}", milestone_id, goal_id)))
}

fn ensure_unique_milestones(goal: &Goal) -> AppResult<()> {
    let mut seen = std::collections::HashSet::new();
    for milestone in &goal.milestones {
        if !seen.insert(milestone.id) {
            return Err(AppError::Validation(format!(
                "Milestone id {} appears twice in goal {}",
                milestone.id, goal.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::test_context;
    use crate::models::Priority;

    fn sample(id: RecordId, title: &str) -> Goal {
        let now = Utc::now();
        Goal {
            id,
            title: title.to_string(),
            description: String::new(),
            status: GoalStatus::Active,
            progress: 0.0,
            category: "security".to_string(),
            priority: Priority::High,
            deadline: None,
            milestones: Vec::new(),
            image_path: None,
            created_at: Some(now),
            updated_at: Some(now),
            completed_at: None,
            extra: ExtraFields::new(),
        }
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(clamp_progress(-20.0), 0.0);
        assert_eq!(clamp_progress(55.5), 55.5);
        assert_eq!(clamp_progress(250.0), 100.0);
        assert_eq!(clamp_progress(f64::NAN), 0.0);
    }

    #[tokio::test]
    async fn create_seeds_milestones_with_unique_ids() {
        let (_dir, ctx) = test_context();
        let goals = GoalManager::new(ctx);
        let goal = goals
            .create(NewGoal {
                title: "  Audit lending protocol ".to_string(),
                milestones: vec!["Read code".to_string(), " ".to_string(), "Write PoC".to_string()],
                ..NewGoal::default()
            })
            .await
            .expect("create");
        assert_eq!(goal.title, "Audit lending protocol");
        assert_eq!(goal.milestones.len(), 2);
        assert_ne!(goal.milestones[0].id, goal.milestones[1].id);
        assert_eq!(goals.get(goal.id).expect("reload"), goal);
    }

    #[tokio::test]
    async fn goal_with_milestone_scenario() {
        let (_dir, ctx) = test_context();
        let goals = GoalManager::new(ctx);
        goals.save(sample(1, "Learn Foundry")).await.expect("save");

        let milestone = goals.add_milestone(1, "Read docs").await.expect("milestone");
        goals.toggle_milestone(1, milestone.id).await.expect("toggle");
        goals
            .update(
                1,
                GoalPatch {
                    progress: Some(50.0),
                    ..GoalPatch::default()
                },
            )
            .await
            .expect("progress");

        let reloaded = goals.get(1).expect("reload");
        assert_eq!(reloaded.progress, 50.0);
        assert_eq!(reloaded.milestones.len(), 1);
        assert_eq!(reloaded.milestones[0].title, "Read docs");
        assert!(reloaded.milestones[0].completed);
    }

    #[tokio::test]
    async fn completing_sets_full_progress_and_timestamp() {
        let (_dir, ctx) = test_context();
        let goals = GoalManager::new(ctx);
        goals.save(sample(3, "Ship")).await.expect("save");
        let done = goals
            .update(
                3,
                GoalPatch {
                    status: Some(GoalStatus::Completed),
                    ..GoalPatch::default()
                },
            )
            .await
            .expect("complete");
        assert_eq!(done.progress, 100.0);
        assert!(done.completed_at.is_some());

        let reopened = goals
            .update(
                3,
                GoalPatch {
                    status: Some(GoalStatus::Paused),
                    ..GoalPatch::default()
                },
            )
            .await
            .expect("pause");
        assert!(reopened.completed_at.is_none());
    }

    #[tokio::test]
    async fn concurrent_milestone_adds_are_not_lost() {
        let (_dir, ctx) = test_context();
        let goals = GoalManager::new(ctx);
        goals.save(sample(9, "Parallel")).await.expect("save");

        let mut handles = Vec::new();
        for n in 0..8 {
            let goals = goals.clone();
            handles.push(tokio::spawn(async move {
                goals.add_milestone(9, &format!("step {}", n)).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("add");
        }

        let goal = goals.get(9).expect("reload");
        assert_eq!(goal.milestones.len(), 8);
        let mut ids: Vec<RecordId> = goal.milestones.iter().map(|m| m.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    #[tokio::test]
    async fn deleting_unknown_milestone_is_not_found() {
        let (_dir, ctx) = test_context();
        let goals = GoalManager::new(ctx);
        goals.save(sample(4, "x")).await.expect("save");
        let error = goals.delete_milestone(4, 77).await.expect_err("missing");
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let (_dir, ctx) = test_context();
        let goals = GoalManager::new(ctx);
        for id in [3, 1, 2] {
            goals.save(sample(id, "g")).await.expect("save");
        }
        let ids: Vec<RecordId> = goals.list().expect("list").iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn update_keeps_fields_the_app_does_not_model() {
        let (_dir, ctx) = test_context();
        ctx.collections
            .save_item(
                GOALS_FOLDER,
                "1.json",
                &serde_json::json!({"id": 1, "title": "Audit", "notes": "keep me", "progress": 50.5}),
            )
            .expect("seed");
        let goals = GoalManager::new(ctx.clone());
        assert_eq!(goals.get(1).expect("fractional progress parses").progress, 50.5);

        goals
            .update(
                1,
                GoalPatch {
                    progress: Some(10.0),
                    ..GoalPatch::default()
                },
            )
            .await
            .expect("update");

        let stored: serde_json::Value = ctx.collections.load_item(GOALS_FOLDER, "1.json").expect("raw");
        assert_eq!(stored["notes"], "keep me");
        assert_eq!(stored["progress"], 10);
        assert!(stored.get("createdAt").is_none());
        assert!(stored["updatedAt"].is_string());
    }
}
