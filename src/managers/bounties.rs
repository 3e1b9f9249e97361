use super::{next_nested_id, require_text, StoreContext};
use crate::errors::{AppError, AppResult};
use crate::models::{
    Bounty, BountyPatch, BountyStatus, ExtraFields, Finding, FindingPatch, FindingStatus, NewBounty, NewFinding,
    RecordId,
};
use chrono::Utc;

pub const BOUNTIES_FOLDER: &str = "bounties";

#[derive(Clone)]
pub struct BountyManager {
    ctx: StoreContext,
}

impl BountyManager {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    pub fn list(&self) -> AppResult<Vec<Bounty>> {
        self.ctx.collections.list(BOUNTIES_FOLDER)
    }

    pub fn get(&self, bounty_id: RecordId) -> AppResult<Bounty> {
        self.ctx.load_item(BOUNTIES_FOLDER, bounty_id)
    }

    pub async fn create(&self, request: NewBounty) -> AppResult<Bounty> {
        let platform = require_text(&request.platform, "Platform")?;
        let contest = require_text(&request.contest, "Contest")?;
        let reward = validate_reward(request.reward)?;
        let bounty = self
            .ctx
            .create_item(BOUNTIES_FOLDER, |id| {
                let now = Utc::now();
                Ok(Bounty {
                    id,
                    platform,
                    contest,
                    status: BountyStatus::Ongoing,
                    reward,
                    url: request.url.clone(),
                    start_date: request.start_date.clone(),
                    end_date: request.end_date.clone(),
                    findings: Vec::new(),
                    created_at: Some(now),
                    updated_at: Some(now),
                    extra: ExtraFields::new(),
                })
            })
            .await?;
        self.ctx.touched("bounties");
        Ok(bounty)
    }

    pub async fn update(&self, bounty_id: RecordId, patch: BountyPatch) -> AppResult<Bounty> {
        let reward = validate_reward(patch.reward)?;
        let bounty = self
            .ctx
            .mutate_item(BOUNTIES_FOLDER, bounty_id, |bounty: &mut Bounty| {
                if let Some(platform) = patch.platform {
                    bounty.platform = require_text(&platform, "Platform")?;
                }
                if let Some(contest) = patch.contest {
                    bounty.contest = require_text(&contest, "Contest")?;
                }
                if let Some(status) = patch.status {
                    bounty.status = status;
                }
                if reward.is_some() {
                    bounty.reward = reward;
                }
                if let Some(url) = patch.url {
                    bounty.url = Some(url);
                }
                if let Some(start_date) = patch.start_date {
                    bounty.start_date = Some(start_date);
                }
                if let Some(end_date) = patch.end_date {
                    bounty.end_date = Some(end_date);
                }
                bounty.updated_at = Some(Utc::now());
                Ok(bounty.clone())
            })
            .await?;
        self.ctx.touched("bounties");
        Ok(bounty)
    }

    pub async fn delete(&self, bounty_id: RecordId) -> AppResult<()> {
        self.ctx.remove_item(BOUNTIES_FOLDER, bounty_id).await?;
        self.ctx.touched("bounties");
        Ok(())
    }

    pub async fn add_finding(&self, bounty_id: RecordId, request: NewFinding) -> AppResult<Finding> {
        let title = require_text(&request.title, "Finding title")?;
        let finding = self
            .ctx
            .mutate_item(BOUNTIES_FOLDER, bounty_id, |bounty: &mut Bounty| {
                let finding = Finding {
                    id: next_nested_id(bounty.findings.iter().map(|f| f.id)),
                    severity: request.severity,
                    title,
                    description: request.description,
                    status: FindingStatus::Draft,
                    created_at: Some(Utc::now()),
                };
                bounty.findings.push(finding.clone());
                bounty.updated_at = Some(Utc::now());
                Ok(finding)
            })
            .await?;
        self.ctx.touched("bounties");
        Ok(finding)
    }

    pub async fn update_finding(
        &self,
        bounty_id: RecordId,
        finding_id: RecordId,
        patch: FindingPatch,
    ) -> AppResult<Finding> {
        let finding = self
            .ctx
            .mutate_item(BOUNTIES_FOLDER, bounty_id, |bounty: &mut Bounty| {
                let finding = bounty
                    .findings
                    .iter_mut()
                    .find(|f| f.id == finding_id)
                    .ok_or_else(|| missing_finding(bounty_id, finding_id))?;
                if let Some(severity) = patch.severity {
                    finding.severity = severity;
                }
                if let Some(title) = patch.title {
                    finding.title = require_text(&title, "Finding title")?;
                }
                if let Some(description) = patch.description {
                    finding.description = description;
                }
                if let Some(status) = patch.status {
                    finding.status = status;
                }
                let updated = finding.clone();
                bounty.updated_at = Some(Utc::now());
                Ok(updated)
            })
            .await?;
        self.ctx.touched("bounties");
        Ok(finding)
    }

    pub async fn delete_finding(&self, bounty_id: RecordId, finding_id: RecordId) -> AppResult<()> {
        self.ctx
            .mutate_item(BOUNTIES_FOLDER, bounty_id, |bounty: &mut Bounty| {
                let before = bounty.findings.len();
                bounty.findings.retain(|f| f.id != finding_id);
                if bounty.findings.len() == before {
                    return Err(missing_finding(bounty_id, finding_id));
                }
                bounty.updated_at = Some(Utc::now());
                Ok(())
            })
            .await?;
        self.ctx.touched("bounties");
        Ok(())
    }
}

fn missing_finding(bounty_id: RecordId, finding_id: RecordId) -> AppError {
    AppError::NotFound(format!("Finding {} not found in bounty {}", finding_id, bounty_id))
}

fn validate_reward(reward: Option<f64>) -> AppResult<Option<f64>> {
    match reward {
        Some(value) if !value.is_finite() || value < 0.0 => {
            Err(AppError::Validation(format!("Reward must be a non-negative number, got {}", value)))
        }
        other => Ok(other),
    }
}
