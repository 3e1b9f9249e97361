use super::{next_nested_id, require_date, require_text, StoreContext};
use crate::errors::{AppError, AppResult};
use crate::models::{
    FinancialGoal, FinancialGoalPatch, NewFinancialGoal, NewTransaction, RecordId, Transaction, TransactionKind,
    TransactionPatch, WalletDocument,
};
use crate::store::document::WALLET_DOC;
use chrono::Local;

pub fn compute_balance(transactions: &[Transaction]) -> f64 {
    transactions.iter().fold(0.0, |balance, tx| match tx.kind {
        TransactionKind::Income => balance + tx.amount,
        TransactionKind::Expense => balance - tx.amount,
    })
}

fn validate_amount(amount: f64) -> AppResult<f64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::Validation(format!("Amount must be a positive number, got {}", amount)));
    }
    Ok(amount)
}

/// Leaves `pinned_id` as the only pinned goal.
fn pin_exclusively(goals: &mut [FinancialGoal], pinned_id: RecordId) {
    for goal in goals.iter_mut() {
        goal.is_pinned = goal.id == pinned_id;
    }
}

#[derive(Clone)]
pub struct WalletManager {
    ctx: StoreContext,
}

impl WalletManager {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    pub fn load(&self) -> AppResult<WalletDocument> {
        self.ctx.documents.load_or_default(WALLET_DOC)
    }

    pub fn balance(&self) -> AppResult<f64> {
        Ok(self.load()?.balance)
    }

    /// Newest date first; same-day entries fall back to id.
    pub fn list_transactions(&self) -> AppResult<Vec<Transaction>> {
        let mut transactions = self.load()?.transactions;
        transactions.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
        Ok(transactions)
    }

    /// Net amount of transactions linked to a bounty. Dangling links are allowed.
    pub fn earnings_for_bounty(&self, bounty_id: RecordId) -> AppResult<f64> {
        let linked: Vec<Transaction> = self
            .load()?
            .transactions
            .into_iter()
            .filter(|tx| tx.linked_bounty_id == Some(bounty_id))
            .collect();
        Ok(compute_balance(&linked))
    }

    pub async fn add_transaction(&self, request: NewTransaction) -> AppResult<Transaction> {
        let amount = validate_amount(request.amount)?;
        let date = match request.date.as_deref() {
            Some(date) if !date.trim().is_empty() => require_date(date, "Transaction date")?,
            _ => Local::now().format("%Y-%m-%d").to_string(),
        };
        let transaction = self
            .mutate(|wallet| {
                let transaction = Transaction {
                    id: next_nested_id(wallet.transactions.iter().map(|tx| tx.id)),
                    kind: request.kind,
                    amount,
                    category: request.category.trim().to_string(),
                    description: request.description,
                    date,
                    linked_bounty_id: request.linked_bounty_id,
                };
                wallet.transactions.push(transaction.clone());
                Ok(transaction)
            })
            .await?;
        tracing::info!(
            transaction_id = transaction.id,
            kind = ?transaction.kind,
            amount = transaction.amount,
            "transaction recorded"
        );
        Ok(transaction)
    }

    pub async fn update_transaction(&self, transaction_id: RecordId, patch: TransactionPatch) -> AppResult<Transaction> {
        let amount = patch.amount.map(validate_amount).transpose()?;
        let date = patch
            .date
            .as_deref()
            .map(|date| require_date(date, "Transaction date"))
            .transpose()?;
        self.mutate(|wallet| {
            let tx = wallet
                .transactions
                .iter_mut()
                .find(|tx| tx.id == transaction_id)
                .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", transaction_id)))?;
            if let Some(kind) = patch.kind {
                tx.kind = kind;
            }
            if let Some(amount) = amount {
                tx.amount = amount;
            }
            if let Some(category) = patch.category {
                tx.category = category;
            }
            if let Some(description) = patch.description {
                tx.description = description;
            }
            if let Some(date) = date {
                tx.date = date;
            }
            if patch.linked_bounty_id.is_some() {
                tx.linked_bounty_id = patch.linked_bounty_id;
            }
            Ok(tx.clone())
        })
        .await
    }

    pub async fn delete_transaction(&self, transaction_id: RecordId) -> AppResult<()> {
        self.mutate(|wallet| {
            let before = wallet.transactions.len();
            wallet.transactions.retain(|tx| tx.id != transaction_id);
            if wallet.transactions.len() == before {
                return Err(AppError::NotFound(format!("Transaction {} not found", transaction_id)));
            }
            Ok(())
        })
        .await
    }

    pub fn list_financial_goals(&self) -> AppResult<Vec<FinancialGoal>> {
        Ok(self.load()?.financial_goals)
    }

    pub async fn add_financial_goal(&self, request: NewFinancialGoal) -> AppResult<FinancialGoal> {
        let title = require_text(&request.title, "Financial goal title")?;
        let target_amount = validate_amount(request.target_amount)?;
        self.mutate(|wallet| {
            let goal = FinancialGoal {
                id: next_nested_id(wallet.financial_goals.iter().map(|goal| goal.id)),
                title,
                target_amount,
                icon: request.icon,
                image_path: request.image_path,
                is_pinned: request.is_pinned,
            };
            wallet.financial_goals.push(goal.clone());
            if goal.is_pinned {
                pin_exclusively(&mut wallet.financial_goals, goal.id);
            }
            Ok(goal)
        })
        .await
    }

    pub async fn update_financial_goal(&self, goal_id: RecordId, patch: FinancialGoalPatch) -> AppResult<FinancialGoal> {
        let target_amount = patch.target_amount.map(validate_amount).transpose()?;
        self.mutate(|wallet| {
            let goal = wallet
                .financial_goals
                .iter_mut()
                .find(|goal| goal.id == goal_id)
                .ok_or_else(|| missing_goal(goal_id))?;
            if let Some(title) = patch.title {
                goal.title = require_text(&title, "Financial goal title")?;
            }
            if let Some(target_amount) = target_amount {
                goal.target_amount = target_amount;
            }
            if let Some(icon) = patch.icon {
                goal.icon = Some(icon);
            }
            if let Some(image_path) = patch.image_path {
                goal.image_path = Some(image_path);
            }
            if let Some(is_pinned) = patch.is_pinned {
                goal.is_pinned = is_pinned;
            }
            let updated = goal.clone();
            if updated.is_pinned {
                pin_exclusively(&mut wallet.financial_goals, goal_id);
            }
            Ok(updated)
        })
        .await
    }

    pub async fn set_pinned(&self, goal_id: RecordId, pinned: bool) -> AppResult<FinancialGoal> {
        self.update_financial_goal(
            goal_id,
            FinancialGoalPatch {
                is_pinned: Some(pinned),
                ..FinancialGoalPatch::default()
            },
        )
        .await
    }

    pub async fn delete_financial_goal(&self, goal_id: RecordId) -> AppResult<()> {
        self.mutate(|wallet| {
            let before = wallet.financial_goals.len();
            wallet.financial_goals.retain(|goal| goal.id != goal_id);
            if wallet.financial_goals.len() == before {
                return Err(missing_goal(goal_id));
            }
            Ok(())
        })
        .await
    }

    /// Every wallet write goes through here so the balance never drifts from
    /// the transaction list.
    async fn mutate<R, F>(&self, change: F) -> AppResult<R>
    where
        F: FnOnce(&mut WalletDocument) -> AppResult<R>,
    {
        let result = self
            .ctx
            .mutate_document(WALLET_DOC, |wallet: &mut WalletDocument| {
                let result = change(wallet)?;
                wallet.balance = compute_balance(&wallet.transactions);
                Ok(result)
            })
            .await?;
        self.ctx.touched("wallet");
        Ok(result)
    }
}

fn missing_goal(goal_id: RecordId) -> AppError {
    AppError::NotFound(format!("Financial goal {} not found", goal_id))
}
