use crate::errors::AppResult;
use crate::managers::achievements::AchievementStatus;
use crate::models::{
    ApiResponse, AppSettings, BackupOutcome, BasicLogs, BooleanResponse, Bounty, BountyPatch, ChatMessage,
    ChatSession, DailyLog, DailyLogPatch, ExportResponse, Finding, FindingPatch, FinancialGoal, FinancialGoalPatch,
    Goal, GoalPatch, LearningState, MediaDataUrl, MentalState, Milestone, MilestonePatch, NewBounty, NewDailyLog,
    NewFinancialGoal, NewFinding, NewGoal, NewNote, NewSnippet, NewTransaction, Note, NotePatch, Notification,
    ProfileIdentity, RecordId, RestoreOutcome, SavedMedia, Snippet, SnippetFilter, SnippetPatch, Transaction,
    TransactionPatch, UserProfile, WalletDocument,
};
use crate::paths::{AppPaths, RuntimeMode};
use crate::vault::Vault;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tauri::{Emitter, Manager};
use tokio::sync::broadcast::error::RecvError;

#[derive(Clone)]
struct AppState {
    vault: Arc<Vault>,
}

/// Commands always resolve; failures travel inside the `ApiResponse`.
type Reply<T> = Result<ApiResponse<T>, String>;

fn reply<T>(result: AppResult<T>) -> Reply<T> {
    Ok(ApiResponse::from(result))
}

fn done(result: AppResult<()>) -> Reply<BooleanResponse> {
    reply(result.map(|()| BooleanResponse { success: true }))
}

// Generic stores

#[tauri::command]
fn read_document(state: tauri::State<'_, AppState>, name: String) -> Reply<Value> {
    reply(state.vault.read_document(&name))
}

#[tauri::command]
async fn write_document(state: tauri::State<'_, AppState>, name: String, value: Value) -> Reply<BooleanResponse> {
    done(state.vault.write_document(&name, &value).await)
}

#[tauri::command]
async fn delete_document(state: tauri::State<'_, AppState>, name: String) -> Reply<BooleanResponse> {
    done(state.vault.delete_document(&name).await)
}

#[tauri::command]
fn document_exists(state: tauri::State<'_, AppState>, name: String) -> Reply<bool> {
    reply(Ok(state.vault.document_exists(&name)))
}

#[tauri::command]
fn list_collection(state: tauri::State<'_, AppState>, folder: String) -> Reply<Vec<Value>> {
    reply(state.vault.list_collection(&folder))
}

#[tauri::command]
async fn save_collection_item(
    state: tauri::State<'_, AppState>,
    folder: String,
    filename: String,
    value: Value,
) -> Reply<PathBuf> {
    reply(state.vault.save_collection_item(&folder, &filename, &value).await)
}

#[tauri::command]
async fn delete_collection_item(
    state: tauri::State<'_, AppState>,
    folder: String,
    filename: String,
) -> Reply<BooleanResponse> {
    done(state.vault.delete_collection_item(&folder, &filename).await)
}

#[tauri::command]
fn save_media(state: tauri::State<'_, AppState>, filename: String, bytes: Vec<u8>) -> Reply<SavedMedia> {
    reply(state.vault.save_media(&filename, &bytes))
}

#[tauri::command]
fn read_media_as_data_url(state: tauri::State<'_, AppState>, filename: String) -> Reply<MediaDataUrl> {
    reply(state.vault.read_media_as_data_url(&filename))
}

#[tauri::command]
fn read_media_as_text(state: tauri::State<'_, AppState>, filename: String) -> Reply<String> {
    reply(state.vault.read_media_as_text(&filename))
}

#[tauri::command]
fn get_root_path(state: tauri::State<'_, AppState>) -> Reply<PathBuf> {
    reply(Ok(state.vault.root_path()))
}

// Backup, restore, export, settings

#[tauri::command]
async fn create_backup(state: tauri::State<'_, AppState>, destination: Option<PathBuf>) -> Reply<BackupOutcome> {
    reply(state.vault.create_backup(destination).await)
}

#[tauri::command]
async fn restore_backup(state: tauri::State<'_, AppState>, source: Option<PathBuf>) -> Reply<RestoreOutcome> {
    reply(state.vault.restore_backup(source).await)
}

#[tauri::command]
async fn export_full(state: tauri::State<'_, AppState>) -> Reply<ExportResponse> {
    reply(state.vault.export_full().await)
}

#[tauri::command]
async fn export_window(state: tauri::State<'_, AppState>, days: Option<u32>) -> Reply<ExportResponse> {
    reply(state.vault.export_window(days).await)
}

#[tauri::command]
fn get_settings(state: tauri::State<'_, AppState>) -> Reply<AppSettings> {
    reply(state.vault.settings())
}

#[tauri::command]
async fn update_settings(state: tauri::State<'_, AppState>, patch: Value) -> Reply<AppSettings> {
    reply(state.vault.update_settings(patch).await)
}

// Daily logs

#[tauri::command]
fn list_daily_logs(state: tauri::State<'_, AppState>) -> Reply<BasicLogs> {
    reply(state.vault.daily_logs.list().map(|logs| BasicLogs { logs }))
}

#[tauri::command]
async fn add_daily_log(state: tauri::State<'_, AppState>, request: NewDailyLog) -> Reply<DailyLog> {
    reply(state.vault.daily_logs.add(request).await)
}

#[tauri::command]
async fn update_daily_log(state: tauri::State<'_, AppState>, log_id: RecordId, patch: DailyLogPatch) -> Reply<DailyLog> {
    reply(state.vault.daily_logs.update(log_id, patch).await)
}

#[tauri::command]
async fn set_daily_log_review(
    state: tauri::State<'_, AppState>,
    log_id: RecordId,
    review: Option<String>,
) -> Reply<DailyLog> {
    reply(state.vault.daily_logs.set_review(log_id, review).await)
}

#[tauri::command]
async fn delete_daily_log(state: tauri::State<'_, AppState>, log_id: RecordId) -> Reply<BooleanResponse> {
    done(state.vault.daily_logs.delete(log_id).await)
}

// Goals

#[tauri::command]
fn list_goals(state: tauri::State<'_, AppState>) -> Reply<Vec<Goal>> {
    reply(state.vault.goals.list())
}

#[tauri::command]
fn get_goal(state: tauri::State<'_, AppState>, goal_id: RecordId) -> Reply<Goal> {
    reply(state.vault.goals.get(goal_id))
}

#[tauri::command]
async fn create_goal(state: tauri::State<'_, AppState>, request: NewGoal) -> Reply<Goal> {
    reply(state.vault.goals.create(request).await)
}

#[tauri::command]
async fn update_goal(state: tauri::State<'_, AppState>, goal_id: RecordId, patch: GoalPatch) -> Reply<Goal> {
    reply(state.vault.goals.update(goal_id, patch).await)
}

#[tauri::command]
async fn delete_goal(state: tauri::State<'_, AppState>, goal_id: RecordId) -> Reply<BooleanResponse> {
    done(state.vault.goals.delete(goal_id).await)
}

#[tauri::command]
async fn add_milestone(state: tauri::State<'_, AppState>, goal_id: RecordId, title: String) -> Reply<Milestone> {
    reply(state.vault.goals.add_milestone(goal_id, &title).await)
}

#[tauri::command]
async fn update_milestone(
    state: tauri::State<'_, AppState>,
    goal_id: RecordId,
    milestone_id: RecordId,
    patch: MilestonePatch,
) -> Reply<Milestone> {
    reply(state.vault.goals.update_milestone(goal_id, milestone_id, patch).await)
}

#[tauri::command]
async fn toggle_milestone(
    state: tauri::State<'_, AppState>,
    goal_id: RecordId,
    milestone_id: RecordId,
) -> Reply<Milestone> {
    reply(state.vault.goals.toggle_milestone(goal_id, milestone_id).await)
}

#[tauri::command]
async fn delete_milestone(
    state: tauri::State<'_, AppState>,
    goal_id: RecordId,
    milestone_id: RecordId,
) -> Reply<BooleanResponse> {
    done(state.vault.goals.delete_milestone(goal_id, milestone_id).await)
}

// Bounties

#[tauri::command]
fn list_bounties(state: tauri::State<'_, AppState>) -> Reply<Vec<Bounty>> {
    reply(state.vault.bounties.list())
}

#[tauri::command]
fn get_bounty(state: tauri::State<'_, AppState>, bounty_id: RecordId) -> Reply<Bounty> {
    reply(state.vault.bounties.get(bounty_id))
}

#[tauri::command]
async fn create_bounty(state: tauri::State<'_, AppState>, request: NewBounty) -> Reply<Bounty> {
    reply(state.vault.bounties.create(request).await)
}

#[tauri::command]
async fn update_bounty(state: tauri::State<'_, AppState>, bounty_id: RecordId, patch: BountyPatch) -> Reply<Bounty> {
    reply(state.vault.bounties.update(bounty_id, patch).await)
}

#[tauri::command]
async fn delete_bounty(state: tauri::State<'_, AppState>, bounty_id: RecordId) -> Reply<BooleanResponse> {
    done(state.vault.bounties.delete(bounty_id).await)
}

#[tauri::command]
async fn add_finding(state: tauri::State<'_, AppState>, bounty_id: RecordId, request: NewFinding) -> Reply<Finding> {
    reply(state.vault.bounties.add_finding(bounty_id, request).await)
}

#[tauri::command]
async fn update_finding(
    state: tauri::State<'_, AppState>,
    bounty_id: RecordId,
    finding_id: RecordId,
    patch: FindingPatch,
) -> Reply<Finding> {
    reply(state.vault.bounties.update_finding(bounty_id, finding_id, patch).await)
}

#[tauri::command]
async fn delete_finding(
    state: tauri::State<'_, AppState>,
    bounty_id: RecordId,
    finding_id: RecordId,
) -> Reply<BooleanResponse> {
    done(state.vault.bounties.delete_finding(bounty_id, finding_id).await)
}

// Notes and snippets

#[tauri::command]
fn list_notes(state: tauri::State<'_, AppState>) -> Reply<Vec<Note>> {
    reply(state.vault.notes.list())
}

#[tauri::command]
fn search_notes(state: tauri::State<'_, AppState>, query: String) -> Reply<Vec<Note>> {
    reply(state.vault.notes.search(&query))
}

#[tauri::command]
async fn create_note(state: tauri::State<'_, AppState>, request: NewNote) -> Reply<Note> {
    reply(state.vault.notes.create(request).await)
}

#[tauri::command]
async fn update_note(state: tauri::State<'_, AppState>, note_id: RecordId, patch: NotePatch) -> Reply<Note> {
    reply(state.vault.notes.update(note_id, patch).await)
}

#[tauri::command]
async fn toggle_note_pin(state: tauri::State<'_, AppState>, note_id: RecordId) -> Reply<Note> {
    reply(state.vault.notes.toggle_pin(note_id).await)
}

#[tauri::command]
async fn delete_note(state: tauri::State<'_, AppState>, note_id: RecordId) -> Reply<BooleanResponse> {
    done(state.vault.notes.delete(note_id).await)
}

#[tauri::command]
fn list_snippets(state: tauri::State<'_, AppState>, filter: Option<SnippetFilter>) -> Reply<Vec<Snippet>> {
    reply(state.vault.snippets.list(&filter.unwrap_or_default()))
}

#[tauri::command]
async fn create_snippet(state: tauri::State<'_, AppState>, request: NewSnippet) -> Reply<Snippet> {
    reply(state.vault.snippets.create(request).await)
}

#[tauri::command]
async fn update_snippet(state: tauri::State<'_, AppState>, snippet_id: RecordId, patch: SnippetPatch) -> Reply<Snippet> {
    reply(state.vault.snippets.update(snippet_id, patch).await)
}

#[tauri::command]
async fn toggle_snippet_favorite(state: tauri::State<'_, AppState>, snippet_id: RecordId) -> Reply<Snippet> {
    reply(state.vault.snippets.toggle_favorite(snippet_id).await)
}

#[tauri::command]
async fn delete_snippet(state: tauri::State<'_, AppState>, snippet_id: RecordId) -> Reply<BooleanResponse> {
    done(state.vault.snippets.delete(snippet_id).await)
}

// Wallet

#[tauri::command]
fn get_wallet(state: tauri::State<'_, AppState>) -> Reply<WalletDocument> {
    reply(state.vault.wallet.load())
}

#[tauri::command]
fn list_transactions(state: tauri::State<'_, AppState>) -> Reply<Vec<Transaction>> {
    reply(state.vault.wallet.list_transactions())
}

#[tauri::command]
async fn add_transaction(state: tauri::State<'_, AppState>, request: NewTransaction) -> Reply<Transaction> {
    reply(state.vault.wallet.add_transaction(request).await)
}

#[tauri::command]
async fn update_transaction(
    state: tauri::State<'_, AppState>,
    transaction_id: RecordId,
    patch: TransactionPatch,
) -> Reply<Transaction> {
    reply(state.vault.wallet.update_transaction(transaction_id, patch).await)
}

#[tauri::command]
async fn delete_transaction(state: tauri::State<'_, AppState>, transaction_id: RecordId) -> Reply<BooleanResponse> {
    done(state.vault.wallet.delete_transaction(transaction_id).await)
}

#[tauri::command]
fn bounty_earnings(state: tauri::State<'_, AppState>, bounty_id: RecordId) -> Reply<f64> {
    reply(state.vault.wallet.earnings_for_bounty(bounty_id))
}

#[tauri::command]
async fn add_financial_goal(state: tauri::State<'_, AppState>, request: NewFinancialGoal) -> Reply<FinancialGoal> {
    reply(state.vault.wallet.add_financial_goal(request).await)
}

#[tauri::command]
async fn update_financial_goal(
    state: tauri::State<'_, AppState>,
    goal_id: RecordId,
    patch: FinancialGoalPatch,
) -> Reply<FinancialGoal> {
    reply(state.vault.wallet.update_financial_goal(goal_id, patch).await)
}

#[tauri::command]
async fn set_financial_goal_pinned(
    state: tauri::State<'_, AppState>,
    goal_id: RecordId,
    pinned: bool,
) -> Reply<FinancialGoal> {
    reply(state.vault.wallet.set_pinned(goal_id, pinned).await)
}

#[tauri::command]
async fn delete_financial_goal(state: tauri::State<'_, AppState>, goal_id: RecordId) -> Reply<BooleanResponse> {
    done(state.vault.wallet.delete_financial_goal(goal_id).await)
}

// Chats

#[tauri::command]
fn list_chats(state: tauri::State<'_, AppState>) -> Reply<Vec<ChatSession>> {
    reply(state.vault.chats.list())
}

#[tauri::command]
fn get_chat(state: tauri::State<'_, AppState>, session_id: RecordId) -> Reply<ChatSession> {
    reply(state.vault.chats.get(session_id))
}

#[tauri::command]
async fn create_chat(state: tauri::State<'_, AppState>, model: Option<String>) -> Reply<ChatSession> {
    let model = match model {
        Some(model) => Ok(model),
        None => state.vault.settings().map(|settings| settings.default_chat_model),
    };
    match model {
        Ok(model) => reply(state.vault.chats.create(&model).await),
        Err(error) => reply(Err(error)),
    }
}

#[tauri::command]
async fn append_chat_message(
    state: tauri::State<'_, AppState>,
    session_id: RecordId,
    message: ChatMessage,
) -> Reply<ChatSession> {
    reply(state.vault.chats.append_message(session_id, message).await)
}

#[tauri::command]
async fn record_chat_exchange(
    state: tauri::State<'_, AppState>,
    session_id: RecordId,
    user_message: String,
    assistant_reply: String,
    reasoning: Option<String>,
) -> Reply<ChatSession> {
    reply(
        state
            .vault
            .chats
            .record_exchange(session_id, user_message, assistant_reply, reasoning)
            .await,
    )
}

#[tauri::command]
async fn rename_chat(state: tauri::State<'_, AppState>, session_id: RecordId, title: String) -> Reply<ChatSession> {
    reply(state.vault.chats.rename(session_id, &title).await)
}

#[tauri::command]
async fn delete_chat(state: tauri::State<'_, AppState>, session_id: RecordId) -> Reply<BooleanResponse> {
    done(state.vault.chats.delete(session_id).await)
}

// Profile and achievements

#[tauri::command]
fn get_profile(state: tauri::State<'_, AppState>) -> Reply<UserProfile> {
    reply(state.vault.profile.get())
}

#[tauri::command]
async fn save_profile(state: tauri::State<'_, AppState>, profile: UserProfile) -> Reply<UserProfile> {
    reply(state.vault.profile.save(profile).await)
}

#[tauri::command]
async fn set_skill_level(state: tauri::State<'_, AppState>, skill: String, level: String) -> Reply<UserProfile> {
    reply(state.vault.profile.set_skill(&skill, &level).await)
}

#[tauri::command]
async fn remove_skill(state: tauri::State<'_, AppState>, skill: String) -> Reply<UserProfile> {
    reply(state.vault.profile.remove_skill(&skill).await)
}

#[tauri::command]
async fn update_identity(state: tauri::State<'_, AppState>, identity: ProfileIdentity) -> Reply<UserProfile> {
    reply(state.vault.profile.update_identity(identity).await)
}

#[tauri::command]
async fn update_learning(state: tauri::State<'_, AppState>, learning: LearningState) -> Reply<UserProfile> {
    reply(state.vault.profile.update_learning(learning).await)
}

#[tauri::command]
async fn update_mental_state(state: tauri::State<'_, AppState>, mental_state: MentalState) -> Reply<UserProfile> {
    reply(state.vault.profile.update_mental_state(mental_state).await)
}

#[tauri::command]
async fn set_profile_photo(state: tauri::State<'_, AppState>, filename: String, bytes: Vec<u8>) -> Reply<SavedMedia> {
    reply(state.vault.profile.set_photo(&filename, &bytes).await)
}

#[tauri::command]
fn list_achievements(state: tauri::State<'_, AppState>) -> Reply<Vec<AchievementStatus>> {
    reply(state.vault.achievements.status())
}

#[tauri::command]
async fn refresh_achievements(state: tauri::State<'_, AppState>) -> Reply<Vec<Notification>> {
    reply(state.vault.refresh_achievements().await)
}

pub fn run() {
    tauri::Builder::default()
        .setup(|app| {
            let paths = AppPaths::resolve(RuntimeMode::detect()).map_err(|error| error.to_string())?;
            crate::init_tracing(&paths.logs).map_err(|error| error.to_string())?;
            let vault = match Vault::open(paths) {
                Ok(vault) => Arc::new(vault),
                Err(error) => {
                    tracing::error!(error = %error, "data folder could not be prepared");
                    return Err(error.to_string().into());
                }
            };
            let handle = app.handle().clone();

            tauri::async_runtime::spawn({
                let vault = vault.clone();
                async move {
                    let mut notifications = vault.subscribe();
                    loop {
                        match notifications.recv().await {
                            Ok(notification) => {
                                if let Err(error) = handle.emit("notification", &notification) {
                                    tracing::warn!(error = %error, "notification emit failed");
                                }
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "notification listener lagged");
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }
            });

            tauri::async_runtime::spawn({
                let vault = vault.clone();
                async move {
                    if let Err(error) = vault.refresh_achievements().await {
                        tracing::warn!(error = %error, "startup achievement check failed");
                    }
                    let _ = vault.watch_mutations();
                }
            });

            app.manage(AppState { vault });
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            read_document,
            write_document,
            delete_document,
            document_exists,
            list_collection,
            save_collection_item,
            delete_collection_item,
            save_media,
            read_media_as_data_url,
            read_media_as_text,
            get_root_path,
            create_backup,
            restore_backup,
            export_full,
            export_window,
            get_settings,
            update_settings,
            list_daily_logs,
            add_daily_log,
            update_daily_log,
            set_daily_log_review,
            delete_daily_log,
            list_goals,
            get_goal,
            create_goal,
            update_goal,
            delete_goal,
            add_milestone,
            update_milestone,
            toggle_milestone,
            delete_milestone,
            list_bounties,
            get_bounty,
            create_bounty,
            update_bounty,
            delete_bounty,
            add_finding,
            update_finding,
            delete_finding,
            list_notes,
            search_notes,
            create_note,
            update_note,
            toggle_note_pin,
            delete_note,
            list_snippets,
            create_snippet,
            update_snippet,
            toggle_snippet_favorite,
            delete_snippet,
            get_wallet,
            list_transactions,
            add_transaction,
            update_transaction,
            delete_transaction,
            bounty_earnings,
            add_financial_goal,
            update_financial_goal,
            set_financial_goal_pinned,
            delete_financial_goal,
            list_chats,
            get_chat,
            create_chat,
            append_chat_message,
            record_chat_exchange,
            rename_chat,
            delete_chat,
            get_profile,
            save_profile,
            set_skill_level,
            remove_skill,
            update_identity,
            update_learning,
            update_mental_state,
            set_profile_photo,
            list_achievements,
            refresh_achievements
        ])
        .run(tauri::generate_context!())
        .expect("failed to run tauri app");
}
