use chrono::{Duration, Local};
use devjournal_lib::models::{
    BackupOutcome, BountyStatus, BountyPatch, NewBounty, NewFinancialGoal, NewFinding, NotificationKind,
    RestoreOutcome, Severity,
};
use devjournal_lib::paths::AppPaths;
use devjournal_lib::Vault;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn open_vault() -> (tempfile::TempDir, Vault) {
    let dir = tempfile::tempdir().expect("tempdir");
    let vault = Vault::open(AppPaths::from_root(dir.path().join("DevJournalData"))).expect("open vault");
    (dir, vault)
}

fn snapshot_files(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    collect(root, root, &mut files);
    files
}

fn collect(root: &Path, dir: &Path, files: &mut BTreeMap<String, Vec<u8>>) {
    for entry in fs::read_dir(dir).expect("read dir") {
        let path = entry.expect("entry").path();
        if path.is_dir() {
            collect(root, &path, files);
        } else {
            let relative = path.strip_prefix(root).expect("relative").to_string_lossy().replace('\\', "/");
            files.insert(relative, fs::read(&path).expect("read file"));
        }
    }
}

#[tokio::test]
async fn document_round_trip_and_not_found() {
    let (_dir, vault) = open_vault();
    let profile = json!({
        "identity": {"nickname": "0xcat", "aiInstructions": "be terse"},
        "skillLevels": {"Solidity": "advanced"},
        "traits": ["curious"]
    });
    vault.write_document("UserProfile.json", &profile).await.expect("write");
    assert_eq!(vault.read_document("UserProfile.json").expect("read"), profile);

    let missing = vault.read_document("never-written.json").expect_err("missing");
    assert_eq!(missing.code(), "NOT_FOUND");
}

#[tokio::test]
async fn listing_skips_poison_files_and_orders_newest_first() {
    let (_dir, vault) = open_vault();
    for id in [3, 1, 2] {
        vault
            .save_collection_item("snippets", &format!("{}.json", id), &json!({"id": id, "title": "s", "code": ""}))
            .await
            .expect("save");
    }
    fs::write(vault.root_path().join("snippets").join("broken.json"), "{ not json").expect("poison");

    let items = vault.list_collection("snippets").expect("list");
    let ids: Vec<i64> = items.iter().map(|item| item["id"].as_i64().expect("id")).collect();
    assert_eq!(ids, vec![3, 2, 1]);
}

#[tokio::test]
async fn listing_a_missing_folder_creates_it() {
    let (_dir, vault) = open_vault();
    assert!(vault.list_collection("scratch").expect("list").is_empty());
    assert!(vault.root_path().join("scratch").is_dir());
}

#[tokio::test]
async fn rapid_findings_get_distinct_ids() {
    let (_dir, vault) = open_vault();
    let bounty = vault
        .bounties
        .create(NewBounty {
            platform: "Sherlock".to_string(),
            contest: "Perps".to_string(),
            ..NewBounty::default()
        })
        .await
        .expect("bounty");
    let mut ids = Vec::new();
    for title in ["one", "two", "three"] {
        let finding = vault
            .bounties
            .add_finding(
                bounty.id,
                NewFinding {
                    severity: Severity::Medium,
                    title: title.to_string(),
                    description: String::new(),
                },
            )
            .await
            .expect("finding");
        ids.push(finding.id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn pinning_a_financial_goal_is_exclusive() {
    let (_dir, vault) = open_vault();
    let a = vault
        .wallet
        .add_financial_goal(NewFinancialGoal {
            title: "A".to_string(),
            target_amount: 100.0,
            is_pinned: true,
            ..NewFinancialGoal::default()
        })
        .await
        .expect("a");
    let b = vault
        .wallet
        .add_financial_goal(NewFinancialGoal {
            title: "B".to_string(),
            target_amount: 200.0,
            ..NewFinancialGoal::default()
        })
        .await
        .expect("b");

    vault.wallet.set_pinned(b.id, true).await.expect("pin");
    let goals = vault.wallet.list_financial_goals().expect("goals");
    let pinned: Vec<_> = goals.iter().filter(|goal| goal.is_pinned).map(|goal| goal.id).collect();
    assert_eq!(pinned, vec![b.id]);
    assert!(goals.iter().any(|goal| goal.id == a.id && !goal.is_pinned));
}

#[tokio::test]
async fn restore_reproduces_backup_exactly() {
    let (dir, vault) = open_vault();
    vault
        .write_document("settings.json", &json!({"recentWindowDays": 7}))
        .await
        .expect("settings");
    vault
        .save_collection_item("notes", "1.json", &json!({"id": 1, "title": "kept"}))
        .await
        .expect("note");
    vault.save_media("photo.bin", &[0u8, 255, 7, 42]).expect("media");
    let before = snapshot_files(&vault.root_path());

    let archive = dir.path().join("backup.zip");
    let outcome = vault.create_backup(Some(archive.clone())).await.expect("backup");
    assert!(matches!(outcome, BackupOutcome::Created { files: 3, .. }));

    vault
        .save_collection_item("notes", "2.json", &json!({"id": 2, "title": "late"}))
        .await
        .expect("late note");

    let restored = vault.restore_backup(Some(archive)).await.expect("restore");
    let RestoreOutcome::RestartRequired { aside_path, .. } = restored else {
        panic!("expected restart signal, got {:?}", restored);
    };
    assert!(aside_path.join("notes").join("2.json").is_file());

    assert_eq!(snapshot_files(&vault.root_path()), before);
    assert!(!vault.root_path().join("notes").join("2.json").exists());
}

#[tokio::test]
async fn dismissed_pickers_are_cancellations() {
    let (_dir, vault) = open_vault();
    assert_eq!(vault.create_backup(None).await.expect("backup"), BackupOutcome::Canceled);
    assert_eq!(vault.restore_backup(None).await.expect("restore"), RestoreOutcome::Canceled);
}

#[tokio::test]
async fn windowed_export_keeps_the_boundary_day() {
    let (dir, vault) = open_vault();
    let exports = dir.path().join("exports");
    vault
        .update_settings(json!({"exportDir": exports}))
        .await
        .expect("settings");

    let day = |offset: i64| (Local::now() - Duration::days(offset)).format("%Y-%m-%d").to_string();
    let logs = json!({"logs": [
        {"date": day(15), "hours": 1.0},
        {"date": day(14), "hours": 2.0},
        {"date": day(13), "hours": 3.0}
    ]});
    vault.write_document("BasicLogs.json", &logs).await.expect("logs");

    let response = vault.export_window(Some(14)).await.expect("export");
    assert!(response.path.starts_with(&exports));
    let document: Value = serde_json::from_slice(&fs::read(&response.path).expect("read export")).expect("json");
    let dates: Vec<&str> = document["dailyLogs"]
        .as_array()
        .expect("logs")
        .iter()
        .map(|log| log["date"].as_str().expect("date"))
        .collect();
    assert!(dates.contains(&day(14).as_str()));
    assert!(dates.contains(&day(13).as_str()));
    assert!(!dates.contains(&day(15).as_str()));
    assert_eq!(document["summary"]["totalHours"], 5.0);

    let full = vault.export_full().await.expect("full");
    let document: Value = serde_json::from_slice(&fs::read(&full.path).expect("read export")).expect("json");
    assert_eq!(document["exportType"], "Full Export");
    assert_eq!(document["dailyLogs"].as_array().expect("logs").len(), 3);
}

#[tokio::test]
async fn records_saved_by_the_ui_survive_export_and_edits() {
    let (dir, vault) = open_vault();
    vault
        .update_settings(json!({"exportDir": dir.path().join("exports")}))
        .await
        .expect("settings");
    let today = Local::now().format("%Y-%m-%d").to_string();
    vault
        .write_document(
            "BasicLogs.json",
            &json!({"logs": [{"date": today, "hours": 3, "mood": "good", "activities": "review", "learnings": ""}]}),
        )
        .await
        .expect("logs");
    vault
        .save_collection_item("goals", "1.json", &json!({"id": 1, "title": "Audit", "notes": "keep me"}))
        .await
        .expect("goal");
    vault
        .save_collection_item("goals", "2.json", &json!({"id": 2, "title": "Half", "progress": 50.5}))
        .await
        .expect("fractional goal");

    let full = vault.export_full().await.expect("export");
    let document: Value = serde_json::from_slice(&fs::read(&full.path).expect("read export")).expect("json");
    assert_eq!(document["summary"]["logDays"], 1);
    assert_eq!(document["summary"]["totalHours"], 3.0);
    assert_eq!(document["dailyLogs"].as_array().map(Vec::len), Some(1));
    assert_eq!(document["summary"]["goals"]["total"], 2);
    let exported_goals = document["goals"].as_array().expect("goals");
    assert!(exported_goals.iter().any(|goal| goal["progress"] == 50.5));
    assert!(exported_goals.iter().any(|goal| goal["notes"] == "keep me"));

    let logs = vault.daily_logs.list().expect("logs without ids");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].hours, 3.0);

    vault
        .goals
        .update(
            1,
            devjournal_lib::models::GoalPatch {
                progress: Some(10.0),
                ..Default::default()
            },
        )
        .await
        .expect("update");
    let stored = vault.list_collection("goals").expect("list");
    let edited = stored.iter().find(|goal| goal["id"] == 1).expect("goal 1");
    assert_eq!(edited["notes"], "keep me");
    assert_eq!(edited["progress"], 10);
}

#[tokio::test]
async fn goal_milestone_scenario_survives_reload() {
    let (_dir, vault) = open_vault();
    vault
        .save_collection_item("goals", "1.json", &json!({"id": 1, "title": "Learn Foundry", "progress": 0}))
        .await
        .expect("seed goal");
    let milestone = vault.goals.add_milestone(1, "Read docs").await.expect("milestone");
    vault.goals.toggle_milestone(1, milestone.id).await.expect("toggle");
    vault
        .goals
        .update(
            1,
            devjournal_lib::models::GoalPatch {
                progress: Some(50.0),
                ..Default::default()
            },
        )
        .await
        .expect("progress");

    let stored = vault.list_collection("goals").expect("list");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["progress"], 50);
    assert_eq!(stored[0]["milestones"][0]["title"], "Read docs");
    assert_eq!(stored[0]["milestones"][0]["completed"], true);
}

#[tokio::test]
async fn pinned_note_jumps_the_queue() {
    let (_dir, vault) = open_vault();
    for id in [5, 9] {
        vault
            .save_collection_item(
                "notes",
                &format!("{}.json", id),
                &json!({
                    "id": id,
                    "title": format!("note {}", id),
                    "createdAt": "2024-05-01T00:00:00Z",
                    "updatedAt": "2024-05-01T00:00:00Z"
                }),
            )
            .await
            .expect("seed note");
    }
    let order = |vault: &Vault| -> Vec<i64> { vault.notes.list().expect("list").iter().map(|n| n.id).collect() };
    assert_eq!(order(&vault), vec![9, 5]);
    vault.notes.toggle_pin(5).await.expect("pin");
    assert_eq!(order(&vault), vec![5, 9]);
}

#[tokio::test]
async fn mutations_unlock_achievements_in_the_background() {
    let (_dir, vault) = open_vault();
    let vault = Arc::new(vault);
    let mut notifications = vault.subscribe();
    let watcher = vault.clone().watch_mutations();

    let bounty = vault
        .bounties
        .create(NewBounty {
            platform: "Immunefi".to_string(),
            contest: "Bridge".to_string(),
            ..NewBounty::default()
        })
        .await
        .expect("bounty");
    vault
        .bounties
        .update(
            bounty.id,
            BountyPatch {
                status: Some(BountyStatus::Won),
                ..BountyPatch::default()
            },
        )
        .await
        .expect("won");

    let notification = tokio::time::timeout(std::time::Duration::from_secs(5), notifications.recv())
        .await
        .expect("notification in time")
        .expect("notification");
    assert_eq!(notification.kind, NotificationKind::Achievement);

    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            let unlocked = vault.achievements.unlocked().expect("unlocked").unlocked_ids;
            if unlocked.iter().any(|id| id == "first-win") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("first-win unlocked");

    watcher.abort();
}
