//! End-to-end publish against the in-memory store.

use std::fs;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use sitepush_core::commands::{PublishCommand, PublishOptions, RemoveCommand};
use sitepush_core::config::{OssSettings, Settings};
use sitepush_core::retention::FixedClock;
use sitepush_core::store::{MemoryStore, StoreCall};

fn build_site(files: &[&str]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for file in files {
        let path = temp.path().join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, file.as_bytes()).unwrap();
    }
    temp
}

fn settings(site: &TempDir, index_page: &str, error_page: &str) -> Settings {
    Settings {
        path: Some(site.path().to_path_buf()),
        duration: Some(7 * 86_400),
        auto_remove: true,
        skip_previous: true,
        oss: Some(OssSettings {
            bucket: "site".to_string(),
            access_key_id: "id".to_string(),
            access_key_secret: "secret".to_string(),
            index_page: index_page.to_string(),
            error_page: error_page.to_string(),
            ..OssSettings::default()
        }),
        ..Settings::default()
    }
}

#[tokio::test]
async fn identical_entry_pages_are_deleted_with_a_single_call() {
    let site = build_site(&["index.html"]);
    let store = MemoryStore::new("site");
    let options = PublishOptions::from_settings(&settings(&site, "index.html", "index.html")).unwrap();
    let mut command = PublishCommand::new(&store, options);

    command.collect().await.unwrap();
    command.execute().await.unwrap();

    let deletes: Vec<_> = store
        .calls()
        .into_iter()
        .filter(|call| matches!(call, StoreCall::Delete { .. } | StoreCall::DeleteMulti { .. }))
        .collect();
    assert_eq!(
        deletes,
        vec![StoreCall::Delete {
            name: "index.html".to_string()
        }]
    );
}

#[tokio::test]
async fn publish_replaces_entry_pages_and_keeps_live_version() {
    let site = build_site(&["index.html", "404.html", "js/app.3f2a.js"]);
    let store = MemoryStore::new("site");

    // live version published at 09:12, an older one two weeks before that
    let live = Utc.with_ymd_and_hms(2024, 7, 1, 9, 12, 0).unwrap();
    let stale = Utc.with_ymd_and_hms(2024, 6, 17, 9, 0, 0).unwrap();
    store.insert("index.html", live);
    store.insert("404.html", live);
    store.insert("js/app.91bc.js", live);
    store.insert("js/app.0a7d.js", stale);

    let clock = FixedClock::utc(Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap());
    let options = PublishOptions::from_settings(&settings(&site, "index.html", "404.html")).unwrap();
    let mut command = PublishCommand::with_clock(&store, options, clock);

    let preview = command.collect().await.unwrap();
    assert_eq!(preview.file_count, 3);
    assert_eq!(preview.remove_count, Some(1));

    let report = command.execute().await.unwrap();
    assert_eq!(report.uploaded, 3);
    assert_eq!(report.removed, 1);

    assert!(store.contains("js/app.91bc.js"));
    assert!(store.contains("js/app.3f2a.js"));
    assert!(!store.contains("js/app.0a7d.js"));
    assert_eq!(
        store.website(),
        Some(("index.html".to_string(), "404.html".to_string()))
    );
    assert!(store.calls().contains(&StoreCall::DeleteMulti {
        names: vec!["index.html".to_string(), "404.html".to_string()]
    }));
}

#[tokio::test]
async fn empty_publish_directory_uploads_nothing() {
    let temp = TempDir::new().unwrap();
    let mut settings = settings(&temp, "index.html", "index.html");
    settings.path = Some(temp.path().join("dist"));
    let store = MemoryStore::new("site");
    let mut command = PublishCommand::new(&store, PublishOptions::from_settings(&settings).unwrap());

    let preview = command.collect().await.unwrap();

    assert_eq!(preview.file_count, 0);
}

#[tokio::test]
async fn remove_after_publish_only_touches_expired_files() {
    let store = MemoryStore::new("site").with_page_size(3);
    let now = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap();
    for day in 1..=9 {
        store.insert(
            format!("assets/{}.js", day),
            Utc.with_ymd_and_hms(2024, 7, 20 + day, 0, 0, 0).unwrap(),
        );
    }
    let site = build_site(&["index.html"]);
    let mut settings = settings(&site, "index.html", "index.html");
    settings.skip_previous = false;

    let mut command = RemoveCommand::with_clock(&store, &settings, FixedClock::utc(now)).unwrap();
    let preview = command.retention().await;
    assert!(!preview.protects_previous());
    assert_eq!(preview.duration_days, 7);

    // files from July 21..24 are older than seven days
    assert_eq!(command.collect().await.unwrap(), 4);
    let report = command.execute().await.unwrap();
    assert_eq!(report.removed, 4);
    assert_eq!(store.object_names().len(), 5);
}
