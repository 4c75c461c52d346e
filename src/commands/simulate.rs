//! Simulate command handler: the full pipeline against a scripted site.
//!
//! No real browser or network is involved. The scripted page serves a
//! login screen whose scan marker is already visible, a search page
//! that replays one canned listing payload, and a detail page per job
//! with a working chat widget. `--limit-after N` turns the detail page
//! of the job after the Nth delivery into a daily-limit wall.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::info;

use jobsweep_core::browser::{PageScript, Route, ScriptedPage};
use jobsweep_core::config::{DeliveryConfig, PacingSettings, SalaryExpectation};
use jobsweep_core::platform::BossAdapter;
use jobsweep_core::{
    CancelToken, PersistenceGateway, Pipeline, Platform, PlatformAdapter, ProgressReporter,
    SensitiveGate, SessionVault, SqliteStore,
};

use crate::progress;

pub async fn run_simulate_command(
    db_path: &Path,
    platform: Platform,
    jobs: u8,
    limit_after: Option<u8>,
    persist: bool,
    quiet: bool,
) -> Result<()> {
    if platform != Platform::Boss {
        bail!("simulate only ships a scripted site for boss; rerun with --platform boss");
    }

    let adapter = BossAdapter::new();
    let page = ScriptedPage::new(build_script(&adapter, jobs, limit_after));

    // Throwaway vault: the scripted scan login still persists a session.
    let vault_dir = std::env::temp_dir().join(format!("jobsweep-simulate-{}", std::process::id()));
    let vault = SessionVault::with_key(&vault_dir, "jobsweep-simulate");

    let (events, receiver) = ProgressReporter::channel();
    let renderer = progress::spawn_renderer(receiver, quiet);

    let pipeline =
        Pipeline::new(vault, events).with_gate(Arc::new(SensitiveGate::new(Duration::ZERO)));
    let config = demo_config();
    let cancel = CancelToken::new();

    let result = if persist {
        let store = SqliteStore::open(db_path).await?;
        store.save_config(platform, &config).await?;
        let result = pipeline.run(platform, page, &store, &cancel).await;
        store.close().await;
        result
    } else {
        let store = SqliteStore::open_in_memory().await?;
        store.save_config(platform, &config).await?;
        pipeline.run(platform, page, &store, &cancel).await
    };

    drop(pipeline);
    let _ = renderer.await;
    let _ = std::fs::remove_dir_all(&vault_dir);

    let summary = result?;
    println!("{summary}");
    if persist {
        info!(db = %db_path.display(), "simulated run recorded");
        println!(
            "Recorded in {}; inspect with 'jobsweep history'. The demo config was saved for boss.",
            db_path.display()
        );
    }

    Ok(())
}

/// Scripts a miniature Boss直聘: a login page whose scan marker is
/// already visible, a search page replaying one listing payload, and a
/// detail page per job. The `limit_after` job's detail page shows the
/// chat button and the limit dialog but never the message input.
fn build_script(adapter: &BossAdapter, jobs: u8, limit_after: Option<u8>) -> PageScript {
    let plan = adapter.login_plan();
    let deliver = adapter.deliver_selectors();
    let api_url = format!("https://www.zhipin.com/{}?page=1", adapter.list_api_marker());

    let mut script = PageScript::new()
        .route(Route::matching("web/user").element(plan.scan_success_marker))
        .route(
            Route::matching("web/geek/job?")
                .element(adapter.collect_selectors().list_container)
                .respond(api_url, listing_payload(jobs)),
        );

    for index in 0..jobs {
        let fragment = format!("job_detail/{}.html", job_id(index));
        let route = if limit_after == Some(index) {
            Route::matching(fragment)
                .element(deliver.chat_button)
                .element(deliver.limit_dialog)
        } else {
            Route::matching(fragment)
                .element(deliver.chat_button)
                .element(deliver.message_input)
                .element(deliver.send_button)
                .element(deliver.resume_input)
        };
        script = script.route(route);
    }
    script
}

fn job_id(index: u8) -> String {
    format!("sim{index:02}")
}

/// One page of results in the Boss listing envelope. Every fifth job
/// advertises a below-range salary so the filter stage has something
/// to reject.
fn listing_payload(jobs: u8) -> String {
    let list: Vec<serde_json::Value> = (0..jobs)
        .map(|index| {
            let below_range = index % 5 == 4;
            serde_json::json!({
                "encryptJobId": job_id(index),
                "jobName": format!("Rust开发工程师{:02}", index + 1),
                "brandName": if below_range { "节流信息" } else { "示例科技" },
                "salaryDesc": if below_range { "5-8K" } else { "20-35K·13薪" },
                "cityName": "北京",
                "bossName": "张女士",
                "activeTimeDesc": "刚刚活跃",
                "jobSummary": "负责核心后端服务的设计与开发。"
            })
        })
        .collect();

    serde_json::json!({
        "code": 0,
        "message": "Success",
        "zpData": { "jobList": list }
    })
    .to_string()
}

/// Config the scripted run executes under: one city, one keyword, a
/// 15-40K expectation, and pacing knobs near zero so the run finishes
/// in seconds.
fn demo_config() -> DeliveryConfig {
    DeliveryConfig {
        cities: vec!["101010100".to_string()],
        keywords: vec!["Rust".to_string()],
        expected_salary: Some(SalaryExpectation {
            min_k: 15,
            max_k: Some(40),
        }),
        greeting: "您好，我对这个岗位很感兴趣，期待与您进一步沟通。".to_string(),
        pacing: PacingSettings {
            inter_job_delay_secs: 0,
            scroll_settle_ms: 0,
            wait_timeout_secs: 2,
            humanize_pause_ms: 0,
        },
        ..DeliveryConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_payload_parses_with_the_boss_adapter() {
        let adapter = BossAdapter::new();
        let records = adapter.parse_listing(&listing_payload(6)).unwrap();

        assert_eq!(records.len(), 6);
        assert_eq!(records[0].job_id, "sim00");
        assert_eq!(records[0].title, "Rust开发工程师01");
        assert!(records[0].detail_url.contains("job_detail/sim00.html"));
    }

    #[test]
    fn test_every_fifth_payload_job_is_below_range() {
        let adapter = BossAdapter::new();
        let records = adapter.parse_listing(&listing_payload(10)).unwrap();

        assert_eq!(records[4].salary_text, "5-8K");
        assert_eq!(records[9].salary_text, "5-8K");
        assert_eq!(records[0].salary_text, "20-35K·13薪");
    }

    #[tokio::test]
    async fn test_limit_job_detail_page_shows_the_wall() {
        use jobsweep_core::BrowserPage;

        let adapter = BossAdapter::new();
        let page = ScriptedPage::new(build_script(&adapter, 3, Some(1)));

        page.navigate("https://www.zhipin.com/job_detail/sim01.html")
            .await
            .unwrap();
        assert!(page.is_visible(".dialog-container .chat-limit-tip").await.unwrap());
        assert!(!page.is_visible("#chat-input").await.unwrap());

        page.navigate("https://www.zhipin.com/job_detail/sim02.html")
            .await
            .unwrap();
        assert!(page.is_visible("#chat-input").await.unwrap());
    }
}
