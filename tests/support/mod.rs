//! Shared helpers for integration tests: a scripted Boss直聘 site,
//! canned listing payloads and pre-seeded session vaults.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use jobsweep_core::browser::{Cookie, PageScript, Route};
use jobsweep_core::config::{DeliveryConfig, PacingSettings};
use jobsweep_core::session::{SessionSnapshot, SessionVault};
use jobsweep_core::{JobRecord, Platform, SensitiveGate};

/// URL the scripted search page replays its listing payload under.
pub const BOSS_API: &str = "https://www.zhipin.com/wapi/zpgeek/search/joblist.json?page=1";

/// One job in a scripted listing payload.
#[derive(Debug, Clone, Copy)]
pub struct JobSeed {
    pub id: &'static str,
    pub title: &'static str,
    pub company: &'static str,
    pub salary: &'static str,
    pub recruiter_status: &'static str,
}

/// A seed with unremarkable values; override fields per test.
pub fn seed(id: &'static str) -> JobSeed {
    JobSeed {
        id,
        title: "Rust后端工程师",
        company: "云帆科技",
        salary: "18-30K·13薪",
        recruiter_status: "刚刚活跃",
    }
}

/// Renders seeds into the Boss listing API envelope.
pub fn boss_payload(seeds: &[JobSeed]) -> String {
    let list: Vec<serde_json::Value> = seeds
        .iter()
        .map(|seed| {
            serde_json::json!({
                "encryptJobId": seed.id,
                "jobName": seed.title,
                "brandName": seed.company,
                "salaryDesc": seed.salary,
                "cityName": "上海",
                "bossName": "陈女士",
                "activeTimeDesc": seed.recruiter_status,
                "jobSummary": "负责服务端功能迭代与稳定性建设。"
            })
        })
        .collect();
    serde_json::json!({"code": 0, "zpData": {"jobList": list}}).to_string()
}

/// Detail-page route with a fully working chat widget.
pub fn chat_detail_route(id: &str) -> Route {
    Route::matching(format!("job_detail/{id}.html"))
        .element(".btn-startchat")
        .element("#chat-input")
        .element(".chat-op .btn-send")
        .element(".chat-tools input[type='file']")
}

/// Detail-page route behind the daily-limit wall: the chat opens but
/// the message input never appears.
pub fn limit_detail_route(id: &str) -> Route {
    Route::matching(format!("job_detail/{id}.html"))
        .element(".btn-startchat")
        .element(".dialog-container .chat-limit-tip")
}

/// Scripted Boss site: a home page that accepts a restored session, a
/// login page whose scan marker is already visible, a search page
/// replaying one listing payload, and a working chat widget per seed.
pub fn boss_site(seeds: &[JobSeed]) -> PageScript {
    let mut script = PageScript::new()
        .route(Route::matching("zhipin.com/beijing").element(".user-nav .nav-figure"))
        .route(Route::matching("web/user").element(".user-nav .nav-figure"))
        .route(
            Route::matching("web/geek/job?city=")
                .element(".job-list-container")
                .respond(BOSS_API, boss_payload(seeds)),
        );
    for seed in seeds {
        script = script.route(chat_detail_route(seed.id));
    }
    script
}

/// A non-expired Boss login cookie.
pub fn wt2_cookie() -> Cookie {
    Cookie {
        name: "wt2".to_string(),
        value: "stored-session-token".to_string(),
        domain: ".zhipin.com".to_string(),
        path: "/".to_string(),
        expires_at: Some(4_102_444_800),
    }
}

/// Vault primed with a Boss session so runs restore instead of scanning.
pub fn seeded_vault(dir: &Path) -> SessionVault {
    let vault = SessionVault::with_key(dir, "integration-key");
    vault
        .save(&SessionSnapshot::new(Platform::Boss, vec![wt2_cookie()]))
        .expect("seed session snapshot");
    vault
}

/// Config for scripted runs: one search pass, pacing at zero.
pub fn run_config() -> DeliveryConfig {
    DeliveryConfig {
        cities: vec!["101020100".to_string()],
        keywords: vec!["Rust".to_string()],
        greeting: "您好，想和您聊聊这个岗位。".to_string(),
        pacing: PacingSettings {
            inter_job_delay_secs: 0,
            scroll_settle_ms: 0,
            wait_timeout_secs: 1,
            humanize_pause_ms: 0,
        },
        ..DeliveryConfig::default()
    }
}

/// Gate that never makes callers wait.
pub fn zero_gate() -> Arc<SensitiveGate> {
    Arc::new(SensitiveGate::new(Duration::ZERO))
}

/// Pauses tokio's clock for the rest of the test.
///
/// sqlx runs each SQLite connection on its own OS thread, which the
/// paused clock cannot see: while a task awaits the worker inside the
/// pool's acquire timeout, the idle runtime auto-advances straight to
/// the timeout deadline and the acquire fails with `PoolTimedOut`. The
/// heartbeat task keeps a 1ms timer always pending, so auto-advance
/// moves in 1ms hops and the worker's reply lands long before any
/// deadline, while long sleeps (scan polls, wait ceilings) still skip
/// ahead without real waiting. Open the store before calling this so
/// connection setup runs on the real clock.
pub fn pause_clock_with_heartbeat() {
    tokio::spawn(async {
        loop {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });
    tokio::time::pause();
}

/// A pending record pointing at a scripted Boss detail page.
pub fn pending_job(id: &str) -> JobRecord {
    let mut job = JobRecord::new(Platform::Boss, id);
    job.title = format!("Rust工程师{id}");
    job.company = "云帆科技".to_string();
    job.salary_text = "18-30K".to_string();
    job.city = "上海".to_string();
    job.recruiter = "陈女士".to_string();
    job.recruiter_status = "刚刚活跃".to_string();
    job.detail_url = format!("https://www.zhipin.com/job_detail/{id}.html");
    job.description = "负责服务端功能迭代。".to_string();
    job
}
