// tests/config.rs
use content_resolver::config::resolver::{
    ENV_CAPTION_CONCURRENCY, ENV_COOLDOWN_SECS, ENV_MIN_CONTENT_LEN, ENV_PATH, ENV_WORKERS,
};
use content_resolver::config::ResolverConfig;
use std::{env, fs};

const OVERRIDES: [&str; 4] = [
    ENV_WORKERS,
    ENV_MIN_CONTENT_LEN,
    ENV_COOLDOWN_SECS,
    ENV_CAPTION_CONCURRENCY,
];

fn clear_env() {
    env::remove_var(ENV_PATH);
    for v in OVERRIDES {
        env::remove_var(v);
    }
    env::remove_var("SCRAPFLY_API_KEY");
    env::remove_var("YOUTUBE_API_KEY");
}

#[serial_test::serial]
#[test]
fn parse_toml_and_json_paths() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("resolver.toml");
    fs::write(
        &p_toml,
        r#"
[orchestrator]
worker_count = 8

[video]
forward_days = 60
"#,
    )
    .unwrap();
    let cfg = ResolverConfig::load_from(&p_toml).unwrap();
    assert_eq!(cfg.orchestrator.worker_count, 8);
    assert_eq!(cfg.video.forward_days, 60);
    assert_eq!(cfg.video.extended_forward_days, 180);

    let p_json = dir.path().join("resolver.json");
    fs::write(&p_json, r#"{"web":{"min_content_len":900}}"#).unwrap();
    let cfg = ResolverConfig::load_from(&p_json).unwrap();
    assert_eq!(cfg.web.min_content_len, 900);

    let bad = dir.path().join("broken.json");
    fs::write(&bad, "{ nope").unwrap();
    assert!(ResolverConfig::load_from(&bad).is_err());
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // Isolate CWD so the repo's own config/ is not picked up.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    // 1) Nothing on disk -> built-in defaults
    let cfg = ResolverConfig::load_default().unwrap();
    assert_eq!(cfg.orchestrator.worker_count, 4);
    assert_eq!(cfg.web.min_content_len, 500);

    // 2) ./config/resolver.toml fallback
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("resolver.toml"), "[orchestrator]\nbudget_secs = 45\n").unwrap();
    assert_eq!(ResolverConfig::load_default().unwrap().orchestrator.budget_secs, 45);

    // 3) Env path wins
    let p_env = tmp.path().join("elsewhere.json");
    fs::write(&p_env, r#"{"orchestrator":{"budget_secs":15}}"#).unwrap();
    env::set_var(ENV_PATH, p_env.display().to_string());
    assert_eq!(ResolverConfig::load_default().unwrap().orchestrator.budget_secs, 15);

    // 4) Env path to nowhere is an error, not a silent fallback
    env::set_var(ENV_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(ResolverConfig::load_default().is_err());

    clear_env();
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn env_overrides_are_clamped() {
    clear_env();
    env::set_var(ENV_WORKERS, "1000");
    env::set_var(ENV_MIN_CONTENT_LEN, "10");
    env::set_var(ENV_COOLDOWN_SECS, "120");
    env::set_var(ENV_CAPTION_CONCURRENCY, "not-a-number");

    let mut cfg = ResolverConfig::default();
    cfg.apply_env_overrides();
    assert_eq!(cfg.orchestrator.worker_count, 64);
    assert_eq!(cfg.web.min_content_len, 50);
    assert_eq!(cfg.limiter.cooldown_secs, 120);
    assert_eq!(cfg.video.caption_concurrency, 2);

    clear_env();
}

#[serial_test::serial]
#[test]
fn enabled_provider_reads_key_from_env() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("resolver.toml");
    fs::write(
        &p,
        r#"
[providers.scrapfly]
enabled = true
api_key = "ENV"
"#,
    )
    .unwrap();

    let err = ResolverConfig::load_from(&p).unwrap_err();
    assert!(err.to_string().contains("SCRAPFLY_API_KEY"), "{err}");

    env::set_var("SCRAPFLY_API_KEY", "sk-test");
    let cfg = ResolverConfig::load_from(&p).unwrap();
    assert_eq!(cfg.providers.scrapfly.api_key, "sk-test");
    assert!(!cfg.providers.youtube_api.enabled);

    clear_env();
}
