//! 配置引擎端到端测试：引导、冻结、快照和跨运行漂移
use config_abstractions::{ConfigChangeEvent, ConfigChangeEventType, EntryOp, EntrySource};
use config_common::{ConfigError, PluginRegistry};
use config_composition::ConfigBuilder;
use config_impl::{
    callback, ConfigFactory, DictConfigFiller, FileConfigFiller, ReadOptions, WORK_CONF_BANNER,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

const TASK_CONF: &str = "[global]\nbackend = Host\n\n[jobs]\nwall_time = 72:00\nretries = 3\n";

fn write_task(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("mytask.conf");
    std::fs::write(&path, content).unwrap();
    path
}

fn build(dir: &Path, overrides: &[&str], plugins: &Arc<PluginRegistry>) -> ConfigFactory {
    ConfigBuilder::new()
        .with_process_dir(dir)
        .with_config_file(dir.join("mytask.conf"))
        .with_overrides(overrides.iter().map(|s| s.to_string()))
        .with_plugin_registry(plugins.clone())
        .build()
        .unwrap()
}

/// 模拟任务对配置的固定读取序列
fn read_task_settings(factory: &ConfigFactory) -> anyhow::Result<()> {
    let jobs = factory.config_for(["jobs"]);
    jobs.get("wall_time", Some("24:00"))?;
    jobs.get_int("retries", Some(1))?;
    jobs.get_bool("continuous", Some(false))?;
    Ok(())
}

#[test]
fn test_workdir_derived_from_config_file_name() {
    let run = tempfile::tempdir().unwrap();
    write_task(run.path(), TASK_CONF);
    let plugins = Arc::new(PluginRegistry::new());

    let factory = build(run.path(), &[], &plugins);
    assert_eq!(factory.work_dir(), run.path().join("mytask.work"));
    assert_eq!(factory.config_name(), "mytask");
    assert_eq!(factory.stored_config_path(), run.path().join("mytask.work/work.conf"));
    assert!(!factory.is_stored_enabled());
}

#[test]
fn test_workdir_base_override() {
    let run = tempfile::tempdir().unwrap();
    let base = tempfile::tempdir().unwrap();
    write_task(run.path(), TASK_CONF);
    let plugins = Arc::new(PluginRegistry::new());

    let override_base = format!("global.workdir base={}", base.path().display());
    let factory = build(run.path(), &[override_base.as_str()], &plugins);
    assert_eq!(factory.work_dir(), base.path().join("mytask.work"));
}

#[test]
fn test_snapshots_record_value_and_default() -> anyhow::Result<()> {
    let run = tempfile::tempdir()?;
    write_task(run.path(), TASK_CONF);
    let plugins = Arc::new(PluginRegistry::new());
    let factory = build(run.path(), &[], &plugins);

    read_task_settings(&factory)?;
    let report = factory.freeze(true)?;
    assert_eq!(report.written.len(), 2);

    let minimal = std::fs::read_to_string(factory.flat_config_path())?;
    let jobs_section = minimal.split("[jobs]").nth(1).unwrap_or_default();
    assert!(jobs_section.contains("wall_time = 72:00"));
    assert!(!minimal.contains("continuous"));
    assert!(minimal.contains(&format!("workdir = {}", factory.work_dir().display())));

    let complete = std::fs::read_to_string(factory.stored_config_path())?;
    assert!(complete.starts_with(WORK_CONF_BANNER));
    assert!(complete.contains("; default: 24:00\nwall_time = 72:00"));
    assert!(complete.contains("continuous = false"));
    assert!(complete.contains("; source: file"));
    Ok(())
}

#[test]
fn test_private_section_excluded_from_unused_report() -> anyhow::Result<()> {
    let run = tempfile::tempdir()?;
    write_task(
        run.path(),
        "[!private]\ntoken = abc\n\n[dataset !private]\nnick = x\n\n[jobs]\nretries = 3\nforgotten = 1\n",
    );
    let plugins = Arc::new(PluginRegistry::new());
    let factory = build(run.path(), &[], &plugins);
    factory.config_for(["jobs"]).get_int("retries", None)?;

    let report = factory.freeze(false)?;
    let unused: Vec<&str> = report.unused.iter().map(|entry| entry.key.as_str()).collect();
    assert!(unused.contains(&"forgotten"));
    assert!(!unused.contains(&"token"));
    assert!(!unused.contains(&"nick"));
    assert!(!unused.contains(&"retries"));
    Ok(())
}

#[test]
fn test_round_trip_has_no_drift() -> anyhow::Result<()> {
    let run = tempfile::tempdir()?;
    write_task(run.path(), TASK_CONF);
    let plugins = Arc::new(PluginRegistry::new());

    let first = build(run.path(), &[], &plugins);
    read_task_settings(&first)?;
    first.freeze(true)?;

    let second = build(run.path(), &[], &plugins);
    assert!(second.is_stored_enabled());
    assert_eq!(second.config_name(), "mytask");
    read_task_settings(&second)?;
    assert_eq!(second.drift(), Vec::new());
    Ok(())
}

#[test]
fn test_multiline_value_survives_round_trip() -> anyhow::Result<()> {
    let run = tempfile::tempdir()?;
    write_task(run.path(), TASK_CONF);
    let plugins = Arc::new(PluginRegistry::new());
    let script = "echo start\n# keep this line\n\n; and this one\ndone";
    let build_with_script = || {
        ConfigBuilder::new()
            .with_process_dir(run.path())
            .with_config_file(run.path().join("mytask.conf"))
            .with_value("jobs", "script", script)
            .with_plugin_registry(plugins.clone())
            .build()
    };

    let first = build_with_script()?;
    assert_eq!(first.config_for(["jobs"]).get("script", None)?, script);
    first.freeze(true)?;

    let second = build_with_script()?;
    assert_eq!(second.config_for(["jobs"]).get("script", None)?, script);
    let stored = second.view().stored().read().get("jobs", "script").map(|entry| entry.value);
    assert_eq!(stored.as_deref(), Some(script));
    assert_eq!(second.drift(), Vec::new());
    Ok(())
}

#[test]
fn test_changed_value_is_reported_as_drift() -> anyhow::Result<()> {
    let run = tempfile::tempdir()?;
    write_task(run.path(), TASK_CONF);
    let plugins = Arc::new(PluginRegistry::new());

    let first = build(run.path(), &[], &plugins);
    read_task_settings(&first)?;
    first.freeze(true)?;

    let second = build(run.path(), &["jobs.retries=5"], &plugins);
    let drift = second.drift();
    assert_eq!(drift.len(), 1);
    assert_eq!(drift[0].section, "jobs");
    assert_eq!(drift[0].key, "retries");
    assert_eq!(drift[0].stored.as_deref(), Some("3"));
    assert_eq!(drift[0].current, "5");
    Ok(())
}

#[test]
fn test_on_change_reports_drift_from_previous_run() -> anyhow::Result<()> {
    let run = tempfile::tempdir()?;
    write_task(run.path(), "[jobs]\nwall_time = 24:00\n");
    let plugins = Arc::new(PluginRegistry::new());
    let first = build(run.path(), &[], &plugins);
    first.config_for(["jobs"]).get("wall_time", None)?;
    first.freeze(true)?;

    write_task(run.path(), "[jobs]\nwall_time = 72:00\n");
    let second = build(run.path(), &[], &plugins);
    let events: Arc<Mutex<Vec<ConfigChangeEvent>>> = Arc::default();
    let sink = events.clone();
    let options = ReadOptions::new().on_change(callback(move |event: &ConfigChangeEvent| {
        sink.lock().push(event.clone());
    }));
    let value = second
        .config_for(["jobs"])
        .get_with("wall_time", Some("24:00"), &options)?;

    assert_eq!(value, "72:00");
    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ConfigChangeEventType::Drift);
    assert_eq!(events[0].old_value.as_deref(), Some("24:00"));
    Ok(())
}

#[test]
fn test_override_wins_regardless_of_filler_order() {
    let run = tempfile::tempdir().unwrap();
    let file = write_task(run.path(), TASK_CONF);

    let factory = ConfigFactory::builder()
        .with_process_dir(run.path())
        .with_plugin_registry(Arc::new(PluginRegistry::new()))
        .with_filler(DictConfigFiller::new().with_entry("jobs", "retries", "5", EntryOp::Assign))
        .with_filler(FileConfigFiller::new([file]))
        .build()
        .unwrap();

    let jobs = factory.config_for(["jobs"]);
    assert_eq!(jobs.get_int("retries", None).unwrap(), 5);
    let current = factory.view().current().read();
    let provenance = current.entries_for("jobs", "retries");
    assert_eq!(provenance.len(), 2);
    assert_eq!(provenance[1].source(), EntrySource::Dict);
}

#[test]
fn test_plugin_search_paths_are_deduplicated() {
    let run = tempfile::tempdir().unwrap();
    let extra = tempfile::tempdir().unwrap();
    write_task(run.path(), TASK_CONF);
    let plugins = Arc::new(PluginRegistry::new());

    let paths = format!(
        "global.plugin paths={} {}",
        extra.path().display(),
        extra.path().display()
    );
    build(run.path(), &[paths.as_str()], &plugins);
    build(run.path(), &[paths.as_str()], &plugins);
    assert_eq!(plugins.search_paths(), vec![extra.path().to_path_buf()]);

    build(run.path(), &[], &plugins);
    assert_eq!(
        plugins.search_paths(),
        vec![extra.path().to_path_buf(), run.path().to_path_buf()]
    );
}

#[test]
fn test_change_view_keeps_parent_resolution() {
    let run = tempfile::tempdir().unwrap();
    write_task(
        run.path(),
        "[global]\nqueue = default\n\n[jobs]\nqueue = short\n\n[dataset]\nqueue = long\n",
    );
    let plugins = Arc::new(PluginRegistry::new());
    let factory = build(run.path(), &[], &plugins);

    let jobs = factory.config_for(["jobs"]);
    let before = jobs.get("queue", None).unwrap();
    let dataset = jobs.change_view(["dataset"]);
    assert_eq!(dataset.get("queue", None).unwrap(), "long");
    assert_eq!(jobs.get("queue", None).unwrap(), before);
    assert_eq!(factory.config().get("queue", None).unwrap(), "default");
}

#[test]
fn test_interpolation_and_path_tokens() {
    let run = tempfile::tempdir().unwrap();
    write_task(
        run.path(),
        "[global]\nbase = /data\n\n[jobs]\ninput = %(base)s/input\noutput = <WORKDIR>/output\n",
    );
    let plugins = Arc::new(PluginRegistry::new());
    let factory = build(run.path(), &[], &plugins);
    let jobs = factory.config_for(["jobs"]);

    assert_eq!(jobs.get("input", None).unwrap(), "/data/input");
    assert_eq!(
        jobs.get_path("output", None, false).unwrap(),
        factory.work_dir().join("output")
    );
}

#[test]
fn test_interpolation_cycle_aborts_bootstrap() {
    let run = tempfile::tempdir().unwrap();
    write_task(run.path(), "[jobs]\na = %(b)s\nb = %(a)s\n");
    let err = ConfigBuilder::new()
        .with_process_dir(run.path())
        .with_config_file(run.path().join("mytask.conf"))
        .with_plugin_registry(Arc::new(PluginRegistry::new()))
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("循环引用"));
}

#[test]
fn test_mutation_after_freeze_fails() {
    let run = tempfile::tempdir().unwrap();
    write_task(run.path(), TASK_CONF);
    let plugins = Arc::new(PluginRegistry::new());
    let factory = build(run.path(), &[], &plugins);
    factory.freeze(false).unwrap();

    let err = factory.config_for(["jobs"]).set("retries", "9").unwrap_err();
    assert!(matches!(err, ConfigError::ContainerReadOnly { .. }));
    // 冻结后仍可读取
    assert_eq!(factory.config_for(["jobs"]).get_int("retries", Some(1)).unwrap(), 3);
}

#[test]
fn test_compat_state_file_populates_stored_config() -> anyhow::Result<()> {
    let run = tempfile::tempdir()?;
    write_task(run.path(), TASK_CONF);
    let plugins = Arc::new(PluginRegistry::new());
    let first = build(run.path(), &[], &plugins);
    first.freeze(true)?;
    std::fs::write(first.work_dir().join("task.dat"), "task id: GC0123\n")?;

    let second = build(run.path(), &[], &plugins);
    assert_eq!(second.config_for(["task"]).get("task id", None)?, "GC0123");
    Ok(())
}

#[test]
fn test_plugin_lookup_through_config() {
    let run = tempfile::tempdir().unwrap();
    write_task(run.path(), TASK_CONF);
    let plugins = Arc::new(PluginRegistry::new());
    plugins.register_builtin("Backend", "Host");
    let factory = build(run.path(), &[], &plugins);

    let handle = factory.config().get_plugin("backend", Some("Local"), "Backend").unwrap();
    assert_eq!(handle.name, "Host");
    assert!(factory
        .config()
        .get_plugin("missing backend", Some("Nowhere"), "Backend")
        .is_err());
}
