use std::sync::Mutex;

use super::*;
use crate::assets::loader::{AssetLoader, FsAssetLoader, LoadedAsset};
use crate::bind::{BindContext, bind};
use crate::record::DataRecord;
use crate::template::model::Template;

enum Behavior {
    Write,
    WriteNothing,
    Fail(RenderFailure),
    Panic,
}

struct TestBackend {
    behavior: Behavior,
    seen: Mutex<Vec<PathBuf>>,
}

impl TestBackend {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl RenderBackend for TestBackend {
    fn render(&self, job: &RenderJob<'_>) -> Result<(), RenderFailure> {
        self.seen.lock().unwrap().push(job.output_path.to_path_buf());
        match &self.behavior {
            Behavior::Write => {
                fs::write(job.output_path, job.plan.item_id.as_bytes()).unwrap();
                Ok(())
            }
            Behavior::WriteNothing => Ok(()),
            Behavior::Fail(f) => {
                fs::write(job.output_path, b"half").unwrap();
                Err(f.clone())
            }
            Behavior::Panic => panic!("backend exploded"),
        }
    }
}

fn executor(backend: Arc<TestBackend>, dir: &Path) -> RenderExecutor {
    let cache = Arc::new(AssetCache::new(Arc::new(FsAssetLoader::new(
        dir.join("cache"),
    ))));
    RenderExecutor::new(backend, cache)
}

fn text_plan(dir: &Path, title: &str) -> RenderPlan {
    let t = Template::from_json_str(
        r#"{ "canvas": { "width": 64, "height": 64 }, "duration": 1,
             "layers": [ { "kind": "text", "value": "{title}" } ] }"#,
    )
    .unwrap();
    let rec = DataRecord::new().with("id", "a").with("title", title);
    bind(&t, &rec, 3, &BindContext::new(dir.join("out"), dir)).unwrap()
}

#[test]
fn success_publishes_atomically_with_marker() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TestBackend::new(Behavior::Write);
    let exec = executor(backend.clone(), dir.path());
    let plan = text_plan(dir.path(), "x");

    let r = exec.render(&plan);
    assert_eq!(r.status, RenderStatus::Succeeded, "{r:?}");
    assert_eq!((r.index, r.item_id.as_str(), r.attempts), (3, "a", 1));
    assert_eq!(fs::read(&plan.output_path).unwrap(), b"a");

    let seen = backend.seen.lock().unwrap();
    assert_ne!(seen[0], plan.output_path, "backend must write to a temporary path");
    assert!(!seen[0].exists());

    assert!(marker_path(&plan.output_path).is_file());
    assert!(is_complete(&plan, SkipPolicy::Fingerprint));
    assert!(is_complete(&plan, SkipPolicy::Exists));
    assert!(!is_complete(&plan, SkipPolicy::Never));
}

#[test]
fn changed_plan_invalidates_fingerprint_skip() {
    let dir = tempfile::tempdir().unwrap();
    let exec = executor(TestBackend::new(Behavior::Write), dir.path());
    exec.render(&text_plan(dir.path(), "x"));

    let changed = text_plan(dir.path(), "y");
    assert!(!is_complete(&changed, SkipPolicy::Fingerprint));
    assert!(is_complete(&changed, SkipPolicy::Exists));
}

#[test]
fn failure_leaves_no_file_behind() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TestBackend::new(Behavior::Fail(RenderFailure::transient("busy")));
    let exec = executor(backend.clone(), dir.path());
    let plan = text_plan(dir.path(), "x");

    let r = exec.render(&plan);
    assert_eq!(r.status, RenderStatus::Failed);
    assert!(r.is_transient_failure());
    let err = r.error.unwrap();
    assert_eq!(err.class, ErrorClass::Render);
    assert!(err.message.contains("busy"));

    assert!(!plan.output_path.exists());
    assert!(!backend.seen.lock().unwrap()[0].exists());
}

#[test]
fn panics_and_empty_outputs_become_permanent_failures() {
    let dir = tempfile::tempdir().unwrap();
    for behavior in [Behavior::Panic, Behavior::WriteNothing] {
        let exec = executor(TestBackend::new(behavior), dir.path());
        let plan = text_plan(dir.path(), "x");
        let r = exec.render(&plan);
        assert_eq!(r.status, RenderStatus::Failed);
        assert!(!r.is_transient_failure());
        assert!(!plan.output_path.exists());
    }
}

#[test]
fn missing_asset_fails_the_item_and_names_it() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TestBackend::new(Behavior::Write);
    let exec = executor(backend.clone(), dir.path());
    let t = Template::from_json_str(
        r#"{ "canvas": { "width": 64, "height": 64 }, "duration": 1,
             "layers": [ { "kind": "image", "value": "{image}" } ] }"#,
    )
    .unwrap();
    let rec = DataRecord::new().with("image", "missing.png");
    let plan = bind(&t, &rec, 0, &BindContext::new(dir.path().join("out"), dir.path())).unwrap();

    let r = exec.render(&plan);
    assert_eq!(r.status, RenderStatus::Failed);
    assert!(!r.is_transient_failure());
    let err = r.error.unwrap();
    assert_eq!(err.class, ErrorClass::Render);
    assert!(err.message.starts_with("render failure: (permanent) asset '"), "{}", err.message);
    assert!(err.message.contains("missing.png"), "{}", err.message);
    assert!(backend.seen.lock().unwrap().is_empty());
}

struct PanickingLoader;

impl AssetLoader for PanickingLoader {
    fn load(&self, _key: &AssetKey) -> VidstampResult<LoadedAsset> {
        panic!("loader exploded");
    }
}

#[test]
fn panicking_asset_loader_fails_only_the_item() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TestBackend::new(Behavior::Write);
    let exec = RenderExecutor::new(
        backend.clone(),
        Arc::new(AssetCache::new(Arc::new(PanickingLoader))),
    );
    let t = Template::from_json_str(
        r#"{ "canvas": { "width": 64, "height": 64 }, "duration": 1,
             "layers": [ { "kind": "image", "value": "bad.png" } ] }"#,
    )
    .unwrap();
    let plan = bind(&t, &DataRecord::new(), 0, &BindContext::new(dir.path().join("out"), dir.path())).unwrap();

    let r = exec.render(&plan);
    assert_eq!(r.status, RenderStatus::Failed);
    assert!(!r.is_transient_failure());
    let err = r.error.unwrap();
    assert_eq!(err.class, ErrorClass::Render);
    assert!(err.message.contains("bad.png"), "{}", err.message);
    assert!(backend.seen.lock().unwrap().is_empty());
    assert!(!plan.output_path.exists());

    // The executor stays usable for the next item.
    let ok = exec.render(&text_plan(dir.path(), "x"));
    assert_eq!(ok.status, RenderStatus::Succeeded, "{ok:?}");
}

#[test]
fn stale_marker_does_not_validate_a_replaced_output() {
    let dir = tempfile::tempdir().unwrap();
    let plan = text_plan(dir.path(), "x");
    fs::create_dir_all(plan.output_path.parent().unwrap()).unwrap();
    fs::write(&plan.output_path, b"foreign").unwrap();
    fs::write(marker_path(&plan.output_path), b"{ not json").unwrap();
    assert!(!is_complete(&plan, SkipPolicy::Fingerprint));
}

#[test]
fn helper_paths_are_hidden_siblings() {
    let out = Path::new("out/clip.mp4");
    assert_eq!(marker_path(out), Path::new("out/.clip.mp4.vidstamp.json"));
    assert_eq!(partial_path(out), Path::new("out/.clip.partial.mp4"));
}

#[test]
fn skip_policy_parses() {
    assert_eq!("Exists".parse::<SkipPolicy>().unwrap(), SkipPolicy::Exists);
    assert!(matches!(
        "sometimes".parse::<SkipPolicy>(),
        Err(VidstampError::Config(_))
    ));
}
