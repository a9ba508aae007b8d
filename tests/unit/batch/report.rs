use super::*;
use crate::foundation::error::VidstampError;

fn result(index: usize, status: RenderStatus) -> RenderResult {
    let mut r = RenderResult::failed(
        index,
        index.to_string(),
        None,
        &VidstampError::validation("bad"),
        1,
    );
    r.status = status;
    if status != RenderStatus::Failed {
        r.error = None;
    }
    r
}

#[test]
fn counts_and_orders_results() {
    let report = BatchReport::from_results(
        vec![
            result(2, RenderStatus::Skipped),
            result(0, RenderStatus::Succeeded),
            result(3, RenderStatus::Cancelled),
            result(1, RenderStatus::Failed),
        ],
        1500,
    );
    let order: Vec<usize> = report.results.iter().map(|r| r.index).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
    assert_eq!(
        (report.total, report.succeeded, report.failed, report.skipped, report.cancelled),
        (4, 1, 1, 1, 1)
    );
    assert!(!report.is_success());
    assert_eq!(report.failures().map(|r| r.index).collect::<Vec<_>>(), vec![1]);
    assert_eq!(
        report.to_string(),
        "4 items: 1 succeeded, 1 failed, 1 skipped, 1 cancelled in 1.5s"
    );
}

#[test]
fn all_done_is_success() {
    let report = BatchReport::from_results(
        vec![result(0, RenderStatus::Succeeded), result(1, RenderStatus::Skipped)],
        0,
    );
    assert!(report.is_success());
}

#[test]
fn json_report_lists_failure_detail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/report.json");
    let report = BatchReport::from_results(vec![result(0, RenderStatus::Failed)], 5);
    report.write_json(&path).unwrap();

    let v: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(v["failed"], 1);
    assert_eq!(v["results"][0]["status"], "failed");
    assert_eq!(v["results"][0]["error"]["class"], "validation");
    assert_eq!(v["results"][0]["error"]["transient"], false);

    let back: BatchReport = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(back, report);
}
