// ==========================================
// 导入受理 API 集成测试
// ==========================================
// 覆盖: 受理与后台运行、同一台账并发守卫、任务查询、请求校验
// ==========================================


use datastore_import::api::{ApiError, ImportApi};
use datastore_import::domain::{ImportAction, JobOutcome, JobStep};
use datastore_import::repository::TaskRepository;
use std::sync::Arc;
use test_helpers::*;
use tokio::sync::Semaphore;

fn harness() -> Harness {
    Harness::new(
        product_schema(),
        MemoryRecordStore::default(),
        MemoryWorkflows::default(),
    )
}

#[tokio::test]
async fn test_submit_runs_in_background() {
    let harness = harness();
    harness.upload("upload/items.csv", "id,name\n,A\n");
    let api = ImportApi::new(harness.collaborators(), harness.settings());

    let handle = api
        .submit(request("", ImportAction::Insert, "upload/items.csv"))
        .await
        .unwrap();
    let job_id = handle.job_id.clone();
    assert!(!job_id.is_empty());

    let job = api.job_status(&job_id).await.unwrap();
    assert_eq!(job.steps, JobStep::ALL.to_vec());

    assert_eq!(handle.join().await, JobOutcome::Success);
    let job = api.job_status(&job_id).await.unwrap();
    assert_eq!(job.current_step, JobStep::End);
    assert_eq!(job.counts.inserted, 1);
    assert!(!api.is_running(TENANT, APP, DATASTORE));
}

#[tokio::test]
async fn test_second_import_for_same_datastore_rejected() {
    let harness = harness();
    harness.upload("upload/a.csv", "id,name\n,A\n");
    harness.upload("upload/b.csv", "id,name\n,B\n");
    let gate = Arc::new(Semaphore::new(0));
    harness.storage.hold(gate.clone());
    let api = ImportApi::new(harness.collaborators(), harness.settings());

    let first = api
        .submit(request("jobA", ImportAction::Insert, "upload/a.csv"))
        .await
        .unwrap();
    assert!(api.is_running(TENANT, APP, DATASTORE));

    let second = api
        .submit(request("jobB", ImportAction::Insert, "upload/b.csv"))
        .await;
    match second {
        Err(ApiError::ImportInProgress(ds)) => assert_eq!(ds, DATASTORE),
        other => panic!("unexpected result: {:?}", other.map(|h| h.job_id)),
    }
    assert!(harness.tasks.find_task("jobB").await.unwrap().is_none());

    // 守卫按台账区分
    let mut other_ds = request("jobC", ImportAction::Insert, "upload/b.csv");
    other_ds.datastore_id = "ds_other".into();
    let other = api.submit(other_ds).await.unwrap();

    // 其他租户的同名台账互不阻塞
    let mut other_tenant = request("jobE", ImportAction::Insert, "upload/b.csv");
    other_tenant.tenant = "t2".into();
    let tenant_handle = api.submit(other_tenant).await.unwrap();
    assert!(api.is_running("t2", APP, DATASTORE));

    gate.add_permits(Semaphore::MAX_PERMITS / 2);
    assert_eq!(first.join().await, JobOutcome::Success);
    let _ = other.join().await;
    let _ = tenant_handle.join().await;
    assert!(!api.is_running("t2", APP, DATASTORE));
    assert!(!api.is_running(TENANT, APP, DATASTORE));

    let again = api
        .submit(request("jobD", ImportAction::Insert, "upload/b.csv"))
        .await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn test_unsupported_file_rejected_without_task() {
    let harness = harness();
    let api = ImportApi::new(harness.collaborators(), harness.settings());

    let result = api
        .submit(request("jobX", ImportAction::Insert, "upload/items.pdf"))
        .await;
    assert!(matches!(result, Err(ApiError::UnsupportedFormat(_))));
    assert!(harness.tasks.find_task("jobX").await.unwrap().is_none());
    assert!(!api.is_running(TENANT, APP, DATASTORE));
}

#[tokio::test]
async fn test_unknown_job_status() {
    let harness = harness();
    let api = ImportApi::new(harness.collaborators(), harness.settings());

    let err = api.job_status("missing").await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    assert_eq!(err.localized("en"), "Import job missing does not exist");
}
