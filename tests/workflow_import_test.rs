// ==========================================
// 审批工作流导入集成测试
// ==========================================
// 覆盖: 提交路由、逐行进入审批、失败补偿、表头与工作流字段检查
// ==========================================


use datastore_import::domain::{ImportAction, JobOutcome, RecordStatus, Value};
use datastore_import::importer::ImportPipeline;
use datastore_import::repository::TaskRepository;
use datastore_import::ImportRequest;
use test_helpers::*;

async fn run(harness: &Harness, request: ImportRequest) -> JobOutcome {
    let job = datastore_import::ImportJob::new(
        &request.job_id,
        &request.app_id,
        &request.datastore_id,
        &request.actor.user_id,
    );
    harness.tasks.create_task(&job).await.unwrap();
    ImportPipeline::new(harness.collaborators(), harness.settings())
        .run(request)
        .await
}

fn existing_record() -> MemoryRecordStore {
    let records = MemoryRecordStore::default();
    records.put(
        DATASTORE,
        "abc",
        &[
            ("name", Value::Text("Old".into())),
            ("amount", Value::Number("5.0".into())),
        ],
    );
    records
}

#[tokio::test]
async fn test_insert_rows_enter_configured_workflow() {
    let workflows = MemoryWorkflows::with(vec![workflow("wf_new", ImportAction::Insert, None)]);
    let harness = Harness::new(product_schema(), MemoryRecordStore::default(), workflows);
    harness.upload("upload/items.csv", "id,name,amount\n,A,1\n,B,2\n");

    let outcome = run(&harness, request("wf1", ImportAction::Insert, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::PendingApproval);

    assert_eq!(harness.workflows.staged.lock().unwrap().len(), 2);
    assert_eq!(harness.workflows.started.lock().unwrap().len(), 2);
    // 审批通过前不写入记录存储
    assert!(harness.records.records_in(DATASTORE).is_empty());

    let job = harness.tasks.find_task("wf1").await.unwrap().unwrap();
    assert_eq!(job.outcome, Some(JobOutcome::PendingApproval));
    assert_eq!(job.message, "2 rows have entered the approval workflow");
}

#[tokio::test]
async fn test_selected_update_workflow_locks_record() {
    let workflows = MemoryWorkflows::with(vec![workflow(
        "wf_upd",
        ImportAction::Update,
        Some("name"),
    )]);
    let harness = Harness::new(product_schema(), existing_record(), workflows);
    harness.upload("upload/items.csv", "id,name\nabc,New\n");

    let mut req = request("wf2", ImportAction::Update, "upload/items.csv");
    req.workflow_id = Some("wf_upd".into());
    assert_eq!(run(&harness, req).await, JobOutcome::PendingApproval);

    let staged = harness.workflows.staged.lock().unwrap();
    let envelope = &staged[0];
    assert_eq!(envelope.item_id.as_deref(), Some("abc"));
    assert_eq!(envelope.current_values["name"], Value::Text("New".into()));
    assert_eq!(envelope.prior_values_subset.len(), 1);
    assert_eq!(envelope.prior_values_subset["name"], Value::Text("Old".into()));

    let record = harness.records.get(DATASTORE, "abc").unwrap();
    assert_eq!(record.status, RecordStatus::PendingApproval);
    assert_eq!(record.values["name"], Value::Text("Old".into()));
}

#[tokio::test]
async fn test_failed_start_is_compensated() {
    let workflows = MemoryWorkflows {
        fail_start: true,
        ..MemoryWorkflows::with(vec![workflow("wf_upd", ImportAction::Update, None)])
    };
    let harness = Harness::new(product_schema(), existing_record(), workflows);
    harness.upload("upload/items.csv", "id,name\nabc,New\n");

    let outcome = run(&harness, request("wf3", ImportAction::Update, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::AllFailed);

    assert_eq!(
        harness.workflows.deleted.lock().unwrap().as_slice(),
        &["tpl1".to_string()]
    );
    let record = harness.records.get(DATASTORE, "abc").unwrap();
    assert_eq!(record.status, RecordStatus::Normal);
    assert_eq!(
        harness.records.status_changes.lock().unwrap().as_slice(),
        &[
            ("abc".to_string(), RecordStatus::PendingApproval),
            ("abc".to_string(), RecordStatus::Normal),
        ]
    );

    let lines = harness.error_lines("wf3");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("Line 2: Failed to submit the row for approval"));
}

#[tokio::test]
async fn test_record_under_approval_is_rejected() {
    let records = existing_record();
    records.set_status(DATASTORE, "abc", RecordStatus::PendingApproval);
    let harness = Harness::new(product_schema(), records, MemoryWorkflows::default());
    harness.upload("upload/items.csv", "id,name\nabc,New\n");

    let outcome = run(&harness, request("wf4", ImportAction::Update, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::AllFailed);
    assert_eq!(
        harness.error_lines("wf4"),
        vec!["Line 2: The record is under approval and cannot be updated".to_string()]
    );
}

#[tokio::test]
async fn test_workflow_field_count_mismatch_aborts() {
    let workflows = MemoryWorkflows::with(vec![workflow(
        "wf_upd",
        ImportAction::Update,
        Some("name"),
    )]);
    let harness = Harness::new(product_schema(), existing_record(), workflows);
    harness.upload("upload/items.csv", "id,name,amount\nabc,New,1\n");

    let mut req = request("wf5", ImportAction::Update, "upload/items.csv");
    req.workflow_id = Some("wf_upd".into());
    assert_eq!(run(&harness, req).await, JobOutcome::Failed);
    assert_eq!(
        harness.error_lines("wf5"),
        vec!["The file has 2 fields but the workflow declares 1".to_string()]
    );
    assert!(harness.workflows.staged.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_governed_field_requires_workflow_selection() {
    let workflows = MemoryWorkflows::with(vec![workflow(
        "wf_amt",
        ImportAction::Update,
        Some("amount"),
    )]);
    let harness = Harness::new(product_schema(), existing_record(), workflows);
    harness.upload("upload/items.csv", "id,amount\nabc,9\n");

    let outcome = run(&harness, request("wf6", ImportAction::Update, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(
        harness.error_lines("wf6"),
        vec![
            "Field [Amount] is governed by an approval workflow, select a workflow before importing"
                .to_string()
        ]
    );
    let record = harness.records.get(DATASTORE, "abc").unwrap();
    assert_eq!(record.values["amount"], Value::Number("5.0".into()));
}

#[tokio::test]
async fn test_ungoverned_update_commits_directly() {
    let workflows = MemoryWorkflows::with(vec![workflow(
        "wf_amt",
        ImportAction::Update,
        Some("amount"),
    )]);
    let harness = Harness::new(product_schema(), existing_record(), workflows);
    harness.upload("upload/items.csv", "id,name\nabc,New\n");

    let outcome = run(&harness, request("wf7", ImportAction::Update, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::Success);
    let record = harness.records.get(DATASTORE, "abc").unwrap();
    assert_eq!(record.values["name"], Value::Text("New".into()));
}

#[tokio::test]
async fn test_unknown_selected_workflow_aborts() {
    let harness = Harness::new(
        product_schema(),
        MemoryRecordStore::default(),
        MemoryWorkflows::default(),
    );
    harness.upload("upload/items.csv", "id,name\n,A\n");

    let mut req = request("wf8", ImportAction::Insert, "upload/items.csv");
    req.workflow_id = Some("ghost".into());
    assert_eq!(run(&harness, req).await, JobOutcome::Failed);
    assert_eq!(
        harness.error_lines("wf8"),
        vec!["Workflow ghost does not exist".to_string()]
    );
}
