// ==========================================
// 导入流水线集成测试
// ==========================================
// 覆盖: 直接提交（新增/更新/图片）、行级错误与错误日志、
//       关联完整性、致命错误、传输中断、元数据按需加载
// ==========================================


use datastore_import::domain::{
    CsvEncoding, DatastoreInfo, FieldDefinition, FieldType, ImportAction, JobOutcome, JobStep,
    RelationDefinition, Value,
};
use datastore_import::importer::{HeaderScan, ImportPipeline, SchemaContextLoader};
use datastore_import::repository::TaskRepository;
use std::collections::BTreeMap;
use std::io::Write;
use test_helpers::*;

async fn run(harness: &Harness, request: datastore_import::ImportRequest) -> JobOutcome {
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

#[tokio::test]
async fn test_insert_commits_coerced_values() {
    datastore_import::logging::init_test();
    let harness = Harness::new(
        product_schema(),
        MemoryRecordStore::default(),
        MemoryWorkflows::default(),
    );
    harness.upload("upload/items.csv", "id,name,amount\n,Widget,10.5\n,Gadget,3\n");

    let outcome = run(&harness, request("job1", ImportAction::Insert, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::Success);

    let mut records = harness.records.records_in(DATASTORE);
    records.sort_by_key(|r| r.values["name"].raw_string());
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].values["name"], Value::Text("Gadget".into()));
    assert_eq!(records[0].values["amount"], Value::Number("3.0".into()));
    assert_eq!(records[1].values["amount"], Value::Number("10.5".into()));

    let job = harness.tasks.find_task("job1").await.unwrap().unwrap();
    assert_eq!(job.current_step, JobStep::End);
    assert_eq!(job.outcome, Some(JobOutcome::Success));
    assert_eq!(job.counts.total, 2);
    assert_eq!(job.counts.inserted, 2);
    assert_eq!(job.progress, 100);
    assert!(job.error_artifact.is_none());
    assert!(job.end_time.is_some());

    // 上传的源文件取回后删除
    assert!(harness.storage.get("upload/items.csv").is_none());
}

#[tokio::test]
async fn test_update_marker_clears_and_blank_keeps() {
    let records = MemoryRecordStore::default();
    records.put(
        DATASTORE,
        "abc",
        &[
            ("name", Value::Text("Old".into())),
            ("amount", Value::Number("5.0".into())),
        ],
    );
    let harness = Harness::new(product_schema(), records, MemoryWorkflows::default());
    harness.upload("upload/items.csv", "id,name,amount\nabc,,#N/A\n");

    let outcome = run(&harness, request("job2", ImportAction::Update, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::Success);

    let record = harness.records.get(DATASTORE, "abc").unwrap();
    assert_eq!(record.values["name"], Value::Text("Old".into()));
    assert_eq!(record.values["amount"], Value::Number(String::new()));

    let job = harness.tasks.find_task("job2").await.unwrap().unwrap();
    assert_eq!(job.counts.updated, 1);
}

#[tokio::test]
async fn test_update_example_row_clears_name_keeps_amount() {
    let prior = || {
        let records = MemoryRecordStore::default();
        records.put(
            DATASTORE,
            "abc123",
            &[
                ("name", Value::Text("Widget".into())),
                ("amount", Value::Number("10.5".into())),
            ],
        );
        records
    };
    let csv = "id,name,amount\nabc123,#N/A,\n";

    let mut schema = product_schema();
    for field in schema.fields.iter_mut().filter(|f| f.field_id == "name") {
        field.is_required = false;
    }
    let harness = Harness::new(schema, prior(), MemoryWorkflows::default());
    harness.upload("upload/items.csv", csv);

    let outcome = run(&harness, request("job2a", ImportAction::Update, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::Success);
    let record = harness.records.get(DATASTORE, "abc123").unwrap();
    assert_eq!(record.values["name"], Value::Text(String::new()));
    assert_eq!(record.values["amount"], Value::Number("10.5".into()));

    // 必填字段不能被清空
    let harness = Harness::new(product_schema(), prior(), MemoryWorkflows::default());
    harness.upload("upload/items.csv", csv);

    let outcome = run(&harness, request("job2r", ImportAction::Update, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::AllFailed);
    assert_eq!(
        harness.error_lines("job2r"),
        vec!["Line 2: field [Name]: This field is required".to_string()]
    );
    let record = harness.records.get(DATASTORE, "abc123").unwrap();
    assert_eq!(record.values["name"], Value::Text("Widget".into()));
}

#[tokio::test]
async fn test_update_with_empty_as_clear() {
    let records = MemoryRecordStore::default();
    records.put(DATASTORE, "abc", &[("amount", Value::Number("5.0".into()))]);
    let harness = Harness::new(product_schema(), records, MemoryWorkflows::default());
    harness.upload("upload/items.csv", "id,amount\nabc,\n");

    let mut req = request("job2b", ImportAction::Update, "upload/items.csv");
    req.empty_as_clear = true;
    assert_eq!(run(&harness, req).await, JobOutcome::Success);

    let record = harness.records.get(DATASTORE, "abc").unwrap();
    assert_eq!(record.values["amount"], Value::Number(String::new()));
}

#[tokio::test]
async fn test_update_of_missing_record_fails_every_row() {
    let harness = Harness::new(
        product_schema(),
        MemoryRecordStore::default(),
        MemoryWorkflows::default(),
    );
    harness.upload("upload/items.csv", "id,name\nnope,New\n");

    let outcome = run(&harness, request("job3", ImportAction::Update, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::AllFailed);
    assert_eq!(
        harness.error_lines("job3"),
        vec!["Line 2: The record does not exist or you have no permission".to_string()]
    );
}

#[tokio::test]
async fn test_row_errors_produce_sorted_error_log() {
    let harness = Harness::new(
        product_schema(),
        MemoryRecordStore::default(),
        MemoryWorkflows::default(),
    );
    harness.upload(
        "upload/items.csv",
        "id,name,amount\n,Good,1\n,Pricey,200\n,Bad#Name,2\n",
    );

    let outcome = run(&harness, request("job4", ImportAction::Insert, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::PartialSuccess);

    let lines = harness.error_lines("job4");
    assert_eq!(lines.len(), 2, "{:?}", lines);
    assert_eq!(lines[0], "Line 3: field [Amount]: Must be at most 100");
    assert!(lines[1].starts_with("Line 4: field [Name]:"), "{}", lines[1]);

    let job = harness.tasks.find_task("job4").await.unwrap().unwrap();
    assert_eq!(job.counts.total, 3);
    assert_eq!(job.counts.inserted, 1);
    let artifact = job.error_artifact.unwrap();
    assert_eq!(artifact.name, "import_errors_job4.txt");
    assert_eq!(harness.records.records_in(DATASTORE).len(), 1);
}

#[tokio::test]
async fn test_remote_rejection_reported_with_field_label() {
    let records = MemoryRecordStore::with_script(StoreScript {
        duplicated: vec![("name".into(), "Dup".into())],
        ..Default::default()
    });
    let harness = Harness::new(product_schema(), records, MemoryWorkflows::default());
    harness.upload("upload/items.csv", "id,name\n,Dup\n,Fresh\n");

    let outcome = run(&harness, request("job5", ImportAction::Insert, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::PartialSuccess);
    assert_eq!(
        harness.error_lines("job5"),
        vec!["Line 2: field [Name]: duplicated value".to_string()]
    );
}

#[tokio::test]
async fn test_relation_integrity() {
    let mut schema = product_schema();
    schema
        .fields
        .push(FieldDefinition::new(DATASTORE, "customer", FieldType::Text));
    schema
        .fields
        .push(FieldDefinition::new("ds2", "code", FieldType::Text));
    let mut field_mapping = BTreeMap::new();
    field_mapping.insert("customer".to_string(), "code".to_string());
    schema.datastores.insert(
        DATASTORE.into(),
        DatastoreInfo {
            datastore_id: DATASTORE.into(),
            app_id: APP.into(),
            relations: vec![RelationDefinition {
                relation_id: "rel1".into(),
                target_datastore_id: "ds2".into(),
                field_mapping,
            }],
        },
    );
    schema.labels.datastores.insert("ds2".into(), "Customers".into());
    schema.labels.fields.insert("ds2_code".into(), "Code".into());

    let records = MemoryRecordStore::default();
    records.put("ds2", "c1", &[("code", Value::Text("C001".into()))]);
    let harness = Harness::new(schema, records, MemoryWorkflows::default());
    harness.upload(
        "upload/items.csv",
        "id,name,customer\n,A,C001\n,B,C999\n,C,\n",
    );

    let outcome = run(&harness, request("job6", ImportAction::Insert, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::PartialSuccess);
    assert_eq!(
        harness.error_lines("job6"),
        vec!["Line 3: No corresponding data exists in Customers: [Code]".to_string()]
    );
    assert_eq!(harness.records.records_in(DATASTORE).len(), 2);
}

#[tokio::test]
async fn test_blank_header_aborts_run() {
    let harness = Harness::new(
        product_schema(),
        MemoryRecordStore::default(),
        MemoryWorkflows::default(),
    );
    harness.upload("upload/items.csv", "id,,amount\n,x,1\n");

    let outcome = run(&harness, request("job7", ImportAction::Insert, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(
        harness.error_lines("job7"),
        vec!["Column 2 of the header has no name".to_string()]
    );

    let job = harness.tasks.find_task("job7").await.unwrap().unwrap();
    assert_eq!(job.outcome, Some(JobOutcome::Failed));
    assert!(harness.records.records_in(DATASTORE).is_empty());
}

#[tokio::test]
async fn test_comma_only_row_aborts_run() {
    let harness = Harness::new(
        product_schema(),
        MemoryRecordStore::default(),
        MemoryWorkflows::default(),
    );
    harness.upload("upload/items.csv", "id,name,amount\n,Widget,1\n,,\n");

    let outcome = run(&harness, request("job7b", ImportAction::Insert, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(
        harness.error_lines("job7b"),
        vec!["Line 3 contains only commas".to_string()]
    );

    let job = harness.tasks.find_task("job7b").await.unwrap().unwrap();
    assert_eq!(job.outcome, Some(JobOutcome::Failed));
    assert_eq!(job.counts.inserted, 0);
    assert!(job.error_artifact.is_some());
    assert!(harness.records.records_in(DATASTORE).is_empty());
}

#[tokio::test]
async fn test_missing_upload_aborts_run() {
    let harness = Harness::new(
        product_schema(),
        MemoryRecordStore::default(),
        MemoryWorkflows::default(),
    );

    let outcome = run(&harness, request("job8", ImportAction::Insert, "upload/none.csv")).await;
    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(
        harness.error_lines("job8"),
        vec!["Failed to fetch the uploaded file none.csv".to_string()]
    );
}

#[tokio::test]
async fn test_schema_failure_aborts_run() {
    let mut schema = product_schema();
    schema.fail = true;
    let harness = Harness::new(schema, MemoryRecordStore::default(), MemoryWorkflows::default());
    harness.upload("upload/items.csv", "id,name\n,A\n");

    let outcome = run(&harness, request("job9", ImportAction::Insert, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::Failed);
    let lines = harness.error_lines("job9");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("Failed to load the datastore definition"));
}

#[tokio::test]
async fn test_transport_failure_aborts_run() {
    let records = MemoryRecordStore::with_script(StoreScript {
        break_after: Some(2),
        ..Default::default()
    });
    let harness = Harness::new(product_schema(), records, MemoryWorkflows::default());
    harness.upload("upload/items.csv", "id,name\n,A\n,B\n,C\n");

    let outcome = run(&harness, request("job10", ImportAction::Insert, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::Failed);

    let lines = harness.error_lines("job10");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("connection reset"), "{}", lines[0]);

    let job = harness.tasks.find_task("job10").await.unwrap().unwrap();
    assert!(job.counts.inserted <= 1);
}

#[tokio::test]
async fn test_shift_jis_csv() {
    let harness = Harness::new(
        product_schema(),
        MemoryRecordStore::default(),
        MemoryWorkflows::default(),
    );
    let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode("id,name\n,テスト商品\n");
    harness.storage.put("upload/items.csv", bytes.into_owned());

    let mut req = request("job11", ImportAction::Insert, "upload/items.csv");
    req.encoding = Some(CsvEncoding::ShiftJis);
    assert_eq!(run(&harness, req).await, JobOutcome::Success);

    let records = harness.records.records_in(DATASTORE);
    assert_eq!(records[0].values["name"], Value::Text("テスト商品".into()));
}

#[tokio::test]
async fn test_image_import_uploads_archive_files() {
    let mut schema = product_schema();
    schema.fields.retain(|f| f.field_id == "photo");
    let records = MemoryRecordStore::default();
    records.put(DATASTORE, "abc", &[]);
    let harness = Harness::new(schema, records, MemoryWorkflows::default());
    harness.upload("upload/items.csv", "id,photo\nabc,a.png\n");

    let mut archive = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    archive
        .start_file("pics/a.png", zip::write::SimpleFileOptions::default())
        .unwrap();
    archive
        .write_all(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0])
        .unwrap();
    let archive = archive.finish().unwrap().into_inner();
    harness.storage.put("upload/images.zip", archive);

    let mut req = request("job12", ImportAction::Image, "upload/items.csv");
    req.zip_path = Some("upload/images.zip".into());
    assert_eq!(run(&harness, req).await, JobOutcome::Success);

    let record = harness.records.get(DATASTORE, "abc").unwrap();
    match &record.values["photo"] {
        Value::File(files) => {
            assert_eq!(files.len(), 1);
            assert_eq!(files[0].name, "a.png");
        }
        other => panic!("unexpected value {:?}", other),
    }
    assert!(harness
        .storage
        .get("app_app1/data/datastore_ds1/a.png")
        .is_some());
    assert_eq!(*harness.storage.used.lock().unwrap(), 10);
}

#[tokio::test]
async fn test_image_mode_rejects_non_file_columns() {
    let records = MemoryRecordStore::default();
    records.put(DATASTORE, "abc", &[]);
    let harness = Harness::new(product_schema(), records, MemoryWorkflows::default());
    harness.upload("upload/items.csv", "id,name\nabc,x\n");

    let outcome = run(&harness, request("job13", ImportAction::Image, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::AllFailed);
    assert_eq!(
        harness.error_lines("job13"),
        vec!["Line 2: Only file fields can be imported in image mode".to_string()]
    );
}

#[tokio::test]
async fn test_directories_skipped_when_not_needed() {
    let harness = Harness::new(
        product_schema(),
        MemoryRecordStore::default(),
        MemoryWorkflows::default(),
    );
    harness.upload("upload/items.csv", "id,name\n,A\n");

    let outcome = run(&harness, request("job14", ImportAction::Insert, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::Success);
    assert_eq!(harness.schema.user_lookups(), 0);
    assert_eq!(harness.schema.group_lookups(), 0);
}

#[tokio::test]
async fn test_user_field_loads_user_directory_once() {
    let mut schema = product_schema();
    schema
        .fields
        .push(FieldDefinition::new(DATASTORE, "assignee", FieldType::User));
    let harness = Harness::new(schema, MemoryRecordStore::default(), MemoryWorkflows::default());
    harness.upload("upload/items.csv", "id,name\n,A\n,B\n");

    let outcome = run(&harness, request("job15", ImportAction::Insert, "upload/items.csv")).await;
    assert_eq!(outcome, JobOutcome::Success);
    assert_eq!(harness.schema.user_lookups(), 1);
    assert_eq!(harness.schema.group_lookups(), 0);
}

#[tokio::test]
async fn test_owner_column_loads_group_directory_once() {
    let harness = Harness::new(
        product_schema(),
        MemoryRecordStore::default(),
        MemoryWorkflows::default(),
    );
    let columns: Vec<String> = ["id", "name", "owner"].iter().map(|c| c.to_string()).collect();
    let header = HeaderScan::scan(&columns).unwrap();

    let ctx = SchemaContextLoader::new(harness.schema.clone())
        .load(&request("job16", ImportAction::Insert, "upload/items.csv"), &header, "en")
        .await
        .unwrap();
    assert!(ctx.groups_loaded());
    assert!(!ctx.users_loaded());
    assert_eq!(harness.schema.group_lookups(), 1);
    assert_eq!(harness.schema.user_lookups(), 0);
}
