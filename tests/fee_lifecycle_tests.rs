// 需要 PostgreSQL: DATABASE_URL=... cargo test -- --ignored
mod common;

use axum::http::{Method, StatusCode};
use common::{money, test_config, TestApp, ADMIN_EMAIL, ADMIN_PASSWORD};
use serde_json::json;
use sqlx::PgPool;

use school_fees::config::{BootstrapAdmin, DemoSeed};
use school_fees::{ensure_bootstrap_admin, seed_demo_data};

async fn admin_app(pool: PgPool) -> (TestApp, String) {
    let admin = BootstrapAdmin {
        email: ADMIN_EMAIL.into(),
        password: ADMIN_PASSWORD.into(),
        name: "Admin User".into(),
    };
    assert!(ensure_bootstrap_admin(&pool, &admin).await.unwrap());

    let app = TestApp::with_pool(pool, test_config());
    let token = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    (app, token)
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn monthly_fee_lifecycle(pool: PgPool) {
    let (app, admin) = admin_app(pool).await;

    // 1. 班级与收费标准
    let (status, class) = app.post("/api/classes", &admin, json!({ "name": "Grade 1" })).await;
    assert_eq!(status, StatusCode::CREATED);
    let class_id = class["data"]["id"].as_i64().unwrap();

    let (status, _) = app.post("/api/classes", &admin, json!({ "name": "Grade 1" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, structure) = app
        .post(
            "/api/fee-structures",
            &admin,
            json!({ "classId": class_id, "tuitionFee": 5000, "labFee": 500 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(money(&structure["data"]["totalMonthlyFee"]), 5500.0);

    // 2. 学生
    let (status, student) = app
        .post(
            "/api/students",
            &admin,
            json!({
                "name": "Alice",
                "fatherName": "Bob",
                "classId": class_id,
                "rollNumber": "G1-001",
                "phoneNumber": "555-0100",
                "tuitionFee": 5000,
                "labFee": 500
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(money(&student["data"]["totalMonthlyFee"]), 5500.0);
    assert_eq!(student["data"]["className"], "Grade 1");
    let student_id = student["data"]["id"].as_i64().unwrap();

    // 3. 生成三月账单, 重复生成只会跳过
    let (status, generated) = app
        .post("/api/fee-records/generate", &admin, json!({ "month": "march", "year": 2025 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(generated["data"]["created"], 1);
    let record = &generated["data"]["records"][0];
    assert_eq!(record["month"], "March");
    assert_eq!(money(&record["totalFee"]), 5500.0);
    assert_eq!(money(&record["balance"]), 5500.0);
    assert_eq!(record["status"], "Pending");
    assert!(record["dueDate"].as_str().unwrap().starts_with("2025-03-10"));
    let record_id = record["id"].as_i64().unwrap();

    let (_, again) = app
        .post("/api/fee-records/generate", &admin, json!({ "month": "March", "year": 2025 }))
        .await;
    assert_eq!(again["data"]["created"], 0);
    assert_eq!(again["data"]["skipped"], 1);
    assert_eq!(again["data"]["skippedRecords"][0]["studentId"], student_id);

    // 4. 分期缴费
    let payment_uri = format!("/api/fee-records/{}/payment", record_id);
    let (status, partial) = app
        .post(&payment_uri, &admin, json!({ "amountPaid": 2000, "paymentMode": "Cash" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&partial["data"]["amountPaid"]), 2000.0);
    assert_eq!(money(&partial["data"]["balance"]), 3500.0);
    assert_eq!(partial["data"]["status"], "Pending");
    assert!(partial["data"]["paymentDate"].is_null());

    let (_, settled) = app
        .post(&payment_uri, &admin, json!({ "amountPaid": 3500, "paymentMode": "Online" }))
        .await;
    assert_eq!(money(&settled["data"]["amountPaid"]), 5500.0);
    assert_eq!(money(&settled["data"]["balance"]), 0.0);
    assert_eq!(settled["data"]["status"], "Paid");
    assert!(settled["data"]["paymentDate"].is_string());

    let (status, _) = app
        .post(&payment_uri, &admin, json!({ "amountPaid": 0, "paymentMode": "Cash" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 5. 追加费用后余额重算, 状态不变
    let (_, extra) = app
        .post(
            &format!("/api/fee-records/{}/add-fees", record_id),
            &admin,
            json!({ "examFee": 300 }),
        )
        .await;
    assert_eq!(money(&extra["data"]["totalFee"]), 5800.0);
    assert_eq!(money(&extra["data"]["balance"]), 300.0);
    assert_eq!(extra["data"]["status"], "Paid");

    // 6. 已缴清的记录不受过期扫描影响
    let (_, sweep) = app.post("/api/fee-records/update-overdue", &admin, json!({})).await;
    assert_eq!(sweep["data"]["count"], 0);

    // 7. 仪表盘
    let (_, stats) = app.get("/api/dashboard/stats", &admin).await;
    assert_eq!(stats["data"]["totalStudents"], 1);
    assert_eq!(stats["data"]["paymentStatusBreakdown"]["paid"], 1);

    let (_, modes) = app.get("/api/dashboard/payment-modes?month=March&year=2025", &admin).await;
    assert_eq!(modes["data"]["summary"]["totalTransactions"], 1);

    // 8. 班级下有学生时不能删除
    let (status, body) = app
        .request(Method::DELETE, &format!("/api/classes/{}", class_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Cannot delete class with students"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn overdue_sweep_only_touches_past_due_pending_records(pool: PgPool) {
    let (app, admin) = admin_app(pool).await;

    let (_, class) = app.post("/api/classes", &admin, json!({ "name": "Grade 2" })).await;
    let class_id = class["data"]["id"].as_i64().unwrap();
    app.post(
        "/api/students",
        &admin,
        json!({
            "name": "Carol",
            "fatherName": "Dan",
            "classId": class_id,
            "rollNumber": "G2-001",
            "phoneNumber": "555-0101",
            "tuitionFee": 1000
        }),
    )
    .await;

    app.post("/api/fee-records/generate", &admin, json!({ "month": "January", "year": 2020 }))
        .await;
    app.post(
        "/api/fee-records/generate",
        &admin,
        json!({ "month": "January", "year": 2099, "classId": class_id }),
    )
    .await;

    let (_, first) = app.post("/api/fee-records/update-overdue", &admin, json!({})).await;
    assert_eq!(first["data"]["count"], 1);

    let (_, second) = app.post("/api/fee-records/update-overdue", &admin, json!({})).await;
    assert_eq!(second["data"]["count"], 0);

    // 部分缴费不会把 Overdue 改回 Pending
    let (_, overdue) = app.get("/api/fee-records/overdue", &admin).await;
    let record_id = overdue["data"][0]["id"].as_i64().unwrap();
    let (_, paid) = app
        .post(
            &format!("/api/fee-records/{}/payment", record_id),
            &admin,
            json!({ "amountPaid": 400, "paymentMode": "Cheque" }),
        )
        .await;
    assert_eq!(paid["data"]["status"], "Overdue");
    assert_eq!(money(&paid["data"]["balance"]), 600.0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn attendance_is_upserted_per_student_and_day(pool: PgPool) {
    let (app, admin) = admin_app(pool).await;

    let (_, class) = app.post("/api/classes", &admin, json!({ "name": "Grade 3" })).await;
    let class_id = class["data"]["id"].as_i64().unwrap();
    let (_, student) = app
        .post(
            "/api/students",
            &admin,
            json!({
                "name": "Eve",
                "fatherName": "Frank",
                "classId": class_id,
                "rollNumber": "G3-001",
                "phoneNumber": "555-0102",
                "tuitionFee": 1000
            }),
        )
        .await;
    let student_id = student["data"]["id"].as_i64().unwrap();

    let (status, _) = app
        .post(
            "/api/teachers",
            &admin,
            json!({
                "email": "teacher1@school.com",
                "password": "teacher123",
                "name": "John Smith",
                "employeeId": "T001",
                "phoneNumber": "555-0200"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let teacher = app.login("teacher1@school.com", "teacher123").await;

    // 管理员不能标记考勤
    let (status, _) = app
        .post(
            "/api/attendance/mark",
            &admin,
            json!({ "studentId": student_id, "date": "2025-03-03", "status": "PRESENT" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for status in ["ABSENT", "PRESENT"] {
        let (code, _) = app
            .post(
                "/api/attendance/mark",
                &teacher,
                json!({ "studentId": student_id, "date": "2025-03-03", "status": status }),
            )
            .await;
        assert_eq!(code, StatusCode::CREATED);
    }

    let (status, _) = app
        .post(
            "/api/attendance/mark",
            &teacher,
            json!({ "studentId": student_id, "date": "2025-03-03", "status": "LATE" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, bulk) = app
        .post(
            "/api/attendance/bulk-mark",
            &teacher,
            json!({
                "classId": class_id,
                "date": "2025-03-04",
                "attendanceRecords": [
                    { "studentId": student_id, "status": "ABSENT" },
                    { "studentId": student_id },
                    { "status": "PRESENT" },
                    { "studentId": student_id, "status": "MAYBE" }
                ]
            }),
        )
        .await;
    assert_eq!(bulk["data"]["count"], 1);

    // 类型错误的条目逐条跳过, 不影响同批次的合法条目
    let (status, bulk) = app
        .post(
            "/api/attendance/bulk-mark",
            &teacher,
            json!({
                "date": "2025-03-04",
                "attendanceRecords": [
                    { "studentId": student_id, "status": "PRESENT" },
                    { "studentId": "abc", "status": "PRESENT" },
                    { "studentId": student_id, "status": 1 }
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bulk["data"]["count"], 1);
    assert_eq!(bulk["data"]["records"][0]["status"], "PRESENT");

    let (_, summary) = app
        .get(&format!("/api/attendance/student/{}/summary", student_id), &teacher)
        .await;
    assert_eq!(summary["data"]["summary"]["totalDays"], 2);
    assert_eq!(summary["data"]["summary"]["presentDays"], 2);
    assert_eq!(summary["data"]["summary"]["attendancePercentage"], 100.0);

    let (_, day) = app
        .get(&format!("/api/attendance/class/{}/date/2025-03-05", class_id), &teacher)
        .await;
    assert!(day["data"][0]["attendance"].is_null());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn updates_recompute_totals_and_empty_classes_can_be_deleted(pool: PgPool) {
    let (app, admin) = admin_app(pool).await;

    let (_, class) = app.post("/api/classes", &admin, json!({ "name": "Grade 4" })).await;
    let class_id = class["data"]["id"].as_i64().unwrap();

    // 收费标准: 部分更新后总额按六个分项重算
    let (_, structure) = app
        .post(
            "/api/fee-structures",
            &admin,
            json!({ "classId": class_id, "tuitionFee": 2000, "libraryFee": 100 }),
        )
        .await;
    let structure_id = structure["data"]["id"].as_i64().unwrap();
    let structure_uri = format!("/api/fee-structures/{}", structure_id);

    let (status, updated) = app.put(&structure_uri, &admin, json!({ "sportsFee": 250 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&updated["data"]["totalMonthlyFee"]), 2350.0);
    let (_, stored) = app.get(&structure_uri, &admin).await;
    assert_eq!(money(&stored["data"]["tuitionFee"]), 2000.0);
    assert_eq!(money(&stored["data"]["totalMonthlyFee"]), 2350.0);

    // 学生
    let (_, student) = app
        .post(
            "/api/students",
            &admin,
            json!({
                "name": "Grace",
                "fatherName": "Hank",
                "classId": class_id,
                "rollNumber": "G4-001",
                "phoneNumber": "555-0103",
                "tuitionFee": 2000,
                "labFee": 300
            }),
        )
        .await;
    let student_uri = format!("/api/students/{}", student["data"]["id"].as_i64().unwrap());

    let (status, updated) = app.put(&student_uri, &admin, json!({ "labFee": 450, "examFee": 50 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&updated["data"]["totalMonthlyFee"]), 2500.0);
    let (_, stored) = app.get(&student_uri, &admin).await;
    assert_eq!(money(&stored["data"]["labFee"]), 450.0);
    assert_eq!(money(&stored["data"]["totalMonthlyFee"]), 2500.0);

    // 超出金额列范围的输入返回 400
    let (status, body) = app.put(&student_uri, &admin, json!({ "tuitionFee": 5.0e28 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("tuitionFee"));

    // dueDate 可以是纯日期
    let (status, generated) = app
        .post(
            "/api/fee-records/generate",
            &admin,
            json!({ "month": "April", "year": 2025, "dueDate": "2025-04-15" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let record = &generated["data"]["records"][0];
    assert!(record["dueDate"].as_str().unwrap().starts_with("2025-04-15"));
    assert_eq!(money(&record["totalFee"]), 2500.0);

    let (status, _) = app
        .post(
            &format!("/api/fee-records/{}/payment", record["id"].as_i64().unwrap()),
            &admin,
            json!({ "amountPaid": 5.0e28, "paymentMode": "Cash" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 没有学生的班级可以删除
    let (_, empty) = app.post("/api/classes", &admin, json!({ "name": "Grade 5" })).await;
    let empty_uri = format!("/api/classes/{}", empty["data"]["id"].as_i64().unwrap());
    let (status, body) = app.request(Method::DELETE, &empty_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Class deleted successfully");
    let (status, _) = app.get(&empty_uri, &admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn demo_seed_creates_a_class_with_an_assigned_teacher(pool: PgPool) {
    let (app, admin) = admin_app(pool.clone()).await;

    let seed = DemoSeed {
        teacher_email: "teacher1@school.com".into(),
        teacher_password: "password123".into(),
    };
    assert!(seed_demo_data(&pool, &seed).await.unwrap());
    assert!(!seed_demo_data(&pool, &seed).await.unwrap());

    let (_, structures) = app.get("/api/fee-structures", &admin).await;
    assert_eq!(structures["data"].as_array().unwrap().len(), 1);
    assert_eq!(money(&structures["data"][0]["totalMonthlyFee"]), 7000.0);

    let teacher = app.login("teacher1@school.com", "password123").await;
    let (status, classes) = app.get("/api/teachers/my-classes", &teacher).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(classes["data"][0]["className"], "Class 1");
    assert_eq!(classes["data"][0]["isPrimary"], true);
}
