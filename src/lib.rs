// src/lib.rs
use axum::{
    http::{Method, Request},
    routing::{delete, get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod attendance;
pub mod auth;
pub mod config;
pub mod error;
pub mod fees;
pub mod handlers;
pub mod models;
pub mod reports;
pub mod response;
pub mod validation;

pub use error::{AppError, StartupError};

use auth::JwtKeys;
use config::{BootstrapAdmin, Config, DemoSeed};
use fees::FeeComponents;
use rust_decimal::Decimal;
use handlers::{attendance as att, auth as auth_h, classes, dashboard, fee_records, fee_structures, health, students, teachers};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub jwt: JwtKeys,
}

impl AppState {
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt: JwtKeys::new(&config.jwt_secret, config.jwt_expires_hours),
        }
    }
}

pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,school_fees=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let api = Router::new()
        // 认证
        .route("/auth/login", post(auth_h::login_handler))
        .route("/auth/register", post(auth_h::register_handler))
        .route("/auth/logout", post(auth_h::logout_handler))
        .route("/auth/profile", get(auth_h::profile_handler))
        .route("/auth/change-password", post(auth_h::change_password_handler))
        // 班级
        .route("/classes", get(classes::list_classes).post(classes::create_class))
        .route(
            "/classes/:id",
            get(classes::get_class).put(classes::update_class).delete(classes::delete_class),
        )
        // 学生
        .route("/students", get(students::list_students).post(students::create_student))
        .route(
            "/students/:id",
            get(students::get_student)
                .put(students::update_student)
                .delete(students::deactivate_student),
        )
        .route("/students/:id/permanent", delete(students::delete_student_permanently))
        // 收费标准
        .route(
            "/fee-structures",
            get(fee_structures::list_fee_structures).post(fee_structures::create_fee_structure),
        )
        .route(
            "/fee-structures/:id",
            get(fee_structures::get_fee_structure)
                .put(fee_structures::update_fee_structure)
                .delete(fee_structures::delete_fee_structure),
        )
        .route("/fee-structures/class/:class_id", get(fee_structures::get_fee_structure_by_class))
        // 费用记录
        .route("/fee-records", get(fee_records::list_fee_records))
        .route("/fee-records/overdue", get(fee_records::list_overdue))
        .route("/fee-records/pending", get(fee_records::list_pending))
        .route("/fee-records/generate", post(fee_records::generate_fee_records))
        .route("/fee-records/update-overdue", post(fee_records::mark_overdue))
        .route("/fee-records/:id", get(fee_records::get_fee_record))
        .route("/fee-records/:id/payment", post(fee_records::record_payment))
        .route("/fee-records/:id/add-fees", post(fee_records::add_fees))
        .route("/fee-records/:id/status", put(fee_records::update_status))
        // 考勤
        .route("/attendance", get(att::list_attendance).post(att::mark_attendance))
        .route("/attendance/mark", post(att::mark_attendance))
        .route("/attendance/bulk-mark", post(att::bulk_mark_attendance))
        .route("/attendance/:id", delete(att::delete_attendance))
        .route("/attendance/class/:class_id/date/:date", get(att::class_attendance_for_date))
        .route("/attendance/class/:class_id/report", get(att::class_attendance_report))
        .route("/attendance/student/:student_id/summary", get(att::student_attendance_summary))
        // 教师
        .route("/teachers", get(teachers::list_teachers).post(teachers::create_teacher))
        .route("/teachers/my-classes", get(teachers::my_classes))
        .route(
            "/teachers/:id",
            get(teachers::get_teacher)
                .put(teachers::update_teacher)
                .delete(teachers::deactivate_teacher),
        )
        .route("/teachers/:id/assign-class", post(teachers::assign_class))
        .route("/teachers/:id/remove-class/:class_id", delete(teachers::remove_class))
        .route("/teachers/:id/classes", get(teachers::teacher_classes))
        // 仪表盘
        .route("/dashboard/stats", get(dashboard::stats))
        .route("/dashboard/monthly-trend", get(dashboard::monthly_trend))
        .route("/dashboard/class-wise", get(dashboard::class_wise))
        .route("/dashboard/payment-modes", get(dashboard::payment_modes));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %uuid::Uuid::new_v4(),
                )
            }),
        )
        .layer(cors)
}

/// 空库时创建初始管理员
pub async fn ensure_bootstrap_admin(db: &PgPool, admin: &BootstrapAdmin) -> Result<bool, AppError> {
    let (users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await?;
    if users > 0 {
        return Ok(false);
    }

    let password_hash = auth::hash_password(&admin.password)?;
    sqlx::query(
        "INSERT INTO users (email, password_hash, name, role, is_active)
         VALUES ($1, $2, $3, 'ADMIN', TRUE)
         ON CONFLICT (email) DO NOTHING",
    )
    .bind(&admin.email)
    .bind(password_hash)
    .bind(&admin.name)
    .execute(db)
    .await?;

    tracing::info!(email = %admin.email, "bootstrap admin created");
    Ok(true)
}

/// 没有任何班级时写入演示数据; 已有数据则什么都不做
pub async fn seed_demo_data(db: &PgPool, seed: &DemoSeed) -> Result<bool, AppError> {
    let (classes,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM classes")
        .fetch_one(db)
        .await?;
    if classes > 0 {
        return Ok(false);
    }

    let fees = FeeComponents {
        tuition_fee: Decimal::from(5000),
        lab_fee: Decimal::from(500),
        library_fee: Decimal::from(300),
        sports_fee: Decimal::from(200),
        exam_fee: Decimal::from(1000),
        other_fee: Decimal::ZERO,
    };
    let password_hash = auth::hash_password(&seed.teacher_password)?;

    let mut tx = db.begin().await?;

    // --- 1. 班级与收费标准 ---
    let (class_id,): (i32,) = sqlx::query_as(
        "INSERT INTO classes (name, description) VALUES ('Class 1', 'First Grade') RETURNING id",
    )
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO fee_structures (
            class_id, tuition_fee, lab_fee, library_fee, sports_fee, exam_fee, other_fee, total_monthly_fee
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(class_id)
    .bind(fees.tuition_fee)
    .bind(fees.lab_fee)
    .bind(fees.library_fee)
    .bind(fees.sports_fee)
    .bind(fees.exam_fee)
    .bind(fees.other_fee)
    .bind(fees.total())
    .execute(&mut *tx)
    .await?;

    // --- 2. 任课教师; 账号或工号已存在时跳过 ---
    let user: Option<(i32,)> = sqlx::query_as(
        "INSERT INTO users (email, password_hash, name, role, is_active)
         VALUES ($1, $2, 'Teacher One', 'TEACHER', TRUE)
         ON CONFLICT (email) DO NOTHING
         RETURNING id",
    )
    .bind(&seed.teacher_email)
    .bind(password_hash)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some((user_id,)) = user {
        let teacher: Option<(i32,)> = sqlx::query_as(
            "INSERT INTO teachers (user_id, employee_id, phone_number, address, qualification)
             VALUES ($1, 'T001', '1234567890', '123 School Street', 'B.Ed')
             ON CONFLICT (employee_id) DO NOTHING
             RETURNING id",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((teacher_id,)) = teacher {
            sqlx::query("INSERT INTO class_teachers (teacher_id, class_id, is_primary) VALUES ($1, $2, TRUE)")
                .bind(teacher_id)
                .bind(class_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    tracing::info!(class_id, teacher = %seed.teacher_email, "demo data seeded");
    Ok(true)
}

pub async fn run() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    tracing::info!("✅ database connected");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("✅ migrations applied");

    if let Some(admin) = &config.bootstrap_admin {
        ensure_bootstrap_admin(&pool, admin)
            .await
            .map_err(|e| StartupError::Bootstrap(e.to_string()))?;
    }
    if let Some(seed) = &config.demo_seed {
        seed_demo_data(&pool, seed)
            .await
            .map_err(|e| StartupError::Bootstrap(e.to_string()))?;
    }

    let app = build_router(AppState::new(pool, &config));

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("🚀 server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
