// src/main.rs
#[tokio::main]
async fn main() {
    if let Err(e) = school_fees::run().await {
        // 日志可能尚未初始化, 同时输出到 stderr
        eprintln!("startup failed: {}", e);
        tracing::error!("startup failed: {}", e);
        std::process::exit(1);
    }
}
