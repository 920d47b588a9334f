#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = exam_lifecycle::run_worker().await {
        eprintln!("exam-lifecycle-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
