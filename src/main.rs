#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = exam_lifecycle::run().await {
        eprintln!("exam-lifecycle fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
