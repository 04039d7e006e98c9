#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = gradeflow::run_worker().await {
        eprintln!("gradeflow-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
