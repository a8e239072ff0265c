#[tokio::main]
async fn main() {
    if let Err(err) = cs_api::run().await {
        eprintln!("cs-api failed: {err}");
        std::process::exit(1);
    }
}
