#[tokio::main]
async fn main() {
    if let Err(e) = medchat::run().await {
        eprintln!("medchat: {e}");
        std::process::exit(1);
    }
}
