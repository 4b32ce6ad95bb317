//! Fetch one report: `WEERLIVE_API_KEY=... cargo run --example weather`

use weerlive_core::Weerlive;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let api_key = std::env::var("WEERLIVE_API_KEY").unwrap_or_default();
    let client = Weerlive::new(api_key, 52.1009166, 5.6462914);

    let weather = client.weather().await?;
    println!("{weather:#?}");

    Ok(())
}
