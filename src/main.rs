use std::sync::Arc;

use conclave::{CouncilConfig, GatewayConfig, HttpBackendClient, ModelRef, PricingEstimator, Session};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    dotenvy::dotenv().ok();

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "What is the capital of France?".to_string());

    let gateway = GatewayConfig::from_env()
        .ok_or_else(|| anyhow::anyhow!("OPENROUTER_API_KEY is not set"))?;

    let client: Arc<dyn conclave::BackendClient> = Arc::new(HttpBackendClient::with_identity(
        gateway.base_url,
        gateway.api_key,
        gateway.referer,
        gateway.title,
    ));

    let council = CouncilConfig {
        models: vec![
            ModelRef::bare("openai/gpt-4o-mini"),
            ModelRef::bare("anthropic/claude-3-5-sonnet"),
        ],
        system: None,
        synthesizer: None,
        rounds: 1,
        defaults: Default::default(),
    };

    let session = Session::new(client, PricingEstimator::default());
    let response = session.query_with_consensus(&prompt, &council).await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
