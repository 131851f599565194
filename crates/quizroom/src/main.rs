use quizroom::{QuizError, QuizServer, ServerConfig};
use quizroom_session::SharedSecretAuthenticator;

#[tokio::main]
async fn main() -> Result<(), QuizError> {
    let config = ServerConfig::from_env()?;
    quizroom::init_tracing(&config.log_filter);
    tracing::info!(?config, "starting quizroom");

    let server = QuizServer::builder()
        .configure(&config)
        .build(SharedSecretAuthenticator::new(config.operator_secret.clone()))
        .await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown requested");
        })
        .await
}
