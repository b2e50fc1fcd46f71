use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use firelit_rag::config::api_key_from_env;
use firelit_rag::embeddings::openai::OpenAIEmbeddingsConfig;
use firelit_rag::{
    AppConfig, ChatEngine, ChatMessage, ChatRole, EngineSettings, Error, KnowledgeBase,
    OpenAIEmbeddings, OpenAIProvider, RetryPolicy, RetryingProvider,
};

const TITLE: &str = "💬 불쏘시개 상권분석 AI";
const WAITING: &str = "응답 생성중...";

#[derive(Parser)]
#[command(name = "firelit")]
#[command(about = "Market-analysis chat for prospective restaurant owners", long_about = None)]
struct Cli {
    /// JSON config file (defaults to $FIRELIT_CONFIG or the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the knowledge-base CSV path
    #[arg(long)]
    csv: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Start-up failures map to distinct codes so a supervisor can tell them apart.
fn exit_code(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<Error>() {
        Some(Error::Configuration(_)) => 1,
        Some(Error::DataSource(_)) => 2,
        Some(Error::EmbeddingService(_)) => 3,
        _ => 1,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let api_key = api_key_from_env()?;
    println!("API Key is set!");

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(csv) = cli.csv {
        config.knowledge_base.csv_path = csv;
    }

    let embeddings = OpenAIEmbeddings::new(
        OpenAIEmbeddingsConfig {
            provider: config.completion.provider.clone(),
            model: config.knowledge_base.embedding_model.clone(),
            dimension: config.knowledge_base.dimension,
            batch_size: config.knowledge_base.batch_size,
            timeout: config.completion.timeout(),
        },
        api_key.clone(),
    )?;
    let knowledge = Arc::new(KnowledgeBase::from_config(
        &config.knowledge_base,
        Arc::new(embeddings),
    ));

    // Build before the first prompt so a broken data file fails fast.
    let index = knowledge.index().await?;
    tracing::info!(
        path = %knowledge.csv_path().display(),
        documents = index.len(),
        "Knowledge base ready"
    );

    let completion = OpenAIProvider::new(
        config.completion.provider.clone(),
        api_key,
        config.completion.timeout(),
    )?;
    let provider = RetryingProvider::new(
        Arc::new(completion),
        RetryPolicy::from(&config.retry),
        config.completion.timeout(),
    );
    let engine = ChatEngine::new(
        knowledge,
        Arc::new(provider),
        EngineSettings::from_config(&config),
    );

    repl(&engine).await
}

async fn repl(engine: &ChatEngine) -> Result<()> {
    let mut session_id = engine.start_session();
    println!("{}", TITLE);
    print_history(&engine.get_history(&session_id).await?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };

        let outcome = match line.trim() {
            "/quit" | "/exit" => break,
            "/reset" => {
                engine.end_session(&session_id);
                session_id = engine.start_session();
                print_history(&engine.get_history(&session_id).await?);
                continue;
            }
            "/retry" => {
                println!("{}", WAITING);
                engine.retry_last_turn(&session_id).await
            }
            _ => {
                if !line.trim().is_empty() {
                    println!("{}", WAITING);
                }
                engine.on_user_turn(&session_id, &line).await
            }
        };

        match outcome {
            Ok(Some(reply)) => print_message(&reply),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Turn failed");
                println!("assistant: {}", e.user_message());
            }
        }
    }

    engine.end_session(&session_id);
    Ok(())
}

/// Everything but the system prompt.
fn print_history(history: &[ChatMessage]) {
    for message in history.iter().skip(1) {
        print_message(message);
    }
}

fn print_message(message: &ChatMessage) {
    let speaker = match message.role {
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::System => return,
    };
    println!("{}: {}", speaker, message.content);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_errors_map_to_distinct_exit_codes() {
        let code = |e: Error| exit_code(&anyhow::Error::from(e));
        assert_eq!(code(Error::Configuration("OPENAI_API_KEY is not set".into())), 1);
        assert_eq!(code(Error::DataSource("missing".into())), 2);
        assert_eq!(code(Error::EmbeddingService("down".into())), 3);
    }

    #[test]
    fn test_context_wrapped_error_keeps_its_code() {
        let err = anyhow::Error::from(Error::DataSource("missing".into())).context("startup");
        assert_eq!(exit_code(&err), 2);
        assert_eq!(exit_code(&anyhow::anyhow!("unrelated")), 1);
    }
}
