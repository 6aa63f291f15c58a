use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use raices_notifier_rs::{
    JsonRepo, RaicesClient, Syncer, TelegramNotifier, DEFAULT_BASE_URL, DEFAULT_TELEGRAM_BASE_URL,
};

#[derive(Parser, Debug)]
#[command(
    name = "raices-notifier",
    about = "Forward new Raíces portal messages to Telegram chats (unofficial)"
)]
struct Cli {
    #[arg(long, env = "RAICES_BASE_URL", default_value = DEFAULT_BASE_URL)]
    raices_url: String,

    #[arg(long, env = "TELEGRAM_BASE_URL", default_value = DEFAULT_TELEGRAM_BASE_URL)]
    telegram_url: String,

    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    bot_token: String,

    #[arg(long, env = "RAICES_CHATS_FILE", default_value = "chats.json",
          help = "JSON file with the chats to notify and their watermarks")]
    chats_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let repo = JsonRepo::new(&cli.chats_file);
    let client = RaicesClient::new(&cli.raices_url)?;
    let notifier = TelegramNotifier::new(&cli.telegram_url, &cli.bot_token)?;

    let syncer = Syncer::new(repo, client, notifier);
    syncer.sync_all().await?;

    info!("sync pass finished");
    Ok(())
}
