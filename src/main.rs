use anyhow::{Context, Result};
use clap::Parser;
use server_backup::{
    config, managers, BackupManager, BackupSelection, CodeSource, DriveClient,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "server-backup")]
#[command(about = "MySQL and file backups to cloud storage", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the settings file
    #[arg(short, long, default_value = "backup-config.toml")]
    config: PathBuf,

    /// Backup MySQL databases only
    #[arg(long)]
    mysql: bool,

    /// Backup configured files only
    #[arg(long)]
    files: bool,
}

/// Prompts the operator for the authorization code on first run
struct ConsoleCodeSource;

impl CodeSource for ConsoleCodeSource {
    fn obtain_code(&self, authorize_url: &str) -> Result<String> {
        println!("Visit this URL to authorize access to remote storage:");
        println!();
        println!("  {}", authorize_url);
        println!();
        let code: String = dialoguer::Input::new()
            .with_prompt("Enter the authorization code")
            .interact_text()
            .context("Failed to read authorization code")?;
        Ok(code)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load and validate settings before anything else; a broken settings
    // file is fatal
    let settings = config::load_settings(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;

    // Setup logging with file rotation (must keep guard alive)
    let _log_guard = managers::logging::init_logging(&settings.logging)?;

    let selection = BackupSelection::from_flags(cli.mysql, cli.files);

    // Authentication failure aborts before any backup is attempted
    let mut client = DriveClient::new(settings.remote.clone());
    client
        .authenticate(&ConsoleCodeSource)
        .context("Authentication failed")?;

    let manager = BackupManager::new(settings);
    let report = manager.run(&client, selection)?;

    // Partial or even total backup failure is narrated but does not change
    // the exit code; only fatal errors above do
    if report.all_failed() {
        println!("All backups failed");
    } else {
        println!(
            "Backup completed: {}/{} backup types succeeded",
            report.succeeded(),
            report.attempted()
        );
    }

    Ok(())
}
