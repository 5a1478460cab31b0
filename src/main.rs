use std::path::PathBuf;

use clap::{Parser, Subcommand};
use paperdesk_lib::settings::{get_settings_path, load_settings_from, save_settings};

/// Research paper assistant: metadata, summaries, keywords, speech and chat
#[derive(Parser, Debug)]
#[command(name = "paperdesk")]
struct Cli {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "PAPERDESK_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "5000", env = "PAPERDESK_PORT")]
    port: u16,

    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a PDF and print metadata, summary and keywords
    Analyze {
        file: PathBuf,

        /// Also synthesize the summary to this MP3 file
        #[arg(long)]
        speech_out: Option<PathBuf>,
    },
    /// Print the effective settings
    Settings {
        /// Write them to the settings file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings_path = cli.settings.clone().unwrap_or_else(get_settings_path);
    let settings = load_settings_from(&settings_path);

    match cli.command {
        Some(Command::Analyze { file, speech_out }) => {
            if let Err(e) =
                paperdesk_lib::analyze_file(&file, &settings, speech_out.as_deref()).await
            {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Some(Command::Settings { save }) => {
            match serde_json::to_string_pretty(&settings) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
            if save {
                if let Err(e) = save_settings(&settings, &settings_path) {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
                println!("Saved to {}", settings_path.display());
            }
        }
        None => {
            let addr = format!("{}:{}", cli.host, cli.port);
            if let Err(e) = paperdesk_lib::run(&addr, settings).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}
