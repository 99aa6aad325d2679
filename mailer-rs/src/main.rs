//! CLI for sending and previewing transactional emails
//!
//! # Usage
//!
//! ```bash
//! # Send the welcome email
//! mailer-rs --config mailer.toml send --to alice@example.com --template user_welcome \
//!     --data '{"id": 42, "name": "Alice", "activation_token": "Y3QMGX3PJ3WLRL2YRTQGQ6KRHU"}'
//!
//! # Render without sending
//! mailer-rs render --template token_activation --data-file payload.json
//!
//! # List available templates
//! mailer-rs templates
//! ```

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use mailer_rs::config::LoggingConfig;
use mailer_rs::mime::{compose, ComposedMessage};
use mailer_rs::smtp::DeliveryOutcome;
use mailer_rs::templates::{TemplateRegistry, TemplateStore};
use mailer_rs::utils::Mailbox;
use mailer_rs::{Config, Mailer, SendRequest};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "mailer-rs")]
#[command(about = "Send templated transactional emails over SMTP", long_about = None)]
struct Cli {
    /// Configuration file (TOML); MAILER__* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template and deliver it
    Send {
        /// Recipient address
        #[arg(long)]
        to: String,
        #[command(flatten)]
        input: TemplateInput,
    },
    /// Render a template and print the composed message
    Render {
        /// Recipient address used for the To header
        #[arg(long, default_value = "recipient@example.com")]
        to: String,
        #[command(flatten)]
        input: TemplateInput,
    },
    /// List available templates
    Templates,
}

#[derive(Args)]
struct TemplateInput {
    /// Template bundle name
    #[arg(long)]
    template: String,
    /// Payload as inline JSON
    #[arg(long, conflicts_with = "data_file")]
    data: Option<String>,
    /// Payload read from a JSON file
    #[arg(long)]
    data_file: Option<PathBuf>,
}

impl TemplateInput {
    fn payload(&self) -> anyhow::Result<serde_json::Value> {
        let raw = match (&self.data, &self.data_file) {
            (Some(data), _) => data.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {:?}", path))?,
            (None, None) => return Ok(serde_json::json!({})),
        };

        let payload: serde_json::Value =
            serde_json::from_str(&raw).context("Payload is not valid JSON")?;
        if !payload.is_object() {
            bail!("Payload must be a JSON object");
        }
        Ok(payload)
    }
}

/// Render and compose offline; no relay or TLS setup is involved
fn preview(
    config: &Config,
    to: &str,
    template: &str,
    payload: &serde_json::Value,
) -> anyhow::Result<ComposedMessage> {
    let templates = TemplateRegistry::from_config(&config.templates)?;
    let sender: Mailbox = config.smtp.sender.parse()?;
    let recipient: Mailbox = to.parse()?;

    let rendered = templates.render(template, payload)?;
    Ok(compose(&sender, &recipient, rendered)?)
}

fn init_logging(logging: &LoggingConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mailer_rs={}", logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.logging);

    info!("Starting mailer-rs v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Send { to, input } => {
            let mailer = Mailer::from_config(&config).context("Failed to initialize mailer")?;
            let request = SendRequest::new(&to, &input.template, input.payload()?);
            match mailer.deliver(&request).await {
                DeliveryOutcome::Delivered { attempts } => {
                    println!("✓ Sent {} to {} ({} attempt(s))", input.template, to, attempts);
                }
                DeliveryOutcome::Failed(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to send {} to {}", input.template, to));
                }
            }
        }
        Commands::Render { to, input } => {
            let message = preview(&config, &to, &input.template, &input.payload()?)?;

            println!("Subject: {}", message.subject);
            println!("\n--- text/plain ---\n{}", message.plain_body);
            println!("\n--- text/html ---\n{}", message.html_body);
            println!("\n({} bytes, Message-ID <{}>)", message.size(), message.message_id);
        }
        Commands::Templates => {
            let templates = TemplateRegistry::from_config(&config.templates)?;
            for name in templates.names() {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
