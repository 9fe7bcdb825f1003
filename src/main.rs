use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use oxide_session::config::Settings;
use oxide_session::session::{Session, SqliteSession};
use oxide_session::Reference;
use regex::Regex;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "oxide-session")]
#[command(about = "Inspect a persisted session and its entity cache")]
struct Cli {
    /// Session file to open instead of the configured one
    #[arg(long)]
    session: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Datacenter binding, key fingerprint, cache size and API credential status
    Stats,
    /// Resolve a phone, username, id or display name to an input peer
    Resolve {
        /// The reference to look up
        reference: String,
    },
    /// List every cached entity
    Entities,
}

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    auth_key: Regex,
    api_hash: Regex,
    phone: Regex,
    phone_field: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            auth_key: Regex::new(r"\b[0-9a-fA-F]{64,}\b")?,
            api_hash: Regex::new(r#"(?i)(api_hash["'\s]*[=:]\s*["']?)[0-9a-f]{32}"#)?,
            phone: Regex::new(r"\+[0-9][0-9\s()-]{5,}[0-9]")?,
            phone_field: Regex::new(r#"(?i)(phone["'\s]*[=:]\s*["']?)\+?[0-9]+"#)?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = self
            .auth_key
            .replace_all(input, "[AUTH_KEY]")
            .to_string();
        output = self
            .api_hash
            .replace_all(&output, "${1}[MASKED]")
            .to_string();
        output = self
            .phone_field
            .replace_all(&output, "${1}[PHONE]")
            .to_string();
        output = self.phone.replace_all(&output, "[PHONE]").to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length; the redacted text may be shorter or longer.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenv().ok();

    let cli = Cli::parse();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().context("compiling redaction patterns")?);
    init_logging(patterns);

    let settings = init_settings();
    let path = cli.session.unwrap_or_else(|| settings.session_path.clone());

    let mut session = SqliteSession::new(&path);
    session
        .load()
        .await
        .with_context(|| format!("loading session {}", path.display()))?;

    let outcome = run(&session, &settings, cli.command);

    if let Err(e) = session.close().await {
        error!("Failed to close session: {}", e);
    }
    outcome
}

fn run(session: &SqliteSession, settings: &Settings, command: Command) -> Result<()> {
    let mut stdout = io::stdout().lock();
    match command {
        Command::Stats => {
            writeln!(stdout, "session:  {}", session.path().display())?;
            match session.dc() {
                Some(dc) => writeln!(
                    stdout,
                    "dc:       {} ({}:{})",
                    dc.dc_id, dc.server_address, dc.port
                )?,
                None => writeln!(stdout, "dc:       unset")?,
            }
            match session.auth_key() {
                Some(key) => writeln!(stdout, "auth key: {}", key.fingerprint())?,
                None => writeln!(stdout, "auth key: none (unauthenticated)")?,
            }
            writeln!(stdout, "entities: {}", session.entities().len())?;
            match settings.api_id {
                Some(api_id) if settings.has_api_credentials() => {
                    writeln!(stdout, "api:      id {api_id}, hash configured")?;
                }
                _ => writeln!(stdout, "api:      credentials not configured")?,
            }
        }
        Command::Resolve { reference } => {
            let peer = session.get_input_entity(&Reference::from(reference))?;
            writeln!(stdout, "{}", serde_json::to_string_pretty(&peer)?)?;
        }
        Command::Entities => {
            for record in session.entities().records() {
                writeln!(
                    stdout,
                    "{:>20}  {:<24}  {:<16}  {}",
                    record.id,
                    record.username.as_deref().unwrap_or("-"),
                    record.phone.as_deref().unwrap_or("-"),
                    record.name.as_deref().unwrap_or("-"),
                )?;
            }
        }
    }
    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Settings {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> RedactionPatterns {
        RedactionPatterns::new().unwrap_or_else(|e| panic!("patterns should compile: {e}"))
    }

    #[test]
    fn test_auth_key_hex_is_masked() {
        let line = format!("key={}", "ab".repeat(64));
        assert_eq!(patterns().redact(&line), "key=[AUTH_KEY]");
    }

    #[test]
    fn test_api_hash_is_masked() {
        let line = "api_hash=0123456789abcdef0123456789abcdef";
        assert_eq!(patterns().redact(line), "api_hash=[MASKED]");
    }

    #[test]
    fn test_phone_numbers_are_masked() {
        let p = patterns();
        assert_eq!(p.redact("login as +1 (555) 000-1234"), "login as [PHONE]");
        assert_eq!(p.redact(r#"phone: "15550001234""#), r#"phone: "[PHONE]""#);
    }

    #[test]
    fn test_marked_ids_survive() {
        let line = "Indexed peer -1000000000004";
        assert_eq!(patterns().redact(line), line);
    }
}
