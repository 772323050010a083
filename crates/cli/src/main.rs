use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use socialmarket_auth::{
    session_store::default_session_id, AuthMode, CredentialStore, Credentials, MemoryStore, Provider,
    SessionFileStore,
};
use socialmarket_client::{Backend, CampaignBrief, CampaignClient, CampaignResponse};
use socialmarket_config::{Config, StoreKind};
use socialmarket_core::{Effect, Outcome, Prompt, Session};

#[derive(Parser)]
#[command(
    name = "socialmarket",
    about = "Social media campaign copy for UK small businesses",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL (overrides config and SOCIALMARKET_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Session id the stored keys belong to (defaults to this shell)
    #[arg(long, global = true)]
    session: Option<String>,

    /// Where keys live: `file` (this shell session) or `memory` (this run only)
    #[arg(long, global = true)]
    store: Option<StoreKind>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a campaign from a brief file (TOML or JSON)
    Generate {
        brief: PathBuf,
        /// Also generate an image
        #[arg(long)]
        image: bool,
        /// Use the free tier without asking, when available
        #[arg(long)]
        free: bool,
    },
    /// Manage the API keys for this session
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
    /// Show the current auth mode and free tier quota
    Status,
    /// Check that the backend is up
    Health,
    /// Show current configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Enter or replace the key pair
    Set {
        #[arg(long)]
        anthropic: Option<String>,
        #[arg(long)]
        openai: Option<String>,
    },
    /// Show the stored keys (masked unless --reveal)
    Show {
        #[arg(long)]
        reveal: bool,
    },
    /// Forget the stored keys
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("socialmarket=info".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(id) = &cli.session {
        config.session.id = Some(id.clone());
    }
    if let Some(store) = cli.store {
        config.session.store = store;
    }

    let backend = CampaignClient::from_config(&config);

    match cli.command {
        Commands::Generate { brief, image, free } => {
            let brief = load_brief(&brief)?;
            let mut session = Session::start(Box::new(backend), open_store(&config));
            generate(&mut session, &brief, image, free).await?;
        }
        Commands::Keys { action } => {
            let mut session = Session::start(Box::new(backend), open_store(&config));
            keys(&mut session, action)?;
        }
        Commands::Status => {
            let mut session = Session::start(Box::new(backend), open_store(&config));
            println!("Mode: {}", session.mode());
            match session.refresh_free_tier().await {
                Some(tier) => println!("Free tier: {} of {} left today", tier.remaining, tier.limit),
                None => println!("Free tier: unavailable"),
            }
        }
        Commands::Health => {
            if backend.health().await {
                println!("{} is healthy", backend.base_url());
            } else {
                anyhow::bail!("{} is not responding", backend.base_url());
            }
        }
        Commands::Config { init } => {
            if init {
                if Config::config_path().exists() {
                    println!("Config already exists, leaving it untouched.");
                } else {
                    Config::default().save()?;
                    println!("Wrote default config.");
                }
            }
            println!("Config path: {}", Config::config_path().display());
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Box<dyn CredentialStore> {
    match config.session.store {
        StoreKind::Memory => Box::new(MemoryStore::new()),
        StoreKind::File => {
            let id = config
                .session
                .id
                .clone()
                .unwrap_or_else(default_session_id);
            tracing::debug!(session = %id, "Using session-scoped key store");
            Box::new(SessionFileStore::new(&Config::session_root(), &id))
        }
    }
}

fn load_brief(path: &Path) -> Result<CampaignBrief> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read brief {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&content).context("Failed to parse brief JSON")
    } else {
        toml::from_str(&content).context("Failed to parse brief TOML")
    }
}

async fn generate(
    session: &mut Session,
    brief: &CampaignBrief,
    wants_image: bool,
    prefer_free: bool,
) -> Result<()> {
    session.refresh_free_tier().await;

    loop {
        match session.prompt() {
            Prompt::Ready => break,
            Prompt::OfferFreeTier { status, prefill } => {
                let take_free = prefer_free
                    || ask_yes_no(&format!(
                        "Try the free tier? {} of {} generations left today",
                        status.remaining, status.limit
                    ))?;
                if take_free {
                    report(session.choose_free()?);
                } else {
                    enter_keys(session, prefill)?;
                }
            }
            Prompt::KeyEntry { prefill } => enter_keys(session, prefill)?,
        }
    }

    match session.submit(brief, wants_image).await {
        Outcome::Generated(response) => {
            render(&response);
            Ok(())
        }
        Outcome::NeedsAuth(_) => anyhow::bail!("No API keys or free tier selected"),
        Outcome::Failed { error, prompt } => {
            if let Some(secs) = error.retry_after {
                eprintln!("Try again in {secs} seconds.");
            }
            if prompt.is_some() {
                eprintln!("Run `socialmarket keys set` to enter your API keys, then try again.");
            }
            Err(anyhow::anyhow!(error.message))
        }
    }
}

fn keys(session: &mut Session, action: KeysAction) -> Result<()> {
    match action {
        KeysAction::Set { anthropic, openai } => {
            match session.mode() {
                AuthMode::Byok => report(session.change_keys()?),
                AuthMode::Free => report(session.switch_to_own_keys()?),
                AuthMode::Unset => {}
            }
            let prefill = session.credentials().cloned();
            match (anthropic, openai) {
                (Some(a), Some(o)) => {
                    ensure_accepted(session.submit_credentials(Credentials::new(a, o))?)?
                }
                (a, o) => {
                    let seed = Credentials::new(
                        a.unwrap_or_else(|| prefill.as_ref().map(|c| c.anthropic_key.clone()).unwrap_or_default()),
                        o.unwrap_or_else(|| prefill.as_ref().map(|c| c.openai_key.clone()).unwrap_or_default()),
                    );
                    enter_keys(session, Some(seed))?;
                }
            }
        }
        KeysAction::Show { reveal } => match session.credentials() {
            Some(creds) => {
                for provider in Provider::ALL {
                    let shown = if reveal {
                        creds.key(provider).to_string()
                    } else {
                        creds.masked(provider)
                    };
                    println!("{:<10} {shown}", provider.display_name());
                }
            }
            None => println!("No API keys stored for this session."),
        },
        KeysAction::Clear => {
            session.logout()?;
            println!("API keys cleared.");
        }
    }
    Ok(())
}

/// Reads a key pair from the terminal until the controller accepts it.
fn enter_keys(session: &mut Session, prefill: Option<Credentials>) -> Result<()> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        anyhow::bail!(
            "API keys required. Pass --anthropic and --openai to `socialmarket keys set`."
        );
    }

    let mut current = prefill.unwrap_or_default();
    loop {
        let mut next = Credentials::default();
        for provider in Provider::ALL {
            let def = provider.def();
            println!("{} API key ({}), from {}", def.name, def.key_prefix, def.console_url);
            let existing = current.key(provider).to_string();
            let hint = if existing.is_empty() {
                String::new()
            } else {
                format!(" [{}]", current.masked(provider))
            };
            let entered = read_line(&mut stdin.lock(), &format!("  key{hint}: "))?;
            let value = if entered.is_empty() { existing } else { entered };
            match provider {
                Provider::Anthropic => next.anthropic_key = value,
                Provider::OpenAI => next.openai_key = value,
            }
        }

        match session.submit_credentials(next.clone())? {
            Effect::Rejected { reason } => {
                eprintln!("{reason}");
                current = next;
            }
            effect => {
                report(effect);
                return Ok(());
            }
        }
    }
}

fn read_line(input: &mut impl BufRead, label: &str) -> Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        anyhow::bail!("Input closed");
    }
    Ok(line.trim().to_string())
}

fn ask_yes_no(question: &str) -> Result<bool> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        return Ok(false);
    }
    let answer = read_line(&mut stdin.lock(), &format!("{question} [Y/n] "))?;
    Ok(!matches!(answer.to_lowercase().as_str(), "n" | "no"))
}

/// Fails on a refused event so scripted callers see a non-zero exit.
fn ensure_accepted(effect: Effect) -> Result<()> {
    if let Effect::Rejected { reason } = effect {
        anyhow::bail!("API keys rejected: {reason}");
    }
    report(effect);
    Ok(())
}

fn report(effect: Effect) {
    match effect {
        Effect::PersistCredentials(_) => println!("API keys saved for this session."),
        Effect::ClearCredentials => println!("API keys cleared."),
        Effect::Rejected { reason } => eprintln!("{reason}"),
        Effect::None => {}
    }
}

fn render(response: &CampaignResponse) {
    println!("Campaign for {}", response.business_name);
    if let Some(url) = &response.image_url {
        println!();
        println!("Image: {url}");
        if let Some(prompt) = response.effective_image_prompt() {
            println!("Image prompt: {prompt}");
        }
    }
    for copy in &response.copies {
        println!();
        println!("== {} ({} characters)", copy.platform, copy.character_count);
        println!("{}", copy.content);
    }
    if let Some(message) = &response.message {
        println!();
        println!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_keys_are_an_error() {
        let err = ensure_accepted(Effect::Rejected {
            reason: "Anthropic API key has an invalid format".into(),
        })
        .unwrap_err();
        assert!(err.to_string().contains("Anthropic"));

        assert!(ensure_accepted(Effect::None).is_ok());
        assert!(ensure_accepted(Effect::ClearCredentials).is_ok());
    }

    #[test]
    fn store_flag_parses_kind() {
        let cli = Cli::try_parse_from(["socialmarket", "--store", "memory", "status"]).unwrap();
        assert_eq!(cli.store, Some(StoreKind::Memory));

        let cli = Cli::try_parse_from(["socialmarket", "keys", "show", "--store", "FILE"]).unwrap();
        assert_eq!(cli.store, Some(StoreKind::File));

        assert!(Cli::try_parse_from(["socialmarket", "--store", "disk", "status"]).is_err());
    }

    #[test]
    fn brief_loads_from_toml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("brief.toml");
        std::fs::write(
            &toml_path,
            r#"
business_name = "The Corner Bakery"
business_type = "Bakery"
target_audience = "Families"
campaign_goal = "Afternoon tea"
key_messages = "Local"
"#,
        )
        .unwrap();
        let brief = load_brief(&toml_path).unwrap();
        assert_eq!(brief.business_name, "The Corner Bakery");

        let json_path = dir.path().join("brief.JSON");
        std::fs::write(
            &json_path,
            r#"{"business_name": "Fix-It Garage", "business_type": "Garage",
                "target_audience": "Drivers", "campaign_goal": "MOT season",
                "key_messages": "Fair prices"}"#,
        )
        .unwrap();
        assert_eq!(load_brief(&json_path).unwrap().business_name, "Fix-It Garage");

        assert!(load_brief(&dir.path().join("missing.toml")).is_err());
    }
}
