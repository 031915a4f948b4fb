use anyhow::{bail, Context, Result as AnyhowResult};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use textmate_bind::config::{BridgeConfig, GrammarConfig};
use textmate_bind::primitives::grammar::{load_grammar_dir, LocalGrammarLoader};
use textmate_bind::primitives::highlighter::DEFAULT_THEME;
use textmate_bind::primitives::tokenizer::StyledLine;
use textmate_bind::services::editor::{HeadlessEditor, MemoryStyleRoot, ModeRegistry};
use textmate_bind::services::styled_html::{render_document, render_lines_html};
use textmate_bind::services::tracing_setup;
use textmate_bind::view::theme::{LocalThemeLoader, RawTheme};
use textmate_bind::{BindingCoordinator, GrammarRegistry, LoadPolicy};

/// Highlight a file with TextMate grammars and print it as HTML
#[derive(Parser, Debug)]
#[command(name = "tmbind")]
#[command(about = "Highlight a file with TextMate grammars and themes", long_about = None)]
#[command(version)]
struct Args {
    /// File to highlight
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Register a grammar file for a scope (repeatable)
    #[arg(long = "grammar", value_name = "SCOPE=PATH")]
    grammars: Vec<String>,

    /// Register every .sublime-syntax file in a directory
    #[arg(long, value_name = "DIR")]
    grammar_dir: Option<PathBuf>,

    /// Language id to highlight FILE as
    #[arg(long, value_name = "ID")]
    language: Option<String>,

    /// Scope to bind the language to, if the config does not bind it
    #[arg(long, value_name = "SCOPE")]
    scope: Option<String>,

    /// TextMate JSON theme to highlight with
    #[arg(long, value_name = "PATH")]
    theme: Option<PathBuf>,

    /// Path to log file (default: stderr)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,
}

fn parse_grammar_arg(arg: &str) -> AnyhowResult<GrammarConfig> {
    let Some((scope_name, path)) = arg.split_once('=') else {
        bail!("Invalid --grammar '{}', expected SCOPE=PATH", arg);
    };
    Ok(GrammarConfig {
        scope_name: scope_name.to_string(),
        path: PathBuf::from(path),
        language_id: None,
        load: None,
    })
}

fn load_config(args: &Args) -> AnyhowResult<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => match BridgeConfig::default_config_path().filter(|p| p.exists()) {
            Some(path) => BridgeConfig::load_from_file(&path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => BridgeConfig::default(),
        },
    };

    for arg in &args.grammars {
        config.grammars.push(parse_grammar_arg(arg)?);
    }
    if let Some(theme) = &args.theme {
        config.themes.push(theme.clone());
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn plain_lines(text: &str) -> Vec<StyledLine> {
    text.split('\n')
        .map(|line| StyledLine {
            text: line.strip_suffix('\r').unwrap_or(line).to_string(),
            spans: Vec::new(),
        })
        .collect()
}

async fn run(args: Args, config: BridgeConfig) -> AnyhowResult<String> {
    let Some(file) = &args.file else {
        bail!("No FILE given");
    };
    let Some(language_id) = &args.language else {
        bail!("--language is required");
    };

    let registry = Arc::new(GrammarRegistry::with_asap_delay(Duration::from_millis(
        config.asap_delay_ms,
    )));
    let modes = Arc::new(ModeRegistry::new());
    let root = Arc::new(MemoryStyleRoot::new());
    let coordinator = BindingCoordinator::new(registry, modes.clone(), root.clone());

    if let Some(dir) = &args.grammar_dir {
        for (scope_name, source) in load_grammar_dir(&LocalGrammarLoader, dir) {
            coordinator.add_grammar(&scope_name, source);
        }
    }
    coordinator
        .apply_config(&config, Arc::new(LocalGrammarLoader), &LocalThemeLoader)
        .await
        .context("Failed to apply configuration")?;

    if !coordinator.registry().has_language_registered(language_id) {
        let Some(scope_name) = &args.scope else {
            bail!(
                "Language '{}' is not bound to a grammar; pass --scope or bind it in the config",
                language_id
            );
        };
        coordinator
            .activate_language(scope_name, language_id, LoadPolicy::Now)
            .await
            .with_context(|| format!("Failed to activate '{}'", language_id))?;
    }

    let theme_name = match &args.theme {
        Some(path) => RawTheme::load(&LocalThemeLoader, path)?
            .name
            .unwrap_or_else(|| DEFAULT_THEME.to_string()),
        None => DEFAULT_THEME.to_string(),
    };

    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let editor = Arc::new(HeadlessEditor::new(Some(language_id.as_str()), Some(theme_name.as_str())));
    editor.swap_doc(text.clone());

    let id = coordinator.attach(editor.clone());
    let outcome = coordinator
        .update_instance(id)
        .await
        .context("Failed to bind tokenizer")?;
    tracing::info!("Bound {} for '{}': {:?}", id, language_id, outcome);

    let lines = editor
        .highlight(&modes)
        .unwrap_or_else(|| plain_lines(&text));
    let stylesheets: Vec<String> = root.stylesheets().into_iter().map(|(_, css)| css).collect();
    let body = render_lines_html(&lines, &theme_name);

    coordinator.detach(id);
    Ok(render_document(&stylesheets, &body))
}

fn main() -> AnyhowResult<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    if args.dump_config {
        let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
        println!("{json}");
        return Ok(());
    }

    tracing_setup::init_global(args.log_file.as_deref(), &config.log_filter)
        .context("Failed to initialize logging")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let html = runtime.block_on(run(args, config))?;
    print!("{html}");
    Ok(())
}
