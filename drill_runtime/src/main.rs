//! drill-inspect: look into a drill state file, verify it, or practice from
//! the terminal.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use drill_engine::actions::Action;
use drill_engine::clock::SystemClock;
use drill_engine::domain::{AppState, AttemptNo, PracticeMode};
use drill_engine::review::ReviewSource;
use drill_engine::run::run_summary;

use drill_runtime::ai::AiProvider;
use drill_runtime::chat_provider::{ChatAiProvider, PromptSource};
use drill_runtime::config::{ProviderKind, RuntimeConfig};
use drill_runtime::http_transport::HttpChatTransport;
use drill_runtime::mock_provider::MockAiProvider;
use drill_runtime::persistence::FileStore;
use drill_runtime::practice_flow::{FlowError, GuessOutcome, PracticeFlow};
use drill_runtime::session::{SharedStore, Store};
use drill_runtime::snapshot_codec::{import_snapshot_from_file, snapshot_hash};

#[derive(Parser)]
#[command(name = "drill-inspect")]
#[command(about = "Inspect and drive a vocabulary drill state file")]
struct Cli {
    /// State file (defaults to DRILL_STATE_PATH or ./drill_state.json)
    state_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print lists, sessions and history (default)
    Show,

    /// Strictly load the snapshot and print its canonical hash
    Verify,

    /// Start a review session over one ledger
    Review {
        #[arg(value_enum)]
        source: LedgerArg,
    },

    /// Practice a list interactively, reading guesses from stdin
    Practice {
        list_id: String,
        #[arg(long)]
        random: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LedgerArg {
    Mistakes,
    Corrects,
}

impl From<LedgerArg> for ReviewSource {
    fn from(arg: LedgerArg) -> Self {
        match arg {
            LedgerArg::Mistakes => ReviewSource::Mistakes,
            LedgerArg::Corrects => ReviewSource::Corrects,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::from_env().context("invalid configuration")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter.clone().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let path = cli.state_file.clone().unwrap_or_else(|| config.state_path.clone());

    match cli.command.unwrap_or(Commands::Show) {
        Commands::Show => {
            let store = open_store(&path, &config);
            print_state(&store.snapshot());
        }
        Commands::Verify => {
            let state = import_snapshot_from_file(&path)
                .with_context(|| format!("{} failed verification", path.display()))?;
            println!("OK  {}", path.display());
            println!("hash {}", snapshot_hash(&state)?);
        }
        Commands::Review { source } => {
            let store = open_store(&path, &config);
            let source = ReviewSource::from(source);
            let outcomes = store.start_review(source);
            if outcomes.is_empty() {
                bail!("the {:?} ledger is empty", source);
            }
            store.save()?;
            println!("review session ready in list {}", source.list_id());
        }
        Commands::Practice { list_id, random } => {
            let store = open_store(&path, &config);
            let mode = random.then_some(PracticeMode::FixedRandom);
            let t = store.dispatch(&Action::PracticeEnsure {
                list_id: list_id.clone(),
                reshuffle: false,
                mode,
            });
            if !t.applied {
                bail!("cannot practice {}: {}", list_id, t.reason);
            }
            match config.ai.provider {
                ProviderKind::Mock => practice(PracticeFlow::new(MockAiProvider, store), &list_id).await?,
                ProviderKind::Chat => {
                    let provider = ChatAiProvider::new(
                        HttpChatTransport::new(config.ai.clone()),
                        PromptSource::Store(store.clone()),
                    );
                    practice(PracticeFlow::new(provider, store), &list_id).await?
                }
            }
        }
    }
    Ok(())
}

fn open_store(path: &Path, config: &RuntimeConfig) -> SharedStore {
    SharedStore::new(Store::open(
        Box::new(FileStore::new(path)),
        Box::new(SystemClock),
        config.autosave,
    ))
}

fn print_state(state: &AppState) {
    println!("lists ({})", state.lists.len());
    for list in &state.lists {
        let items = state.items(&list.id).len();
        print!("  {:<24} {:<32} {:>4} items", list.id, list.name, items);
        match state.progress(&list.id) {
            Some(p) => println!(
                "  {} {}/{}{}",
                p.mode,
                p.cursor.min(p.order.len()),
                p.order.len(),
                if p.is_complete() { " done" } else { "" }
            ),
            None => println!(),
        }
    }

    println!("history ({})", state.practice_history.len());
    for entry in &state.practice_history {
        let s = run_summary(&entry.run);
        println!(
            "  {:<36} {:<24} {}/{} answered, {} correct, {} failed, {}%",
            entry.run.id,
            entry.list_name.as_deref().unwrap_or(&entry.list_id),
            s.answered,
            s.total,
            s.correct,
            s.final_wrong,
            s.accuracy_percent
        );
    }

    println!("mistakes {}  corrects {}", state.mistakes.len(), state.corrects.len());
    match snapshot_hash(state) {
        Ok(hash) => println!("hash {}", hash),
        Err(err) => println!("hash unavailable: {}", err),
    }
}

async fn practice<P: AiProvider>(flow: PracticeFlow<P>, list_id: &str) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let item = match flow.prepare_item(list_id).await {
            Ok(item) => item,
            Err(FlowError::NoCurrentItem(_)) => {
                println!("session complete");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        println!();
        println!("{}", item.sentence());
        if let Some(zh) = &item.material.sentence_zh {
            println!("{}", zh);
        }

        let mut attempt = AttemptNo::First;
        loop {
            println!("[{}] meaning of \"{}\"? (empty line quits)", attempt.number(), item.term);
            let Some(line) = lines.next_line().await? else {
                return Ok(());
            };
            if line.trim().is_empty() {
                return Ok(());
            }
            match flow.submit_guess(list_id, attempt, &line).await? {
                GuessOutcome::Correct { judgement } => {
                    println!("correct{}", reason_suffix(judgement.reason.as_deref()));
                    break;
                }
                GuessOutcome::Escalated { next, judgement } => {
                    println!("not yet{}", reason_suffix(judgement.reason.as_deref()));
                    print_hint(&flow, list_id, next);
                    attempt = next;
                }
                GuessOutcome::Revealed { reveal, .. } => {
                    println!("{}", reveal.term_meaning_zh);
                    println!("{}", reveal.article_zh);
                    break;
                }
            }
        }
        flow.advance(list_id);
    }
}

fn reason_suffix(reason: Option<&str>) -> String {
    reason.map(|r| format!(": {}", r)).unwrap_or_default()
}

fn print_hint<P: AiProvider>(flow: &PracticeFlow<P>, list_id: &str, next: AttemptNo) {
    let material = flow.store().read(|state, _| {
        let progress = state.progress(list_id)?;
        let item = state.item(list_id, progress.current_item_id()?)?;
        item.material_for(progress.run_id()).current().cloned()
    });
    let Some(material) = material else { return };
    match next {
        AttemptNo::Second => {
            if let Some(c) = &material.context {
                println!("{} ... {}", c.prev_sentence, c.next_sentence);
            }
        }
        _ => {
            if let Some(a) = &material.article {
                println!("{}", a.article_en);
            }
        }
    }
}
