use anyhow::Context;
use auction_session::core::reconciler::ResumeCandidate;
use auction_session::domain::model::{Phase, TeamId};
use auction_session::domain::ports::LocalStore;
use auction_session::utils::{logger, validation::Validate};
use auction_session::{
    AuctionConfig, AuctionController, AuctionError, Catalog, CliConfig, FileStateStore,
    HttpBackup, MemoryStore, PersistenceReconciler, RandomSelector, RemoteBackupWorker,
    ResumeDecision, ResumeMode, ResumeSource,
};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Draw,
    Team(TeamId),
    Raise,
    Lower,
    Sold,
    Unsold,
    Undo,
    Requeue,
    End,
    Rename(TeamId, String),
    Status,
    Report(String),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.trim().splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let rest = parts.next().map(str::trim).unwrap_or_default();

    let team_id = |raw: &str| -> Result<TeamId, String> {
        raw.parse::<u32>()
            .map(TeamId)
            .map_err(|_| format!("'{}' is not a team number", raw))
    };

    match head {
        "draw" | "d" => Ok(Command::Draw),
        "team" | "t" => team_id(rest).map(Command::Team),
        "+" => Ok(Command::Raise),
        "-" => Ok(Command::Lower),
        "sold" => Ok(Command::Sold),
        "unsold" => Ok(Command::Unsold),
        "undo" | "u" => Ok(Command::Undo),
        "requeue" => Ok(Command::Requeue),
        "end" => Ok(Command::End),
        "rename" => {
            let mut args = rest.splitn(2, char::is_whitespace);
            let id = team_id(args.next().unwrap_or_default())?;
            let name = args.next().map(str::trim).unwrap_or_default();
            if name.is_empty() {
                return Err("usage: rename <team> <name>".to_string());
            }
            Ok(Command::Rename(id, name.to_string()))
        }
        "status" | "s" => Ok(Command::Status),
        "report" if !rest.is_empty() => Ok(Command::Report(rest.to_string())),
        "report" => Err("usage: report <path.csv>".to_string()),
        "help" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        "" => Err(String::new()),
        other => Err(format!("unknown command '{}', type 'help'", other)),
    }
}

const HELP: &str = "\
commands:
  draw               draw a random item from the pool
  team <n>           select the bidding team
  + / -              raise / lower the bid one step
  sold / unsold      settle the current item
  undo               revert the last action
  requeue            start the round of unsold items
  end                finish the auction
  rename <n> <name>  rename a team
  status             show teams and the current draw
  report <path.csv>  export rosters and unsold items
  quit               leave (the auction stays saved)";

fn print_error(e: &AuctionError) {
    if e.is_notice() {
        println!("⚠️  {}", e.user_friendly_message());
        return;
    }
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
}

fn print_status<L: LocalStore>(controller: &AuctionController<L>) {
    let phase = controller.phase();
    let Some(session) = controller.session() else {
        println!("phase: {}", phase);
        return;
    };

    println!(
        "phase: {} | round: {} | pool: {} | unsold: {} | undo steps: {}",
        phase,
        session.round(),
        session.pool().len(),
        session.unsold().len(),
        controller.history_len()
    );
    if session.is_final_picks(controller.rules()) && phase != Phase::Ended {
        println!("🔥 final picks");
    }
    for team in session.teams() {
        println!(
            "  [{}] {:<20} budget {:>6}  roster {}/{}",
            team.id,
            team.name,
            team.budget,
            team.roster.len(),
            controller.rules().ledger.max_roster_size
        );
    }
    if let Some(draw) = session.active_draw() {
        let team = draw
            .selected_team_id
            .and_then(|id| session.team(id))
            .map(|team| team.name.as_str())
            .unwrap_or("-");
        println!("  on the block: {} | bid {} | team {}", draw.item.name, draw.current_bid, team);
    }
    if let Some(log) = controller.dead_letters() {
        if !log.is_empty() {
            println!("  remote backup failures: {}", log.len());
        }
    }
}

fn print_summary<L: LocalStore>(controller: &AuctionController<L>) {
    let Some(summary) = controller.summary() else {
        return;
    };
    println!("round {} complete", summary.round);
    for standing in &summary.standings {
        println!(
            "  {:<20} spent {:>6}  left {:>6}  roster {}",
            standing.name, standing.spent, standing.budget, standing.roster_size
        );
    }
    if !summary.unsold.is_empty() {
        println!("  unsold:");
        for item in &summary.unsold {
            match item.rating {
                Some(rating) => println!("    {} ({:.1})", item.name, rating),
                None => println!("    {}", item.name),
            }
        }
        println!("type 'requeue' for the unsold round or 'end' to finish");
    }
}

/// One line of the resume menu. A finished round with unsold items can be
/// resumed either way.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ResumeChoice {
    candidate: usize,
    carry_over: bool,
}

fn resume_choices(candidates: &[ResumeCandidate]) -> Vec<ResumeChoice> {
    candidates
        .iter()
        .enumerate()
        .flat_map(|(candidate, saved)| {
            let plain = ResumeChoice {
                candidate,
                carry_over: false,
            };
            match saved.mode {
                ResumeMode::Plain => vec![plain],
                ResumeMode::CarriedOverRound => vec![
                    ResumeChoice {
                        candidate,
                        carry_over: true,
                    },
                    plain,
                ],
            }
        })
        .collect()
}

fn describe(candidate: &ResumeCandidate, carry_over: bool) -> String {
    let source = match candidate.source {
        ResumeSource::Local => "local save".to_string(),
        ResumeSource::Remote => match candidate.saved_at {
            Some(at) => format!("remote backup from {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            None => "remote backup".to_string(),
        },
    };
    let session = &candidate.session;
    let sold: usize = session.teams().iter().map(|team| team.roster.len()).sum();
    let mode = match (candidate.mode, carry_over) {
        (ResumeMode::Plain, _) => "",
        (ResumeMode::CarriedOverRound, true) => ", continue with the unsold round",
        (ResumeMode::CarriedOverRound, false) => ", resume at the round-complete screen",
    };
    format!(
        "{}: {} left in pool, {} sold, {} unsold{}",
        source,
        session.pool().len(),
        sold,
        session.unsold().len(),
        mode
    )
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, text: &str) -> anyhow::Result<Option<String>> {
    use std::io::Write;
    print!("{}", text);
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?)
}

async fn resume_or_start<L: LocalStore>(
    controller: &mut AuctionController<L>,
    catalog: &Catalog,
    team_names: &[String],
    lines: &mut Lines<BufReader<Stdin>>,
) -> anyhow::Result<()> {
    let decision = controller.load_on_startup(catalog).await?;
    let mut candidates = match decision {
        ResumeDecision::Fresh => Vec::new(),
        ResumeDecision::Offer(candidates) => candidates,
    };

    if !candidates.is_empty() {
        let choices = resume_choices(&candidates);
        println!("A saved auction was found:");
        for (index, choice) in choices.iter().enumerate() {
            println!(
                "  [{}] {}",
                index + 1,
                describe(&candidates[choice.candidate], choice.carry_over)
            );
        }
        println!("  [n] start a new auction");

        loop {
            let Some(answer) = prompt(lines, "resume> ").await? else {
                anyhow::bail!("stdin closed before a choice was made");
            };
            let answer = answer.trim();
            if answer.eq_ignore_ascii_case("n") {
                break;
            }
            match answer.parse::<usize>() {
                Ok(number) if (1..=choices.len()).contains(&number) => {
                    let choice = choices[number - 1];
                    let candidate = candidates.swap_remove(choice.candidate);
                    if choice.carry_over {
                        let requeued = controller.resume_carried_over(candidate).await?;
                        println!("Resumed; {} unsold items are back in the pool", requeued);
                    } else {
                        controller.resume(candidate).await?;
                        println!("Resumed");
                        if controller.phase() == Phase::RoundExhausted {
                            print_summary(&*controller);
                        }
                    }
                    return Ok(());
                }
                _ => println!("choose 1-{} or n", choices.len()),
            }
        }
        controller.decline_resume().await?;
    }

    controller.start_fresh(catalog, team_names).await?;
    println!(
        "New auction: {} items, {} teams",
        catalog.len(),
        team_names.len()
    );
    Ok(())
}

async fn run<L: LocalStore>(
    mut controller: AuctionController<L>,
    catalog: Catalog,
    team_names: Vec<String>,
    mut selector: RandomSelector,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    resume_or_start(&mut controller, &catalog, &team_names, &mut lines).await?;
    print_status(&controller);
    println!("type 'help' for commands");

    while let Some(line) = prompt(&mut lines, "> ").await? {
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                if !message.is_empty() {
                    println!("{}", message);
                }
                continue;
            }
        };

        let outcome = match command {
            Command::Draw => controller.draw_with(&mut selector).await.map(|item| {
                let bid = controller
                    .session()
                    .and_then(|session| session.active_draw())
                    .map(|draw| draw.current_bid)
                    .unwrap_or_default();
                println!("🎲 {} (opening bid {})", item.name, bid);
            }),
            Command::Team(team_id) => controller.select_team(team_id).await,
            Command::Raise => controller.increase_bid().await.map(|bid| match bid {
                Some(bid) => println!("bid {}", bid),
                None => println!("bid unchanged"),
            }),
            Command::Lower => controller.decrease_bid().await.map(|bid| match bid {
                Some(bid) => println!("bid {}", bid),
                None => println!("bid unchanged"),
            }),
            Command::Sold => controller.resolve_sold().await.map(|phase| {
                if phase == Phase::RoundExhausted {
                    print_summary(&controller);
                }
            }),
            Command::Unsold => controller.resolve_unsold().await.map(|phase| {
                if phase == Phase::RoundExhausted {
                    print_summary(&controller);
                }
            }),
            Command::Undo => controller.undo().await.map(|phase| println!("undone, {}", phase)),
            Command::Requeue => controller
                .requeue_unsold()
                .await
                .map(|count| println!("{} unsold items back in the pool", count)),
            Command::End => controller.end().await.map(|()| {
                print_summary(&controller);
                println!("auction ended");
            }),
            Command::Rename(team_id, name) => controller.rename_team(team_id, &name).await,
            Command::Status => {
                print_status(&controller);
                Ok(())
            }
            Command::Report(path) => match controller.summary() {
                Some(summary) => summary
                    .write_csv(&path)
                    .map(|()| println!("report written to {}", path)),
                None => Err(AuctionError::SessionNotLoaded),
            },
            Command::Help => {
                println!("{}", HELP);
                Ok(())
            }
            Command::Quit => break,
        };

        if let Err(e) = outcome {
            print_error(&e);
        }
        if controller.phase() == Phase::Ended {
            break;
        }
    }

    controller.shutdown().await;
    Ok(())
}

fn build_controller<L: LocalStore>(
    store: L,
    config: &AuctionConfig,
    remote: Option<RemoteBackupWorker>,
) -> anyhow::Result<AuctionController<L>> {
    let mut reconciler = PersistenceReconciler::new(store)
        .with_key(config.state_key())
        .with_history_limit(config.history_limit());
    if let Some(worker) = remote {
        reconciler = reconciler.with_remote(worker);
    }
    Ok(AuctionController::new(config.rules()?, reconciler))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::info!("Starting auction console");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let mut config = AuctionConfig::from_file(&cli.config)
        .with_context(|| format!("reading {}", cli.config))?;
    cli.apply_to(&mut config);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let catalog = Catalog::from_file(&config.catalog.path)
        .with_context(|| format!("loading catalog {}", config.catalog.path))?;
    tracing::info!(auction = %config.auction.name, items = catalog.len(), "Catalog loaded");

    let remote = match config.remote_url() {
        Some(url) => {
            let timeout = config.remote_timeout();
            let backup = HttpBackup::new(url, timeout)?;
            tracing::info!(url, "Remote backup enabled");
            Some(RemoteBackupWorker::spawn(Arc::new(backup), timeout))
        }
        None => None,
    };

    let selector = match cli.seed {
        Some(seed) => RandomSelector::seeded(seed),
        None => RandomSelector::new(),
    };
    let team_names = config.team_names();

    if cli.ephemeral {
        tracing::warn!("Ephemeral mode: nothing is written to disk");
        let controller = build_controller(MemoryStore::new(), &config, remote)?;
        run(controller, catalog, team_names, selector).await
    } else {
        let store = FileStateStore::new(&config.storage.state_dir);
        tracing::info!(path = %store.path_for(config.state_key()).display(), "Local state file");
        let controller = build_controller(store, &config, remote)?;
        run(controller, catalog, team_names, selector).await
    }
}
