use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use actuator_link::{ActionControl, CommandGoal, MockActuator, MockSubmission};
use entity_registry::{kinds, Audience, Entity, Position, Query, Registry, RemoteRequest};
use robot_behavior::{load_config, MockBackends, Robot, RobotConfig};
use utterance_parser::{UtteranceCompiler, WordRateOracle};

#[derive(Parser, Debug)]
#[command(
    name = "sr-say",
    version,
    about = "Saorsa Robotics speech and gaze demo on mock actuators",
    disable_help_subcommand = true
)]
struct Cli {
    /// Robot configuration YAML (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile an annotated utterance and print the plan as JSON
    Parse {
        /// Annotated text, e.g. '<happy>Hi</happy> <wave target="p1">there</wave>'
        #[arg(long)]
        text: String,
        /// Milliseconds per word for cue durations
        #[arg(long, default_value_t = 400u64)]
        ms_per_word: u64,
    },
    /// Speak plain text and wait for it to finish
    Say {
        #[arg(long)]
        text: String,
    },
    /// Speak annotated text to people and print every command issued
    SayTo {
        #[arg(long)]
        text: String,
        /// People as id:x,y (repeatable)
        #[arg(long = "person", value_parser = parse_person)]
        people: Vec<PersonArg>,
        /// Address only this person instead of everyone
        #[arg(long)]
        to: Option<String>,
        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Print metrics in text exposition format when done
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Answer registry requests given as JSON lines on stdin
    Registry {
        /// Entity kinds remote peers may add
        #[arg(long = "kind", default_values_t = vec![kinds::PERSON.to_string()])]
        kinds: Vec<String>,
    },
}

#[derive(Clone, Debug)]
struct PersonArg {
    id: String,
    x: f64,
    y: f64,
}

fn parse_person(s: &str) -> Result<PersonArg, String> {
    let (id, coords) = s
        .split_once(':')
        .ok_or_else(|| format!("expected id:x,y, got '{s}'"))?;
    let (x, y) = coords
        .split_once(',')
        .ok_or_else(|| format!("expected x,y after '{id}:'"))?;
    let x = x.trim().parse::<f64>().map_err(|e| format!("invalid x '{x}': {e}"))?;
    let y = y.trim().parse::<f64>().map_err(|e| format!("invalid y '{y}': {e}"))?;
    Ok(PersonArg {
        id: id.to_string(),
        x,
        y,
    })
}

#[derive(Serialize)]
struct TimelineRecord {
    ts: String,
    seq: u64,
    channel: String,
    goal: CommandGoal,
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RobotConfig::default(),
    };

    match cli.command {
        Commands::Parse { text, ms_per_word } => parse_cmd(&config, &text, ms_per_word),
        Commands::Say { text } => say_cmd(config, &text),
        Commands::SayTo {
            text,
            people,
            to,
            timeout_ms,
            metrics,
        } => say_to_cmd(config, &text, &people, to, timeout_ms, metrics),
        Commands::Registry { kinds } => registry_cmd(&kinds),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();
}

fn parse_cmd(config: &RobotConfig, text: &str, ms_per_word: u64) -> Result<()> {
    let compiler = UtteranceCompiler::new()?;
    let oracle = WordRateOracle::new(Duration::from_millis(ms_per_word));
    let plan = compiler.compile(text, &config.vocabulary, &oracle)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn say_cmd(config: RobotConfig, text: &str) -> Result<()> {
    let registry = Arc::new(Registry::new());
    let mocks = MockBackends::scripted(&config)?;
    let robot = Robot::new(
        config,
        registry,
        mocks.backends(),
        Arc::new(WordRateOracle::default()),
    )?;
    let outcome = robot.say_and_wait(text, None)?;
    info!(?outcome, "speech finished");
    print_timeline(&mocks)?;
    Ok(())
}

fn say_to_cmd(
    config: RobotConfig,
    text: &str,
    people: &[PersonArg],
    to: Option<String>,
    timeout_ms: Option<u64>,
    metrics: bool,
) -> Result<()> {
    let registry = Arc::new(Registry::new());
    let people: Vec<Arc<Entity>> = people
        .iter()
        .map(|p| {
            Arc::new(Entity::new(kinds::PERSON, &p.id).with_position(Position::new(p.x, p.y, 0.0)))
        })
        .collect();
    for person in &people {
        registry.register(person);
    }
    if people.is_empty() {
        warn!("no people given; the robot will speak without gazing");
    }

    let audience = match to {
        Some(id) => Audience::Entity(id),
        None => Audience::Query(Query::of_kind(kinds::PERSON).visible_only()),
    };

    let mocks = MockBackends::scripted(&config)?;
    let robot = Robot::new(
        config,
        registry,
        mocks.backends(),
        Arc::new(WordRateOracle::default()),
    )?;
    let plan = robot.say_to(text, audience)?;
    info!(sentence = %plan.plan().sentence, "speaking");
    let outcome = match timeout_ms {
        Some(ms) => match robot.wait_timeout(&plan, Duration::from_millis(ms)) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "giving up, cancelling");
                robot.cancel(&plan)?;
                plan.wait()
            }
        },
        None => robot.wait(&plan),
    };
    info!(?outcome, "utterance finished");

    print_timeline(&mocks)?;
    if metrics {
        print!("{}", robot.metrics().encode_text());
    }
    Ok(())
}

fn registry_cmd(kinds: &[String]) -> Result<()> {
    let registry = Registry::new();
    for kind in kinds {
        registry.register_kind(kind);
    }
    let stdin = io::stdin();
    for (n, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: RemoteRequest = serde_json::from_str(&line)
            .with_context(|| format!("line {}: invalid request", n + 1))?;
        let response = registry.handle_remote(request);
        println!("{}", serde_json::to_string(&response)?);
    }
    Ok(())
}

fn print_timeline(mocks: &MockBackends) -> Result<()> {
    let mut all: Vec<(&str, MockSubmission)> = Vec::new();
    let sources: [(&str, &Arc<MockActuator>); 4] = [
        ("speech", &mocks.speech),
        ("gaze", &mocks.gaze),
        ("expression", &mocks.expression),
        ("gesture", &mocks.gesture),
    ];
    for (channel, mock) in sources {
        all.extend(mock.submitted().into_iter().map(|s| (channel, s)));
    }
    all.sort_by_key(|(_, s)| s.seq);

    let now = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "".into());
    for (channel, submission) in all {
        let record = TimelineRecord {
            ts: now.clone(),
            seq: submission.seq,
            channel: channel.to_string(),
            goal: submission.goal,
        };
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}
