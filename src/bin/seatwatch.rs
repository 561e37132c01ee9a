//! seatwatch CLI
//!
//! Watches course sections and prints a notification whenever a refresh
//! reports them available.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use seatwatch::watch::parse_period;
use seatwatch::{
    load_watch_file, parse_course_list, ConsoleNotifier, CourseFetcher, CourseId, HttpFetcher,
    HttpFetcherConfig, JsonLinesNotifier, Notifier, NotifierSubscriber, SignalMode, WatchError,
    WatchList, WatchResult, Watcher, WatcherConfig,
};

/// Attempts allowed for each interactive prompt before giving up.
const MAX_PROMPT_ATTEMPTS: usize = 5;

/// seatwatch - get notified when a seat opens up
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Courses to watch, e.g. "CPSC 221 101" (quote each; commas also separate)
    courses: Vec<String>,

    /// Refresh period: ISO-8601 (PT30S, PT5M) or whole seconds
    #[arg(short, long, value_parser = duration_arg)]
    duration: Option<Duration>,

    /// File with one course per line; a leading ~/ means the home directory
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Emit notifications as JSON lines instead of text
    #[arg(long)]
    json: bool,

    /// Only notify when a course goes from full to open
    #[arg(long)]
    transitions: bool,

    /// Undelivered cycles buffered for the notifier
    #[arg(long, default_value_t = 16)]
    buffer: usize,
}

fn duration_arg(text: &str) -> Result<Duration, String> {
    parse_period(text).ok_or_else(|| format!("invalid period: {text}"))
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn read_line(input: &mut impl BufRead) -> WatchResult<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn prompt(text: &str) -> WatchResult<()> {
    print!("{text}");
    io::stdout().flush()?;
    Ok(())
}

fn prompt_courses(input: &mut impl BufRead) -> WatchResult<Vec<CourseId>> {
    let mut ids = Vec::new();
    let mut failures = 0;

    loop {
        prompt("Course to watch (e.g. CPSC 221 101, comma separated, \"done\" to finish): ")?;
        let Some(line) = read_line(input)? else {
            break;
        };
        if line.eq_ignore_ascii_case("done") {
            break;
        }

        let (parsed, rejected) = parse_course_list(&line);
        for token in &rejected {
            println!("Not a course identifier: {token}");
        }
        if parsed.is_empty() {
            failures += 1;
            if failures >= MAX_PROMPT_ATTEMPTS {
                return Err(WatchError::InvalidCourse { input: line });
            }
            continue;
        }
        for id in parsed {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    Ok(ids)
}

fn prompt_period(input: &mut impl BufRead) -> WatchResult<Duration> {
    let mut last = String::new();
    for _ in 0..MAX_PROMPT_ATTEMPTS {
        prompt("Refresh period (e.g. PT1M or 60): ")?;
        let Some(line) = read_line(input)? else {
            break;
        };
        if let Some(period) = parse_period(&line) {
            return Ok(period);
        }
        println!("Not a valid period: {line}");
        last = line;
    }
    Err(WatchError::InvalidPeriod { input: last })
}

fn add_courses(courses: &WatchList, text: &str, fetcher: &dyn CourseFetcher) -> WatchResult<()> {
    let (ids, rejected) = parse_course_list(text);
    for token in &rejected {
        println!("Not a course identifier: {token}");
    }

    let report = courses.open_all(ids, fetcher)?;
    for id in &report.added {
        println!("Watching {id}");
    }
    for err in &report.rejected {
        println!("{err}");
    }
    Ok(())
}

fn command_loop(
    input: &mut impl BufRead,
    courses: &WatchList,
    fetcher: &dyn CourseFetcher,
) -> WatchResult<()> {
    println!("Commands: add <COURSES>, list, quit");
    while let Some(line) = read_line(input)? {
        let (command, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        match command.to_ascii_lowercase().as_str() {
            "" => {}
            "add" => add_courses(courses, rest, fetcher)?,
            "list" => {
                for course in courses.snapshot()? {
                    println!("{}", course.verbose());
                }
            }
            "quit" | "exit" => break,
            other => println!("Unknown command: {other}"),
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let stdin = io::stdin();
    let mut input = stdin.lock();

    let (mut ids, mut rejected) = parse_course_list(&cli.courses.join(","));
    if let Some(path) = &cli.file {
        let (from_file, bad) = load_watch_file(&expand_home(path))?;
        for id in from_file {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        rejected.extend(bad);
    }
    for token in &rejected {
        println!("Not a course identifier: {token}");
    }
    if ids.is_empty() {
        ids = prompt_courses(&mut input)?;
    }

    let period = match cli.duration {
        Some(period) => period,
        None => prompt_period(&mut input)?,
    };

    let fetcher: Arc<dyn CourseFetcher> = Arc::new(HttpFetcher::new(HttpFetcherConfig::default())?);
    let courses = WatchList::new();
    let report = courses.open_all(ids, fetcher.as_ref())?;
    for err in &report.rejected {
        println!("{err}");
    }
    if courses.is_empty()? {
        return Err("no courses to watch".into());
    }

    let cfg = WatcherConfig {
        signal_mode: if cli.transitions {
            SignalMode::BecameAvailable
        } else {
            SignalMode::RefreshSucceeded
        },
        subscriber_capacity: cli.buffer,
        ..WatcherConfig::with_period(period)
    };
    info!(courses = courses.len()?, period = ?cfg.period, "starting watcher");

    let notifier: Box<dyn Notifier> = if cli.json {
        Box::new(JsonLinesNotifier::new(io::stdout()))
    } else {
        Box::new(ConsoleNotifier::stdout())
    };
    let watcher = Watcher::new(courses.clone(), Arc::clone(&fetcher), cfg)?;
    watcher.subscribe(NotifierSubscriber::new(courses.clone(), notifier))?;
    watcher.start()?;

    let outcome = command_loop(&mut input, &courses, fetcher.as_ref());
    watcher.close();
    println!("Watcher closed");
    outcome.map_err(Into::into)
}
