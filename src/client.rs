extern crate clap;
use anyhow::Context;
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::engine::{JobEngine, Outcome};
use crate::error::Error;
use crate::filter::{FilterSpec, StatusClass};
use crate::job::Job;

mod config;
mod engine;
mod error;
mod filter;
mod jenkins;
mod job;
mod pool;
mod schedule;
mod source;
mod table;
#[cfg(test)]
mod testing;

type Engine = JobEngine<jenkins::Client>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = app().get_matches();
    init_tracing(matches.is_present("verbose"));

    match run(&matches).await {
        Err(err) if matches!(err.downcast_ref::<Error>(), Some(Error::UserCancelled)) => {
            println!("{}", err);
            Ok(())
        }
        result => result,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "jenkinsctl=debug"
    } else {
        "jenkinsctl=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn filter_args<'a, 'b>(with_status: bool) -> Vec<Arg<'a, 'b>> {
    let mut args = vec![Arg::with_name("name")
        .long("name")
        .value_name("NAME")
        .takes_value(true)
        .help("Filter jobs from the name")];
    if with_status {
        args.push(
            Arg::with_name("status")
                .long("status")
                .value_name("STATUS")
                .takes_value(true)
                .possible_values(&StatusClass::VARIANTS)
                .default_value("all")
                .help("Filter jobs from status"),
        );
    }
    args.push(
        Arg::with_name("minimum-age")
            .long("minimum-age")
            .value_name("MINUTES")
            .takes_value(true)
            .help("Filter jobs from last build minimum age (in minutes)"),
    );
    args.push(
        Arg::with_name("maximum-age")
            .long("maximum-age")
            .value_name("MINUTES")
            .takes_value(true)
            .help("Filter jobs from last build maximum age (in minutes)"),
    );
    args
}

fn force_arg<'a, 'b>(action: &'b str) -> Arg<'a, 'b> {
    Arg::with_name("force")
        .long("force")
        .takes_value(false)
        .help(action)
}

fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("jenkinsctl")
        .version(env!("CARGO_PKG_VERSION"))
        .about("CLI for managing jobs on Jenkins")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("config")
                .long("config")
                .value_name("FILE")
                .takes_value(true)
                .help("config file (default is ./.jenkinsctl.toml or $HOME/.jenkinsctl.toml)"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log remote calls to stderr"),
        )
        .subcommand(
            SubCommand::with_name("job")
                .about("Manage jobs on Jenkins")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(
                    SubCommand::with_name("list")
                        .about("List jobs")
                        .args(&filter_args(true)),
                )
                .subcommand(
                    SubCommand::with_name("start")
                        .about("Start jobs, or schedule them with --schedule")
                        .args(&filter_args(true))
                        .arg(
                            Arg::with_name("schedule")
                                .long("schedule")
                                .value_name("CRON_SYNTAX")
                                .takes_value(true)
                                .help("Schedule in Jenkins timer trigger syntax"),
                        )
                        .arg(force_arg("Start jobs without confirmation")),
                )
                .subcommand(
                    SubCommand::with_name("stop")
                        .about("Stop running jobs")
                        .args(&filter_args(false))
                        .arg(force_arg("Stop jobs without confirmation")),
                ),
        )
}

async fn run(matches: &ArgMatches<'_>) -> anyhow::Result<()> {
    let (job, args) = match matches.subcommand() {
        ("job", Some(job)) => match job.subcommand() {
            (name, Some(args)) => (name, args),
            _ => anyhow::bail!("missing job subcommand"),
        },
        _ => anyhow::bail!("missing subcommand"),
    };

    let (config, file) = Config::load(matches.value_of("config"))?;
    if let Some(file) = file {
        debug!(file = %file.display(), "using config file");
    }
    let connection = config.connection()?;
    let client = jenkins::Client::connect(&connection).context("cannot create jenkins client")?;
    let engine = JobEngine::new(Arc::new(client), &connection);

    match job {
        "list" => job_list(&engine, args).await,
        "start" => job_start(&engine, args).await,
        "stop" => job_stop(&engine, args).await,
        other => anyhow::bail!("unknown job subcommand: {}", other),
    }
}

fn minutes(args: &ArgMatches<'_>, name: &str) -> anyhow::Result<u32> {
    match args.value_of(name) {
        None => Ok(0),
        Some(value) => value
            .parse()
            .with_context(|| format!("--{} expects a number of minutes, got {}", name, value)),
    }
}

fn filter_from(args: &ArgMatches<'_>) -> anyhow::Result<FilterSpec> {
    let status = match args.value_of("status") {
        Some(status) => status.parse()?,
        None => StatusClass::All,
    };
    Ok(FilterSpec {
        name: args.value_of("name").unwrap_or_default().to_string(),
        status,
        age_min_minutes: minutes(args, "minimum-age")?,
        age_max_minutes: minutes(args, "maximum-age")?,
    })
}

fn print_outcome(job: &Job, outcome: &Outcome) {
    if let Some(report) = outcome.report(&job.name) {
        println!("{}", report);
    }
}

async fn job_list(engine: &Engine, args: &ArgMatches<'_>) -> anyhow::Result<()> {
    let jobs = engine.filtered(&filter_from(args)?).await?;
    if jobs.is_empty() {
        return Err(Error::NoJobsMatched.into());
    }
    println!("{}", table::render(&jobs));
    Ok(())
}

async fn job_start(engine: &Engine, args: &ArgMatches<'_>) -> anyhow::Result<()> {
    let jobs = engine.filtered(&filter_from(args)?).await?;
    if jobs.is_empty() {
        return Err(Error::NoJobsMatched.into());
    }

    let schedule = args.value_of("schedule").filter(|s| !s.is_empty());
    let action = match schedule {
        Some(_) => {
            println!("\nJobs to be scheduled :");
            "schedule"
        }
        None => {
            println!("\nJobs to be started :");
            "start"
        }
    };
    println!("{}", table::render(&jobs));
    if !args.is_present("force") {
        confirm(action)?;
    }

    match schedule {
        Some(schedule) => {
            println!("Scheduling jobs...");
            engine.schedule(&jobs, schedule, print_outcome).await?;
        }
        None => {
            println!("Starting jobs...");
            engine.start(&jobs, print_outcome).await?;
        }
    }
    Ok(())
}

async fn job_stop(engine: &Engine, args: &ArgMatches<'_>) -> anyhow::Result<()> {
    let filter = FilterSpec {
        status: StatusClass::Running,
        ..filter_from(args)?
    };
    let jobs = engine.filtered(&filter).await?;
    if jobs.is_empty() {
        println!("all jobs are in stopped state");
        return Ok(());
    }

    println!("\nJobs to be stopped :");
    println!("{}", table::render(&jobs));
    if !args.is_present("force") {
        confirm("stop")?;
    }
    println!("Stopping jobs...");
    engine.stop(&jobs, print_outcome).await?;
    Ok(())
}

fn confirm(action: &str) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    ask_user_for_yes_or_no(&mut stdin.lock(), &mut stdout.lock(), action)
}

fn ask_user_for_yes_or_no<R, W>(input: &mut R, output: &mut W, action: &str) -> anyhow::Result<()>
where
    R: BufRead,
    W: Write,
{
    write!(output, "\nDo you want to {} these jobs ? (yes or no): ", action)?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    match answer.trim() {
        "yes" => {
            writeln!(output)?;
            Ok(())
        }
        "no" => Err(Error::UserCancelled.into()),
        other => Err(Error::UnrecognizedAnswer(other.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sub_args(argv: &[&str]) -> ArgMatches<'static> {
        let matches = app().get_matches_from_safe(argv.iter().copied()).unwrap();
        let (_, job) = matches.subcommand();
        let (_, args) = job.unwrap().subcommand();
        args.unwrap().clone()
    }

    #[test]
    fn list_flags_become_a_filter() {
        let args = sub_args(&[
            "jenkinsctl",
            "job",
            "list",
            "--status",
            "failure",
            "--minimum-age",
            "30",
            "--maximum-age",
            "120",
        ]);
        let filter = filter_from(&args).unwrap();

        assert_eq!(filter.status, StatusClass::Failure);
        assert_eq!(filter.age_min_minutes, 30);
        assert_eq!(filter.age_max_minutes, 120);
        assert!(filter.name.is_empty());
    }

    #[test]
    fn defaults_select_everything() {
        let filter = filter_from(&sub_args(&["jenkinsctl", "job", "list"])).unwrap();
        assert_eq!(filter, FilterSpec::default());
    }

    #[test]
    fn stop_has_no_status_flag() {
        let result = app().get_matches_from_safe(vec!["jenkinsctl", "job", "stop", "--status", "all"]);
        assert!(result.is_err());

        let args = sub_args(&["jenkinsctl", "job", "stop", "--name", "deploy", "--force"]);
        assert!(args.is_present("force"));
        assert_eq!(filter_from(&args).unwrap().name, "deploy");
    }

    #[test]
    fn unknown_status_is_rejected() {
        let result = app().get_matches_from_safe(vec!["jenkinsctl", "job", "list", "--status", "sleeping"]);
        assert!(result.is_err());
    }

    #[test]
    fn negative_age_is_rejected() {
        let args = sub_args(&["jenkinsctl", "job", "list", "--minimum-age=-5"]);
        assert!(filter_from(&args).is_err());
    }

    #[test]
    fn yes_confirms() {
        let mut output = Vec::new();
        ask_user_for_yes_or_no(&mut Cursor::new("yes\n"), &mut output, "start").unwrap();
        let prompt = String::from_utf8(output).unwrap();
        assert!(prompt.contains("Do you want to start these jobs ? (yes or no): "));
    }

    #[test]
    fn no_cancels() {
        let err = ask_user_for_yes_or_no(&mut Cursor::new("no\n"), &mut Vec::new(), "stop").unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UserCancelled)));
    }

    #[test]
    fn anything_else_is_unrecognized() {
        let err = ask_user_for_yes_or_no(&mut Cursor::new("maybe\n"), &mut Vec::new(), "stop").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::UnrecognizedAnswer(answer)) if answer == "maybe"
        ));
    }
}
