#[macro_use]
extern crate clap;

#[macro_use]
extern crate slog;

use std::io;
use std::path::PathBuf;

use clap::ArgAction;
use clap_complete::{generate, Shell};
use slog::Drain;

use gitnarrate::grouper::OneGroupPerChunk;

fn main() {
    let args = command!()
        .about("Rewrite the diff between two commits into a coherent, linear sequence of commits")
        .arg(
            clap::Arg::new("base")
                .help("Base commit to diff from [default: HEAD]")
                .short('b')
                .long("base"),
        )
        .arg(
            clap::Arg::new("target")
                .help("Commit holding the changes to narrate [default: HEAD]")
                .short('t')
                .long("target"),
        )
        .arg(
            clap::Arg::new("path")
                .help("Restrict the diff to this file or directory")
                .short('p')
                .long("path"),
        )
        .arg(
            clap::Arg::new("branch")
                .help("Point this branch at the synthesized history instead of printing the tip commit")
                .short('B')
                .long("branch"),
        )
        .arg(
            clap::Arg::new("dry-run")
                .help("Don't create any commits or refs")
                .short('n')
                .long("dry-run")
                .action(ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("verbose")
                .help("Display more output")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("max-stack")
                .help("Override narrate.maxStack for this run")
                .long("max-stack")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            clap::Arg::new("similarity")
                .help("Override narrate.similarity for this run")
                .long("similarity")
                .value_parser(clap::value_parser!(u8)),
        )
        .arg(
            clap::Arg::new("gen-completions")
                .help("Generate completions")
                .long("gen-completions")
                .value_parser(["bash", "fish", "zsh", "powershell", "elvish"]),
        );
    let mut args_clone = args.clone();
    let args = args.get_matches();

    if let Some(shell) = args.get_one::<String>("gen-completions") {
        let app_name = "git-narrate";
        match shell.as_str() {
            "bash" => {
                generate(Shell::Bash, &mut args_clone, app_name, &mut io::stdout());
            }
            "fish" => {
                generate(Shell::Fish, &mut args_clone, app_name, &mut io::stdout());
            }
            "zsh" => {
                generate(Shell::Zsh, &mut args_clone, app_name, &mut io::stdout());
            }
            "powershell" => {
                generate(
                    Shell::PowerShell,
                    &mut args_clone,
                    app_name,
                    &mut io::stdout(),
                );
            }
            "elvish" => {
                generate(Shell::Elvish, &mut args_clone, app_name, &mut io::stdout());
            }
            _ => unreachable!(),
        }
        return;
    }

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog::LevelFilter::new(
        drain,
        if args.get_flag("verbose") {
            slog::Level::Debug
        } else {
            slog::Level::Info
        },
    )
    .fuse();
    let mut logger = slog::Logger::root(drain, o!());
    if args.get_flag("verbose") {
        logger = logger.new(o!(
            "module" => slog::FnValue(|record| record.module()),
            "line" => slog::FnValue(|record| record.line()),
        ));
    }

    if let Err(e) = run(&args, &logger) {
        crit!(logger, "narrate failed"; "err" => e.to_string());
        drop(logger);
        std::process::exit(1);
    }
}

fn run(args: &clap::ArgMatches, logger: &slog::Logger) -> anyhow::Result<()> {
    let repo = git2::Repository::open_from_env()?;

    let base = args
        .get_one::<String>("base")
        .cloned()
        .unwrap_or_else(|| "HEAD".to_string());
    let target = args
        .get_one::<String>("target")
        .cloned()
        .unwrap_or_else(|| "HEAD".to_string());
    let path = args.get_one::<String>("path").map(PathBuf::from);
    let dry_run = args.get_flag("dry-run");

    if let Some(similarity) = args.get_one::<u8>("similarity") {
        repo.config()?
            .set_i64(gitnarrate::config::SIMILARITY_CONFIG_NAME, *similarity as i64)?;
    }
    if let Some(max_stack) = args.get_one::<usize>("max-stack") {
        repo.config()?
            .set_i64(gitnarrate::config::MAX_STACK_CONFIG_NAME, *max_stack as i64)?;
    }

    let progress = |phase: &str, done: u32, total: u32| {
        info!(logger, "progress"; "phase" => phase, "done" => done, "total" => total);
    };

    let head = gitnarrate::run_pipeline(
        logger,
        &repo,
        &base,
        &target,
        path.as_deref(),
        &OneGroupPerChunk,
        None,
        None,
        Some(&progress),
    )?;

    let Some(head) = head else {
        info!(logger, "no changes to narrate");
        return Ok(());
    };

    info!(logger, "narrated history synthesized"; "tip" => head.to_string());

    if dry_run {
        info!(logger, "dry run, not updating any ref");
        return Ok(());
    }

    if let Some(branch) = args.get_one::<String>("branch") {
        let commit = repo.find_commit(head)?;
        repo.branch(branch, &commit, true)?;
        info!(logger, "branch updated"; "branch" => branch, "tip" => head.to_string());
    } else {
        println!("{head}");
    }

    Ok(())
}
