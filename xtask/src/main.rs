use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;

mod scenarios;

/// Developer tasks: boot a hosted kernel and drive lifecycle scenarios.
#[derive(Parser)]
#[command(name = "xtask")]
struct Cli {
    /// Log kernel activity at debug level
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Every process forks WIDTH children down to DEPTH; each child exits
    /// with its depth and its parent checks the status.
    ForkTree {
        #[arg(long, default_value_t = 3)]
        depth: u32,
        #[arg(long, default_value_t = 3)]
        width: u32,
    },
    /// A parent forks COUNT children and exits at once; the orphans must be
    /// reclaimed without any wait.
    Orphans {
        #[arg(long, default_value_t = 16)]
        count: u32,
    },
    /// A parent forks CHILDREN that exit together, reaps them in reverse
    /// order and checks that a second wait fails.
    Reap {
        #[arg(long, default_value_t = 16)]
        children: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    kernel::logger::init(if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    });

    let started = Instant::now();
    let summary = match cli.cmd {
        Cmd::ForkTree { depth, width } => scenarios::fork_tree(depth, width)?,
        Cmd::Orphans { count } => scenarios::orphans(count)?,
        Cmd::Reap { children } => scenarios::reap(children)?,
    };

    println!("✅ {} ({:.2?})", summary, started.elapsed());
    Ok(())
}
