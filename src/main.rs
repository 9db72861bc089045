use anyhow::Result;
use clap::Parser;
use shup::cli::Cli;
use shup::config::{self, Rule, RuleSet};
use shup::utils::error::exit_code;
use shup::utils::interrupt::Interrupt;
use shup::{logger, ssh};
use std::process;

fn main() {
    let cli = Cli::parse();
    logger::init_logger(cli.verbose);

    let interrupt = Interrupt::new();
    if let Err(e) = interrupt.install().and_then(|_| run(&cli, &interrupt)) {
        process::exit(exit_code(&e));
    }
}

fn run(cli: &Cli, interrupt: &Interrupt) -> Result<()> {
    let rules = RuleSet::load(&config::config_paths())?;
    let rule = Rule::resolve(&rules, &cli.rule, &cli.overrides())?;

    let client = ssh::open_session(&rule.connection, interrupt)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    shup::run(&client, &rule, &cli.files, interrupt, cli.show_progress(), &mut out)
}
