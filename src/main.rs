mod cli;

use anyhow::{Context, Result};
use clap::ArgMatches;
use cli::{expect_arg, LOGGING_LEVELS};
use log::{error, info};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::PathBuf,
};
use symtaint::{
    register::Register,
    session::{InstructionEvent, Session, SessionOptions, TaintSource},
};

fn main() -> Result<()> {
    let matches = cli::args().get_matches();

    let level = matches
        .get_one::<String>("verbose")
        .map(String::as_str)
        .unwrap_or(LOGGING_LEVELS[2]);

    env_logger::Builder::new().parse_filters(level).init();

    match matches.subcommand() {
        Some(("replay", args)) => replay(args),
        _ => unreachable!(),
    }
}

fn taint_sources(args: &ArgMatches) -> Vec<TaintSource> {
    let thread = *expect_arg::<u32>(args, "thread");

    let registers = args
        .get_many::<Register>("taint")
        .into_iter()
        .flatten()
        .map(|register| TaintSource::Register {
            thread,
            register: *register,
        });

    let memory = args
        .get_many::<(u64, u32)>("taint-mem")
        .into_iter()
        .flatten()
        .map(|(address, size)| TaintSource::Memory {
            address: *address,
            size: *size,
        });

    let arguments = args
        .get_flag("taint-args")
        .then_some(TaintSource::Arguments { thread });

    registers.chain(memory).chain(arguments).collect()
}

fn replay(args: &ArgMatches) -> Result<()> {
    let input = expect_arg::<PathBuf>(args, "input-file");

    let content = fs::read_to_string(input)
        .with_context(|| format!("could not read {}", input.display()))?;

    let events: Vec<InstructionEvent> =
        serde_json::from_str(&content).context("could not parse instruction events")?;

    let session = Session::new(SessionOptions {
        taint_sources: taint_sources(args),
        ..SessionOptions::default()
    });

    let records = match session.replay(&events) {
        Ok(records) => records,
        Err(e) => {
            error!("analysis session aborted: {}", e);
            return Err(e).context("replay failed");
        }
    };

    if args.get_flag("json") {
        for record in records.iter() {
            println!("{}", serde_json::to_string(record)?);
        }
    } else {
        session.with_trace(|trace| trace.iter().for_each(|inst| print!("{}", inst)));
    }

    if let Some(path) = args.get_one::<PathBuf>("smt") {
        let mut writer = BufWriter::new(
            File::create(path).with_context(|| format!("could not create {}", path.display()))?,
        );

        session.export_smt(&mut writer)?;
        writer.flush()?;

        info!("wrote SMT-LIB2 definitions to {}", path.display());
    }

    let statistics = session.statistics();

    info!(
        "instructions: {}, expressions: {}, tainted elements: {}",
        statistics.instructions, statistics.expressions, statistics.tainted_elements
    );

    Ok(())
}
