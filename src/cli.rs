use clap::{command, value_parser, Arg, ArgAction, ArgMatches, Command};
use lazy_static::lazy_static;
use regex::Regex;
use std::{any::Any, path::PathBuf, str::FromStr};
use symtaint::register::Register;

pub const LOGGING_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

lazy_static! {
    static ref MEMORY_RANGE: Regex =
        Regex::new(r"^(0x[0-9a-fA-F]+|[0-9]+):([0-9]+)$").expect("valid regular expression");
}

pub fn expect_arg<'a, T>(m: &'a ArgMatches, arg: &str) -> &'a T
where
    T: Any + Clone + Send + Sync + 'static,
{
    m.get_one::<T>(arg)
        .unwrap_or_else(|| panic!("argument \"{}\" has to be set in CLI at all times", arg))
}

fn parse_register(v: &str) -> Result<Register, String> {
    Register::from_str(v).map_err(|_| format!("\"{}\" is not a general purpose register or flag", v))
}

fn parse_number(v: &str) -> Result<u64, String> {
    match v.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => v.parse::<u64>(),
    }
    .map_err(|e| e.to_string())
}

/// `ADDR:SIZE`, address in decimal or `0x` hex, size in bytes.
pub fn parse_memory_range(v: &str) -> Result<(u64, u32), String> {
    let captures = MEMORY_RANGE
        .captures(v)
        .ok_or_else(|| format!("\"{}\" is not of the form ADDR:SIZE", v))?;

    let address = parse_number(&captures[1])?;
    let size = captures[2].parse::<u32>().map_err(|e| e.to_string())?;

    let valid_range = 1_u32..=1024_u32;

    if !valid_range.contains(&size) {
        return Err(String::from("memory range size has to be in range: 1 - 1024"));
    }

    Ok((address, size))
}

pub fn args() -> Command {
    command!()
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("configure logging level to use")
                .value_name("LEVEL")
                .value_parser(LOGGING_LEVELS)
                .default_value(LOGGING_LEVELS[2])
                .global(true),
        )
        .subcommand(
            Command::new("replay")
                .about("Replay a JSON log of retired instructions through the engines")
                .arg(
                    Arg::new("input-file")
                        .value_name("FILE")
                        .help("JSON array of instruction events")
                        .value_parser(value_parser!(PathBuf))
                        .required(true),
                )
                .arg(
                    Arg::new("smt")
                        .help("Write the definitions of the trace as SMT-LIB2 to this file")
                        .long("smt")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("taint")
                        .help("Mark a register as untrusted input")
                        .short('t')
                        .long("taint")
                        .value_name("REG")
                        .value_parser(parse_register)
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("taint-mem")
                        .help("Mark a memory range as untrusted input")
                        .short('m')
                        .long("taint-mem")
                        .value_name("ADDR:SIZE")
                        .value_parser(parse_memory_range)
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("taint-args")
                        .help("Mark the argument registers as untrusted input")
                        .long("taint-args")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("thread")
                        .help("Thread the register taint sources belong to")
                        .long("thread")
                        .value_name("TID")
                        .value_parser(value_parser!(u32))
                        .default_value("0"),
                )
                .arg(
                    Arg::new("json")
                        .help("Print one JSON record per instruction instead of text")
                        .long("json")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_ranges_accept_hex_and_decimal_addresses() {
        assert_eq!(parse_memory_range("0x1000:8"), Ok((0x1000, 8)));
        assert_eq!(parse_memory_range("4096:2"), Ok((4096, 2)));
        assert!(parse_memory_range("0x1000").is_err());
        assert!(parse_memory_range("0x1000:0").is_err());
        assert!(parse_memory_range("rax:8").is_err());
    }

    #[test]
    fn memory_range_sizes_are_bounded() {
        assert_eq!(parse_memory_range("0:1024"), Ok((0, 1024)));
        assert_eq!(
            parse_memory_range("0:4000000000"),
            Err(String::from("memory range size has to be in range: 1 - 1024"))
        );
        assert!(parse_memory_range("0:99999999999").is_err());
    }

    #[test]
    fn replay_collects_repeated_taint_sources() {
        let m = args()
            .try_get_matches_from([
                "symtaint", "replay", "events.json", "-t", "rdi", "--taint", "RSI", "-m",
                "0x10:4", "--taint-args",
            ])
            .unwrap();
        let (_, replay) = m.subcommand().unwrap();

        let registers = replay
            .get_many::<Register>("taint")
            .unwrap()
            .copied()
            .collect::<Vec<_>>();

        assert_eq!(registers, vec![Register::Rdi, Register::Rsi]);
        assert!(replay.get_flag("taint-args"));
        assert_eq!(*expect_arg::<u32>(replay, "thread"), 0);
        assert_eq!(expect_arg::<String>(replay, "verbose"), "info");
    }
}
