use crate::config::{BackendKind, CacheOptions, RemoteOptions};
use crate::pcache::KeyMode;
use anyhow::{anyhow, Result};
use clap::{command, value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const LOGGING_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
pub const DISK_BACKENDS: [&str; 2] = ["trie", "pmap"];
pub const ALL_BACKENDS: [&str; 3] = ["trie", "pmap", "remote"];
pub const KEY_MODES: [&str; 2] = ["hash", "structural"];

pub fn expect_arg<'a>(m: &'a ArgMatches, arg: &str) -> &'a str {
    m.get_one::<String>(arg)
        .map(String::as_str)
        .unwrap_or_else(|| panic!("argument \"{}\" has to be set in CLI at all times", arg))
}

pub fn expect_cache_dir(m: &ArgMatches) -> PathBuf {
    PathBuf::from(expect_arg(m, "cache-dir"))
}

/// Backends selected with `--backend`, in the order given.
pub fn selected_backends(m: &ArgMatches) -> Vec<BackendKind> {
    m.try_get_many::<String>("backend")
        .ok()
        .flatten()
        .into_iter()
        .flatten()
        .filter_map(|name| BackendKind::from_str(name).ok())
        .collect()
}

/// Cache options given on the command line. Options a subcommand does not
/// define keep their defaults.
pub fn cache_options(m: &ArgMatches) -> Result<CacheOptions> {
    let defaults = CacheOptions::default();
    let backends = match selected_backends(m) {
        backends if backends.is_empty() => defaults.backends,
        backends => backends,
    };

    let remote_requested = backends.contains(&BackendKind::Remote)
        || optional::<String>(m, "remote-address").is_some();
    let remote = if remote_requested {
        Some(remote_options(m)?)
    } else {
        None
    };

    Ok(CacheOptions {
        path: expect_cache_dir(m),
        backends,
        try_all: flag(m, "try-all"),
        name_normalization: flag(m, "name-normalization"),
        algebra_normalization: flag(m, "algebra-normalization"),
        collect_only: flag(m, "collect-only"),
        remote,
    })
}

fn remote_options(m: &ArgMatches) -> Result<RemoteOptions> {
    let defaults = RemoteOptions::default();
    let key_mode = match optional::<String>(m, "remote-key-mode") {
        Some(mode) => {
            KeyMode::from_str(&mode).map_err(|_| anyhow!("unknown key mode {}", mode))?
        }
        None => defaults.key_mode,
    };

    Ok(RemoteOptions {
        address: optional(m, "remote-address").unwrap_or(defaults.address),
        port: optional(m, "remote-port").unwrap_or(defaults.port),
        database: optional(m, "remote-db").unwrap_or(defaults.database),
        namespace: optional(m, "remote-namespace").unwrap_or(defaults.namespace),
        key_mode,
        wait: optional(m, "remote-wait")
            .map(Duration::from_millis)
            .unwrap_or(defaults.wait),
    })
}

fn optional<T>(m: &ArgMatches, arg: &str) -> Option<T>
where
    T: Clone + Send + Sync + 'static,
{
    m.try_get_one::<T>(arg).ok().flatten().cloned()
}

fn flag(m: &ArgMatches, arg: &str) -> bool {
    optional::<bool>(m, arg).unwrap_or(false)
}

fn name_normalization_arg() -> Arg {
    Arg::new("name-normalization")
        .help("Operate on the cache of name-normalized keys")
        .long("name-normalization")
        .action(ArgAction::SetTrue)
}

fn switch(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).help(help).long(name).action(ArgAction::SetTrue)
}

fn remote_args() -> [Arg; 6] {
    [
        Arg::new("remote-address")
            .help("Host of the redis server used by the remote backend")
            .long("remote-address")
            .value_name("HOST"),
        Arg::new("remote-port")
            .help("Port of the redis server")
            .long("remote-port")
            .value_name("PORT")
            .value_parser(value_parser!(u16)),
        Arg::new("remote-db")
            .help("Redis database number")
            .long("remote-db")
            .value_name("NUMBER")
            .value_parser(value_parser!(u32)),
        Arg::new("remote-namespace")
            .help("Prefix of every remote key")
            .long("remote-namespace")
            .value_name("PREFIX"),
        Arg::new("remote-key-mode")
            .help("How remote keys are derived from constraint sets")
            .long("remote-key-mode")
            .value_name("MODE")
            .value_parser(KEY_MODES),
        Arg::new("remote-wait")
            .help("Milliseconds to wait for a remote answer")
            .long("remote-wait")
            .value_name("MILLIS")
            .value_parser(value_parser!(u64)),
    ]
}

fn cache_dir_arg() -> Arg {
    Arg::new("cache-dir")
        .help("Directory holding the cache shards")
        .short('c')
        .long("cache-dir")
        .value_name("DIR")
        .default_value("pcache")
}

fn backend_arg() -> Arg {
    Arg::new("backend")
        .help("Disk backend to operate on, may be repeated")
        .short('b')
        .long("backend")
        .value_name("BACKEND")
        .value_parser(DISK_BACKENDS)
        .action(ArgAction::Append)
        .default_values(DISK_BACKENDS)
}

pub fn args() -> Command {
    command!()
        .arg(
            Arg::new("verbose")
                .help("configure logging level to use")
                .short('v')
                .long("verbose")
                .value_name("LEVEL")
                .value_parser(LOGGING_LEVELS)
                .default_value(LOGGING_LEVELS[2])
                .global(true),
        )
        .subcommand(
            Command::new("stats")
                .about("Print entry counts and shard sizes of a persistent cache")
                .arg(cache_dir_arg())
                .arg(backend_arg())
                .arg(name_normalization_arg()),
        )
        .subcommand(
            Command::new("dump")
                .about("Print the trie of a persistent cache")
                .arg(cache_dir_arg())
                .arg(name_normalization_arg()),
        )
        .subcommand(
            Command::new("compact")
                .about("Merge all shards of a persistent cache into one")
                .arg(cache_dir_arg())
                .arg(backend_arg())
                .arg(name_normalization_arg()),
        )
        .subcommand(
            Command::new("lookup")
                .about("Look up a constraint set in the configured cache pipeline")
                .arg(
                    Arg::new("input-file")
                        .help("JSON list of serialized constraints")
                        .value_name("FILE")
                        .required(true),
                )
                .arg(cache_dir_arg())
                .arg(
                    Arg::new("backend")
                        .help("Backend to consult in priority order, may be repeated")
                        .short('b')
                        .long("backend")
                        .value_name("BACKEND")
                        .value_parser(ALL_BACKENDS)
                        .action(ArgAction::Append)
                        .default_value(ALL_BACKENDS[0]),
                )
                .arg(switch("try-all", "Fall back to subset and superset matches"))
                .arg(name_normalization_arg())
                .arg(switch(
                    "algebra-normalization",
                    "Rewrite comparisons into strict form before the lookup",
                ))
                .arg(switch("collect-only", "Record keys without answering from the cache"))
                .args(remote_args()),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
}
