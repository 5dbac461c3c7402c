use anyhow::{Context, Result};
use bytesize::ByteSize;
use env_logger::Env;
use pcache::cli::{args, cache_options, expect_arg};
use pcache::config::{lookup, BackendKind, CacheOptions};
use pcache::expr::serialize::{Decoder, ExprRecord};
use pcache::expr::ArrayCache;
use pcache::pcache::map_of_sets::MAP_SHARD_PREFIX;
use pcache::pcache::shards::{existing_shards, replace_shards};
use pcache::pcache::trie_finder::TRIE_SHARD_PREFIX;
use pcache::pcache::{MapOfSetsFinder, TrieFinder};
use std::fs;
use std::path::Path;

fn main() -> Result<()> {
    let matches = args().get_matches();

    // process global flags
    let log_level = expect_arg(&matches, "verbose");

    let env = Env::default().default_filter_or(log_level);
    env_logger::init_from_env(env);

    // process subcommands
    match matches.subcommand() {
        Some(("stats", args)) => {
            let options = cache_options(args)?;
            let dir = options.storage_dir();

            for backend in options.backends {
                print_stats(&dir, backend)?;
            }

            Ok(())
        }
        Some(("dump", args)) => {
            let dir = cache_options(args)?.storage_dir();
            let finder = TrieFinder::load(&dir, &ArrayCache::new());

            print!("{}", finder.trie().dump());

            Ok(())
        }
        Some(("compact", args)) => {
            let options = cache_options(args)?;
            let dir = options.storage_dir();

            for backend in options.backends {
                compact(&dir, backend)?;
            }

            Ok(())
        }
        Some(("lookup", args)) => {
            let options = cache_options(args)?;
            let input = Path::new(expect_arg(args, "input-file"));

            print_lookup(&options, input)
        }
        _ => unreachable!(),
    }
}

fn print_stats(dir: &Path, backend: BackendKind) -> Result<()> {
    let arrays = ArrayCache::new();
    let (prefix, entries) = match backend {
        BackendKind::Trie => (TRIE_SHARD_PREFIX, TrieFinder::load(dir, &arrays).len()),
        BackendKind::Pmap => (
            MAP_SHARD_PREFIX,
            MapOfSetsFinder::load(dir, &arrays).map().len(),
        ),
        BackendKind::Remote => return Ok(()),
    };

    println!("{}:", backend);
    println!("  entries:  {}", entries);

    let mut total = 0;
    for shard in existing_shards(dir, prefix) {
        let size = shard
            .metadata()
            .with_context(|| format!("failed to stat {}", shard.display()))?
            .len();
        total += size;
        println!("  {}  {}", shard.display(), ByteSize::b(size));
    }
    println!("  total:    {}", ByteSize::b(total));

    Ok(())
}

fn print_lookup(options: &CacheOptions, input: &Path) -> Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let records: Vec<ExprRecord> = serde_json::from_str(&text)
        .with_context(|| format!("{} is no list of serialized constraints", input.display()))?;

    let arrays = ArrayCache::new();
    let decoder = Decoder::new(&arrays);
    let constraints = records
        .iter()
        .map(|record| decoder.decode(record))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("malformed constraint in {}", input.display()))?;

    match lookup(options, &arrays, &constraints)? {
        None => println!("miss"),
        Some(None) => println!("unsat"),
        Some(Some(model)) => {
            println!("sat");
            for (array, bytes) in model.bindings() {
                println!("  {} = {:?}", array.name(), bytes);
            }
        }
    }

    Ok(())
}

fn compact(dir: &Path, backend: BackendKind) -> Result<()> {
    let arrays = ArrayCache::new();

    let prefix = match backend {
        BackendKind::Trie => TRIE_SHARD_PREFIX,
        BackendKind::Pmap => MAP_SHARD_PREFIX,
        BackendKind::Remote => return Ok(()),
    };

    let shards = existing_shards(dir, prefix).len();
    if shards == 0 {
        println!("{}: no shards in {}", backend, dir.display());
        return Ok(());
    }

    match backend {
        BackendKind::Trie => {
            let finder = TrieFinder::load(dir, &arrays);
            replace_shards(dir, prefix, &finder.trie().to_record())?;
        }
        _ => {
            let finder = MapOfSetsFinder::load(dir, &arrays);
            replace_shards(dir, prefix, &finder.map().to_record())?;
        }
    }

    println!("{}: compacted {} shards into one", backend, shards);

    Ok(())
}
