use crate::expr::{ArrayCache, ExprRef};
use crate::normalize::AlgebraNormalizer;
use crate::pcache::{
    Answer, CacheKey, ChainingFinder, CollectingFinder, Finder, KeyMode, MapOfSetsFinder, NameNormalizingFinder,
    RedisStore, RemoteFinder, TrieFinder,
};
use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, EnumString, EnumVariantNames};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumVariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    Trie,
    Pmap,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOptions {
    pub address: String,
    pub port: u16,
    pub database: u32,
    pub namespace: String,
    pub key_mode: KeyMode,
    pub wait: Duration,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            namespace: String::new(),
            key_mode: KeyMode::Hash,
            wait: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    pub path: PathBuf,
    pub backends: Vec<BackendKind>,
    pub try_all: bool,
    pub name_normalization: bool,
    pub algebra_normalization: bool,
    pub collect_only: bool,
    pub remote: Option<RemoteOptions>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pcache"),
            backends: vec![BackendKind::Trie],
            try_all: false,
            name_normalization: false,
            algebra_normalization: false,
            collect_only: false,
            remote: None,
        }
    }
}

impl CacheOptions {
    /// Directory the disk backends read and write. Normalized keys get a
    /// sibling directory of their own.
    pub fn storage_dir(&self) -> PathBuf {
        if self.name_normalization {
            let mut name = OsString::from(self.path.as_os_str());
            name.push("nn");
            PathBuf::from(name)
        } else {
            self.path.clone()
        }
    }
}

/// Assembles the finder pipeline: the configured backends in priority
/// order behind a chain, optionally wrapped for collect-only mode and for
/// name normalization.
pub fn build_finder(options: &CacheOptions, arrays: &ArrayCache) -> Result<Box<dyn Finder>> {
    if options.backends.is_empty() {
        bail!("at least one cache backend has to be configured");
    }

    let dir = options.storage_dir();
    let mut finders: Vec<Box<dyn Finder>> = Vec::with_capacity(options.backends.len());

    for backend in &options.backends {
        match backend {
            BackendKind::Trie => {
                prepare_dir(&dir)?;
                finders.push(Box::new(TrieFinder::load(&dir, arrays)));
            }
            BackendKind::Pmap => {
                prepare_dir(&dir)?;
                finders.push(Box::new(MapOfSetsFinder::load(&dir, arrays)));
            }
            BackendKind::Remote => match &options.remote {
                Some(remote) => finders.push(Box::new(
                    remote_finder(remote, arrays).context("invalid remote store options")?,
                )),
                None => warn!("remote backend requested without remote options, skipping it"),
            },
        }
    }

    if finders.is_empty() {
        bail!("no usable cache backend in {:?}", options.backends);
    }
    info!(
        "cache pipeline: {}",
        finders.iter().map(|f| f.name()).collect::<Vec<_>>().join(" -> ")
    );

    let mut finder: Box<dyn Finder> = Box::new(ChainingFinder::new(finders, options.try_all));
    if options.collect_only {
        finder = Box::new(CollectingFinder::new(finder));
    }
    if options.name_normalization {
        finder = Box::new(NameNormalizingFinder::new(finder, arrays));
    }
    Ok(finder)
}

/// Looks a constraint set up in the configured pipeline without a solver
/// behind it. `None` is a miss.
pub fn lookup(
    options: &CacheOptions,
    arrays: &ArrayCache,
    exprs: &[ExprRef],
) -> Result<Option<Answer>> {
    let key = if options.algebra_normalization {
        CacheKey::new(AlgebraNormalizer::new().normalize_all(exprs))
    } else {
        CacheKey::new(exprs.iter().cloned())
    };
    if key.is_empty() {
        bail!("cannot look up an empty constraint set");
    }

    let mut finder = build_finder(options, arrays)?;
    finder.prefetch(&key);
    Ok(finder.find(&key))
}

//
// Private Implementation
//

fn prepare_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create cache directory {}", dir.display()))
}

fn remote_finder(options: &RemoteOptions, arrays: &ArrayCache) -> Result<RemoteFinder> {
    let store = RedisStore::open(&options.address, options.port, options.database, options.wait)?;
    Ok(RemoteFinder::new(
        Arc::new(store),
        arrays,
        &options.namespace,
        options.key_mode,
        options.wait,
    ))
}
