//! Synthetic partition files.
//!
//! Writes `user_<id>.txt` files in either encoding so a run can be set up
//! without real data. Keys are unique across every generated partition and
//! appear in shuffled order within each file.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::error::{HarnessError, Result};
use crate::keys::{KeyEncoding, PartitionSource};
use crate::{Key, Partition};

/// Shape of the generated key space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum KeySpace {
    /// Keys drawn uniformly from the whole `u64` range.
    #[default]
    Uniform,
    /// Keys packed around a handful of random centers.
    Clustered,
}

const CLUSTERS: usize = 16;
const CLUSTER_SPREAD: u64 = 1 << 32;

/// `generate` subcommand arguments.
#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Partitions to write
    #[arg(long, value_delimiter = ',', default_values_t = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9])]
    pub partitions: Vec<Partition>,

    /// Keys written to each partition file
    #[arg(long, default_value_t = 100_000)]
    pub keys_per_partition: usize,

    /// RNG seed; the same seed writes the same files
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Encoding of the written files
    #[arg(long = "keys_file_type", alias = "keys-file-type", value_enum)]
    pub keys_file_type: KeyEncoding,

    /// Directory receiving `user_<id>.txt` files
    #[arg(long = "data_dir", alias = "data-dir", default_value = "./avg")]
    pub data_dir: PathBuf,

    /// Key distribution
    #[arg(long, value_enum, default_value_t = KeySpace::Uniform)]
    pub key_space: KeySpace,
}

#[derive(Clone, Debug)]
pub struct GenerateConfig {
    pub partitions: Vec<Partition>,
    pub keys_per_partition: usize,
    pub seed: u64,
    pub encoding: KeyEncoding,
    pub source: PartitionSource,
    pub key_space: KeySpace,
}

impl From<GenerateArgs> for GenerateConfig {
    fn from(args: GenerateArgs) -> Self {
        Self {
            partitions: args.partitions,
            keys_per_partition: args.keys_per_partition,
            seed: args.seed,
            encoding: args.keys_file_type,
            source: PartitionSource::new(args.data_dir),
            key_space: args.key_space,
        }
    }
}

struct KeyGen {
    rng: StdRng,
    centers: Vec<Key>,
    space: KeySpace,
    seen: HashSet<Key>,
}

impl KeyGen {
    fn new(seed: u64, space: KeySpace) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let centers = (0..CLUSTERS)
            .map(|_| rng.gen_range(0..u64::MAX - CLUSTER_SPREAD))
            .collect();
        Self {
            rng,
            centers,
            space,
            seen: HashSet::new(),
        }
    }

    fn draw(&mut self) -> Key {
        match self.space {
            KeySpace::Uniform => self.rng.gen(),
            KeySpace::Clustered => {
                let center = self.centers[self.rng.gen_range(0..self.centers.len())];
                center + self.rng.gen_range(0..CLUSTER_SPREAD)
            }
        }
    }

    /// `n` keys never returned before, in random order.
    fn fresh(&mut self, n: usize) -> Vec<Key> {
        let mut keys = Vec::with_capacity(n);
        while keys.len() < n {
            let key = self.draw();
            if self.seen.insert(key) {
                keys.push(key);
            }
        }
        keys.shuffle(&mut self.rng);
        keys
    }
}

fn write_keys<W: Write>(mut w: W, keys: &[Key], encoding: KeyEncoding) -> std::io::Result<()> {
    match encoding {
        KeyEncoding::Text => {
            for key in keys {
                writeln!(w, "{key}")?;
            }
        }
        KeyEncoding::Binary => {
            for key in keys {
                w.write_all(&key.to_le_bytes())?;
            }
        }
    }
    w.flush()
}

/// Write every configured partition file, overwriting existing ones.
pub fn generate(config: &GenerateConfig) -> Result<()> {
    fs::create_dir_all(config.source.root()).map_err(|source| HarnessError::OutputDir {
        path: config.source.root().to_path_buf(),
        source,
    })?;

    let mut gen = KeyGen::new(config.seed, config.key_space);
    for &partition in &config.partitions {
        let keys = gen.fresh(config.keys_per_partition);
        let path = config.source.path(partition);
        File::create(&path)
            .and_then(|file| write_keys(BufWriter::new(file), &keys, config.encoding))
            .map_err(|source| HarnessError::Generate {
                partition,
                path: path.clone(),
                source,
            })?;
        info!(
            partition,
            keys = keys.len(),
            encoding = config.encoding.as_str(),
            path = %path.display(),
            "wrote partition"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path, encoding: KeyEncoding, space: KeySpace) -> GenerateConfig {
        GenerateConfig {
            partitions: vec![0, 1, 2],
            keys_per_partition: 500,
            seed: 7,
            encoding,
            source: PartitionSource::new(dir),
            key_space: space,
        }
    }

    #[test]
    fn test_generated_files_load_back() {
        for encoding in [KeyEncoding::Text, KeyEncoding::Binary] {
            let dir = tempfile::tempdir().unwrap();
            let cfg = config(dir.path(), encoding, KeySpace::Uniform);
            generate(&cfg).unwrap();

            let mut all = HashSet::new();
            for p in [0, 1, 2] {
                let keys = cfg.source.load(p, encoding).unwrap();
                assert_eq!(keys.len(), 500);
                all.extend(keys);
            }
            assert_eq!(all.len(), 1500);
        }
    }

    #[test]
    fn test_same_seed_same_files() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        generate(&config(a.path(), KeyEncoding::Binary, KeySpace::Clustered)).unwrap();
        generate(&config(b.path(), KeyEncoding::Binary, KeySpace::Clustered)).unwrap();
        for p in [0, 1, 2] {
            let name = format!("user_{p}.txt");
            assert_eq!(
                fs::read(a.path().join(&name)).unwrap(),
                fs::read(b.path().join(&name)).unwrap()
            );
        }
    }

    #[test]
    fn test_write_failure_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("user_1.txt")).unwrap();

        let err = generate(&config(dir.path(), KeyEncoding::Text, KeySpace::Uniform)).unwrap_err();
        match err {
            HarnessError::Generate { partition, path, .. } => {
                assert_eq!(partition, 1);
                assert_eq!(path, dir.path().join("user_1.txt"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Partitions before the failing one are already written.
        assert!(dir.path().join("user_0.txt").is_file());
    }

    #[test]
    fn test_clustered_keys_stay_near_centers() {
        let mut gen = KeyGen::new(3, KeySpace::Clustered);
        let centers = gen.centers.clone();
        for key in gen.fresh(1000) {
            assert!(centers
                .iter()
                .any(|&c| key >= c && key - c < CLUSTER_SPREAD));
        }
    }
}
