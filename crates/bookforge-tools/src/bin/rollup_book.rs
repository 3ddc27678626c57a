//! KVストアの全パスを合算してバイナリ定跡を書く
//!
//! `make_book --kv-store` でバッチ書き出しした Typed レイアウトのストアが対象。

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use bookforge_core::compactor::{compact, write_book};
use bookforge_core::rollup::{read_summary, rollup_passes};
use bookforge_core::{BookConfig, SqliteStore};
use bookforge_tools::cli::{init_logger, percent_to_fraction};
use bookforge_tools::io::open_writer;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "rollup_book")]
#[command(about = "KVストアの全パスを合算し、足切り・ソートしてバイナリ定跡を書く")]
struct Cli {
    /// 入力KVストア（Typed レイアウト）
    #[arg(long)]
    kv_store: PathBuf,

    /// 出力するバイナリ定跡
    #[arg(long)]
    bin: PathBuf,

    /// 設定ファイル（TOML）。足切り条件のみ使う
    #[arg(long)]
    config: Option<PathBuf>,

    /// 定跡に残す最低出現回数
    #[arg(long = "min-game")]
    min_games: Option<u32>,

    /// 定跡に残す最低期待得点（パーセント）
    #[arg(long)]
    min_score: Option<f64>,

    #[arg(long, conflicts_with = "only_black")]
    only_white: bool,

    #[arg(long)]
    only_black: bool,

    #[arg(long)]
    uniform: bool,

    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.quiet);

    let mut config = match &cli.config {
        Some(path) => BookConfig::load(path)?,
        None => BookConfig::default(),
    };
    if let Some(v) = cli.min_games {
        config.min_games = v;
    }
    if let Some(v) = cli.min_score {
        config.min_score = percent_to_fraction(v);
    }
    config.exclude_black |= cli.only_white;
    config.exclude_white |= cli.only_black;
    config.uniform |= cli.uniform;
    // 足切り条件だけ使うので出力先とバッチ間隔は見ない
    config.batch_games = None;
    config.validate()?;

    if !cli.kv_store.exists() {
        bail!("kv store not found: {}", cli.kv_store.display());
    }
    let store = SqliteStore::open(&cli.kv_store)
        .with_context(|| format!("failed to open kv store {}", cli.kv_store.display()))?;

    match read_summary(&store)? {
        Some(summary) => log::info!(
            "{}: {} games, {} passes",
            summary.source_name,
            summary.total_games,
            summary.num_passes
        ),
        None => log::warn!("{} has no run summary (unfinished run?)", cli.kv_store.display()),
    }

    let index = rollup_passes(&store)?;
    let entries = compact(index.iter(), &config.filter());

    let mut writer = open_writer(&cli.bin)
        .with_context(|| format!("failed to create book {}", cli.bin.display()))?;
    write_book(&mut writer, &entries)
        .with_context(|| format!("failed to write book {}", cli.bin.display()))?;
    writer
        .close()
        .with_context(|| format!("failed to finalize book {}", cli.bin.display()))?;

    println!(
        "{} positions rolled up, {} records written to {}",
        index.len(),
        entries.len(),
        cli.bin.display()
    );
    Ok(())
}
