//! PGN から定跡を作る
//!
//! - `--kv-store`（既定）: KV ストアへパスごとにバッチ書き出し
//! - `--bin`: 全体を1パスで集計し、Polyglot 形式のバイナリ定跡を書く
//!
//! 例:
//! ```text
//! make_book --pgn games.pgn.gz --kv-store out/game_index.db --num-batch-games 50000
//! make_book --pgn games.pgn --bin book.bin --max-ply 30 --min-game 5 --min-score 45
//! ```

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bookforge_core::{
    BinaryBookSink, BookBuilder, BookConfig, BookSink, KvSink, MemoryStore, OutputMode, RunSummary,
    SqliteStore,
};
use bookforge_tools::chess::decode_game;
use bookforge_tools::cli::{LayoutArg, init_logger, percent_to_fraction};
use bookforge_tools::io::{open_reader, open_writer};
use bookforge_tools::pgn::PgnReader;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser, Debug)]
#[command(name = "make_book")]
#[command(about = "PGN棋譜から局面ごとの集計を作り、KVストアまたはバイナリ定跡へ書き出す")]
struct Cli {
    /// 入力PGN（`-` で標準入力、`.gz` 可）
    #[arg(long, default_value = "book.pgn")]
    pgn: PathBuf,

    /// バイナリ定跡の出力先（指定するとバッチ書き出しは無効）
    #[arg(long, conflicts_with = "kv_store")]
    bin: Option<PathBuf>,

    /// KVストアの出力先
    #[arg(long)]
    kv_store: Option<PathBuf>,

    /// KVストアのレコード配置
    #[arg(long, value_enum)]
    layout: Option<LayoutArg>,

    /// 設定ファイル（TOML）。以下のオプションで上書きされる
    #[arg(long)]
    config: Option<PathBuf>,

    /// 集計する最大手数
    #[arg(long)]
    max_ply: Option<u32>,

    /// 定跡に残す最低出現回数
    #[arg(long = "min-game")]
    min_games: Option<u32>,

    /// 定跡に残す最低期待得点（パーセント）
    #[arg(long)]
    min_score: Option<f64>,

    /// 白番の局面だけ残す
    #[arg(long, conflicts_with = "only_black")]
    only_white: bool,

    /// 黒番の局面だけ残す
    #[arg(long)]
    only_black: bool,

    /// 勝率を無視して一様スコアにする
    #[arg(long)]
    uniform: bool,

    /// 両対局者に要求する最低レーティング
    #[arg(long)]
    min_elo: Option<u32>,

    /// バッチ書き出しの間隔（対局数）
    #[arg(long = "num-batch-games")]
    batch_games: Option<u64>,

    /// 出力せずに集計だけ行う
    #[arg(long)]
    dry_run: bool,

    /// 進捗表示と info ログを抑制
    #[arg(short, long)]
    quiet: bool,
}

fn build_config(cli: &Cli) -> Result<BookConfig> {
    let mut config = match &cli.config {
        Some(path) => BookConfig::load(path)?,
        None => BookConfig::default(),
    };

    if let Some(v) = cli.max_ply {
        config.max_ply = v;
    }
    if let Some(v) = cli.min_games {
        config.min_games = v;
    }
    if let Some(v) = cli.min_score {
        config.min_score = percent_to_fraction(v);
    }
    if let Some(v) = cli.min_elo {
        config.min_elo = v;
    }
    if let Some(v) = cli.batch_games {
        config.batch_games = Some(v);
    }
    if cli.only_white {
        config.exclude_black = true;
    }
    if cli.only_black {
        config.exclude_white = true;
    }
    if cli.uniform {
        config.uniform = true;
    }

    if let Some(path) = &cli.bin {
        config.output = OutputMode::Binary { path: path.clone() };
    } else if let Some(path) = &cli.kv_store {
        let layout = match &config.output {
            OutputMode::Store { layout, .. } => *layout,
            OutputMode::Binary { .. } => Default::default(),
        };
        config.output = OutputMode::Store {
            path: path.clone(),
            layout,
        };
    }
    if let (Some(arg), OutputMode::Store { layout, .. }) = (cli.layout, &mut config.output) {
        *layout = arg.into();
    }

    config.validate()?;
    Ok(config)
}

fn progress_bar(quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} [{elapsed_precise}] {pos} games ({per_sec}) {msg}")?,
    );
    progress.enable_steady_tick(Duration::from_millis(200));
    Ok(progress)
}

/// 棋譜を全部読んで sink に書き出す
fn ingest<S: BookSink>(
    config: &BookConfig,
    sink: S,
    reader: Box<dyn BufRead>,
    source_name: &str,
    progress: &ProgressBar,
) -> Result<(RunSummary, S)> {
    let mut builder = BookBuilder::new(config, sink)?.with_source_name(source_name);
    let limit = config.max_ply as usize;

    for game in PgnReader::new(reader) {
        let game = game.with_context(|| format!("failed to read {source_name}"))?;
        let mut record = game.record();
        let mut session = builder.begin_game(&mut record)?;

        if !session.is_excluded() {
            match decode_game(&game, limit) {
                Ok(decoded) => {
                    for ply in &decoded.plies {
                        builder.record_ply(&mut session, ply.key, ply.move_id, ply.side);
                    }
                    if let Some(illegal) = decoded.illegal {
                        log::warn!(
                            "game {} (byte {}): illegal move {:?} at ply {}: {}",
                            session.game_id(),
                            game.offset,
                            illegal.san,
                            illegal.ply + 1,
                            illegal.reason
                        );
                        builder.mark_truncated(&mut session);
                    }
                }
                Err(e) => {
                    log::warn!("game {} (byte {}): {e}", session.game_id(), game.offset);
                    builder.mark_truncated(&mut session);
                }
            }
        }

        builder.end_game(session)?;
        progress.inc(1);
    }

    progress.set_message("writing final pass...");
    let out = builder.finish()?;
    progress.finish_and_clear();
    Ok(out)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.quiet);
    let config = build_config(&cli)?;

    let reader = open_reader(&cli.pgn)
        .with_context(|| format!("failed to open PGN {}", cli.pgn.display()))?;
    let source_name = cli.pgn.display().to_string();
    let progress = progress_bar(cli.quiet)?;

    let summary = match &config.output {
        OutputMode::Store { layout, .. } if cli.dry_run => {
            let sink = KvSink::new(MemoryStore::new(), *layout);
            let (summary, sink) = ingest(&config, sink, reader, &source_name, &progress)?;
            log::info!("dry run: {} keys would be written", sink.store().len());
            summary
        }
        OutputMode::Binary { .. } if cli.dry_run => {
            let sink = BinaryBookSink::new(std::io::sink(), config.filter());
            let (summary, sink) = ingest(&config, sink, reader, &source_name, &progress)?;
            log::info!("dry run: {} book records would be written", sink.records_written());
            summary
        }
        OutputMode::Store { path, layout } => {
            let store = SqliteStore::open(path)
                .with_context(|| format!("failed to open kv store {}", path.display()))?;
            let (summary, _) = ingest(&config, KvSink::new(store, *layout), reader, &source_name, &progress)?;
            summary
        }
        OutputMode::Binary { path } => {
            let writer = open_writer(path)
                .with_context(|| format!("failed to create book {}", path.display()))?;
            let sink = BinaryBookSink::new(writer, config.filter());
            let (summary, sink) = ingest(&config, sink, reader, &source_name, &progress)?;
            let records = sink.records_written();
            sink.into_writer()
                .close()
                .with_context(|| format!("failed to finalize book {}", path.display()))?;
            log::info!("wrote {records} records to {}", path.display());
            summary
        }
    };

    println!(
        "{} games ({} skipped by rating, {} truncated), {} passes",
        summary.total_games, summary.skipped_games, summary.truncated_games, summary.num_passes
    );
    Ok(())
}
