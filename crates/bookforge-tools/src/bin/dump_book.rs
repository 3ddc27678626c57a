//! バイナリ定跡の中身を表示する
//!
//! 1行1レコード: `局面キー(16進) 指し手(UCI) スコア`

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use bookforge_core::compactor::read_book;
use bookforge_tools::chess::move_to_uci;
use bookforge_tools::cli::init_logger;
use bookforge_tools::io::open_reader;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "dump_book")]
#[command(about = "バイナリ定跡のレコードを人が読める形で表示する")]
struct Cli {
    /// 定跡ファイル（`.gz` 可）
    book: PathBuf,

    /// この局面キー（16進）のレコードだけ表示
    #[arg(long)]
    key: Option<String>,

    /// 表示する最大件数
    #[arg(long)]
    limit: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(true);

    let key = cli
        .key
        .as_deref()
        .map(|k| u64::from_str_radix(k.trim_start_matches("0x"), 16))
        .transpose()
        .context("--key must be a hexadecimal position key")?;

    let mut reader = open_reader(&cli.book)
        .with_context(|| format!("failed to open book {}", cli.book.display()))?;
    let entries = read_book(&mut reader)
        .with_context(|| format!("failed to read book {}", cli.book.display()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let selected = entries
        .iter()
        .filter(|e| key.is_none_or(|k| e.key.raw() == k))
        .take(cli.limit.unwrap_or(usize::MAX));
    for entry in selected {
        writeln!(out, "{:016x} {} {}", entry.key, move_to_uci(entry.move_id), entry.score)?;
    }
    out.flush()?;
    Ok(())
}
