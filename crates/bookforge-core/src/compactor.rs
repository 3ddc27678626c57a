//! 最終圧縮（FinalCompactor）
//!
//! 集計全体を足切り → スコア付け → ソート → 16バイト固定長レコードへ書き出す。
//!
//! レコード形式（ビッグエンディアン、ヘッダ/トレーラなし）:
//!
//! | オフセット | サイズ | 内容 |
//! |---|---|---|
//! | 0 | 8 | 局面キー |
//! | 8 | 2 | 指し手ID |
//! | 10 | 2 | スコア（i16 2の補数） |
//! | 12 | 4 | 予約（0） |

use crate::accumulator::Accumulator;
use crate::types::{MoveId, PositionKey, Side};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Deserialize;
use std::io::{self, Read, Write};

/// 1レコードのバイト数
pub const RECORD_SIZE: usize = 16;

/// スコアの付け方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    /// 白視点の累積スコアをそのまま使う
    #[default]
    Expectancy,
    /// 全エントリ 1（出現の有無のみを反映）
    Uniform,
}

/// 足切り条件
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    /// これ未満の出現回数は捨てる
    pub min_games: u32,
    /// 手番側期待得点（0.0〜1.0）がこれ未満なら捨てる
    pub min_score: f64,
    /// 白番の局面を捨てる
    pub exclude_white: bool,
    /// 黒番の局面を捨てる
    pub exclude_black: bool,
    pub weighting: Weighting,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_games: 3,
            min_score: 0.0,
            exclude_white: false,
            exclude_black: false,
            weighting: Weighting::Expectancy,
        }
    }
}

/// スコア
#[inline]
pub fn score(acc: &Accumulator, weighting: Weighting) -> i32 {
    match weighting {
        Weighting::Expectancy => acc.white_score(),
        Weighting::Uniform => 1,
    }
}

/// 定跡に残すかどうか
pub fn keep_entry(acc: &Accumulator, filter: &FilterConfig) -> bool {
    if acc.visit_count() < filter.min_games {
        return false;
    }
    if acc.white_score() == 0 {
        return false;
    }
    if score(acc, filter.weighting) == 0 {
        return false;
    }
    if acc.normalized_score() < filter.min_score {
        return false;
    }
    match acc.side_to_move() {
        Side::White if filter.exclude_white => false,
        Side::Black if filter.exclude_black => false,
        _ => true,
    }
}

/// 定跡ファイルの1レコード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookEntry {
    pub key: PositionKey,
    pub move_id: MoveId,
    pub score: i32,
}

impl BookEntry {
    /// 書き出し時の16bitスコア（飽和）
    #[inline]
    pub fn encoded_score(&self) -> i16 {
        self.score.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<BigEndian>(self.key.raw())?;
        w.write_u16::<BigEndian>(self.move_id)?;
        w.write_i16::<BigEndian>(self.encoded_score())?;
        w.write_u32::<BigEndian>(0)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let key = r.read_u64::<BigEndian>()?;
        let move_id = r.read_u16::<BigEndian>()?;
        let score = r.read_i16::<BigEndian>()?;
        let _reserved = r.read_u32::<BigEndian>()?;
        Ok(Self {
            key: PositionKey::new(key),
            move_id,
            score: score as i32,
        })
    }
}

/// 局面キー昇順、同一キー内はスコア降順（強い手が先）、最後に指し手ID昇順
pub fn sort_entries(entries: &mut [BookEntry]) {
    entries.sort_by(|a, b| {
        a.key
            .cmp(&b.key)
            .then_with(|| b.score.cmp(&a.score))
            .then_with(|| a.move_id.cmp(&b.move_id))
    });
}

/// 足切り・スコア付け・ソートまで
///
/// 残った局面は、指し手集合の各手について同じスコアのレコードを1つずつ出す。
pub fn compact<'a>(
    accumulators: impl IntoIterator<Item = &'a Accumulator>,
    filter: &FilterConfig,
) -> Vec<BookEntry> {
    let mut kept_positions = 0usize;
    let mut dropped_positions = 0usize;
    let mut entries = Vec::new();

    for acc in accumulators {
        if !keep_entry(acc, filter) {
            dropped_positions += 1;
            continue;
        }
        kept_positions += 1;
        let s = score(acc, filter.weighting);
        entries.extend(acc.moves().iter().map(|&move_id| BookEntry {
            key: acc.key(),
            move_id,
            score: s,
        }));
    }

    sort_entries(&mut entries);
    log::info!(
        "compacted book: {kept_positions} positions kept, {dropped_positions} dropped, {} records",
        entries.len()
    );
    entries
}

/// レコード列を書き出す
pub fn write_book<W: Write>(w: &mut W, entries: &[BookEntry]) -> io::Result<()> {
    for entry in entries {
        entry.write_to(w)?;
    }
    w.flush()
}

/// 定跡ファイル全体を読む
///
/// 長さが16の倍数でない場合は `InvalidData`。
pub fn read_book<R: Read>(r: &mut R) -> io::Result<Vec<BookEntry>> {
    let mut bytes = Vec::new();
    r.read_to_end(&mut bytes)?;
    if bytes.len() % RECORD_SIZE != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("book size {} is not a multiple of {RECORD_SIZE}", bytes.len()),
        ));
    }
    let mut cursor = io::Cursor::new(bytes);
    let count = cursor.get_ref().len() / RECORD_SIZE;
    (0..count).map(|_| BookEntry::read_from(&mut cursor)).collect()
}
