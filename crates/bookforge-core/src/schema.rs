//! KV ストア上のレコード配置
//!
//! 2種類のレイアウトを持つ。
//!
//! # Legacy
//!
//! 既存の下流ツールが読む文字列キー形式。局面キーは10進表記。
//!
//! | キー | 値 |
//! |---|---|
//! | `{key}_p_{p}` | 出現対局IDのカンマ連結 |
//! | `{key}_moves_p_{p}` | 指し手IDのカンマ連結 |
//! | `{key}_freq_p_{p}` | 出現回数 |
//! | `{key}_white_score_p_{p}` | 白視点スコア |
//! | `{key}_draws_p_{p}` | 引き分け数 |
//! | `game_{n}_data` | 対局メタデータ（パイプ区切り） |
//! | `total_game_count` / `pgn_filename` / `numPasses` | 実行サマリー |
//!
//! # Typed (v1)
//!
//! キーを構造化し、値は JSON。書き手と読み手で同じ型を使うので
//! 文字列の組み立て/分解の食い違いが起きない。
//!
//! - `v1/meta/summary` → `RunSummary`
//! - `v1/game/{n:012}` → `GameRecord`
//! - `v1/pos/{pass:06}/{key:016x}` → `PositionRecord`
//!
//! どちらのレイアウトでもパスごとの値は上書きであり、加算マージはしない。
//! 通算の集計は `rollup` で全パスを読み合わせて得る。

use crate::accumulator::Accumulator;
use crate::error::SchemaError;
use crate::game::{GameRecord, RunSummary};
use crate::store::WriteBatch;
use crate::types::{GameId, MoveId, PositionKey, Side};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Typed レイアウトのスキーマバージョン
pub const SCHEMA_VERSION: u32 = 1;

const TYPED_PREFIX: &str = "v1/";
/// 局面レコードのキー接頭辞（ロールアップの走査範囲）
pub const POSITION_PREFIX: &str = "v1/pos/";
const GAME_PREFIX: &str = "v1/game/";
const META_PREFIX: &str = "v1/meta/";
const SUMMARY_NAME: &str = "summary";

/// レコード配置の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KvLayout {
    Legacy,
    #[default]
    Typed,
}

impl KvLayout {
    /// 1局面分の集計をバッチに積む
    pub fn put_position(
        self,
        batch: &mut WriteBatch,
        pass: u32,
        acc: &Accumulator,
    ) -> Result<(), SchemaError> {
        match self {
            KvLayout::Legacy => {
                let key = acc.key();
                batch.put(format!("{key}_p_{pass}"), join_with_commas(acc.game_ids()));
                batch.put(format!("{key}_moves_p_{pass}"), join_with_commas(acc.moves()));
                batch.put(format!("{key}_freq_p_{pass}"), acc.visit_count().to_string());
                batch.put(format!("{key}_white_score_p_{pass}"), acc.white_score().to_string());
                batch.put(format!("{key}_draws_p_{pass}"), acc.draw_count().to_string());
            }
            KvLayout::Typed => {
                let record = PositionRecord::from_accumulator(pass, acc);
                let key = RecordKey::Position {
                    pass,
                    key: acc.key(),
                };
                batch.put(key.encode(), serde_json::to_vec(&record)?);
            }
        }
        Ok(())
    }

    /// 対局メタデータのキーと値
    pub fn game_entry(self, game: &GameRecord) -> Result<(String, Vec<u8>), SchemaError> {
        Ok(match self {
            KvLayout::Legacy => (
                format!("game_{}_data", game.id),
                game.to_pipe_delimited().into_bytes(),
            ),
            KvLayout::Typed => (RecordKey::Game(game.id).encode(), serde_json::to_vec(game)?),
        })
    }

    /// 実行サマリーをバッチに積む
    pub fn put_summary(self, batch: &mut WriteBatch, summary: &RunSummary) -> Result<(), SchemaError> {
        match self {
            KvLayout::Legacy => {
                batch.put("total_game_count", summary.total_games.to_string());
                batch.put("pgn_filename", summary.source_name.clone());
                batch.put("numPasses", summary.num_passes.to_string());
            }
            KvLayout::Typed => {
                let key = RecordKey::Meta(SUMMARY_NAME.to_string());
                batch.put(key.encode(), serde_json::to_vec(summary)?);
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for KvLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(KvLayout::Legacy),
            "typed" => Ok(KvLayout::Typed),
            other => Err(format!("unknown layout: {other} (expected legacy|typed)")),
        }
    }
}

/// 末尾カンマ付きの連結（下流ツール互換）
fn join_with_commas<T: std::fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    let mut out = String::new();
    for item in items {
        let _ = write!(out, "{item},");
    }
    out
}

/// Typed レイアウトのキー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Meta(String),
    Game(GameId),
    Position { pass: u32, key: PositionKey },
}

impl RecordKey {
    pub fn encode(&self) -> String {
        match self {
            RecordKey::Meta(name) => format!("{META_PREFIX}{name}"),
            RecordKey::Game(id) => format!("{GAME_PREFIX}{id:012}"),
            RecordKey::Position { pass, key } => format!("{POSITION_PREFIX}{pass:06}/{key:016x}"),
        }
    }

    pub fn parse(s: &str) -> Result<RecordKey, SchemaError> {
        let unknown = || SchemaError::UnknownKey(s.to_string());

        let Some(rest) = s.strip_prefix(TYPED_PREFIX) else {
            // "v2/..." のような別バージョンは明示的に弾く
            if let Some(version) = s
                .strip_prefix('v')
                .and_then(|r| r.split('/').next())
                .and_then(|v| v.parse::<u32>().ok())
            {
                return Err(SchemaError::Version {
                    found: version,
                    expected: SCHEMA_VERSION,
                });
            }
            return Err(unknown());
        };

        if let Some(name) = rest.strip_prefix("meta/") {
            if name.is_empty() {
                return Err(unknown());
            }
            return Ok(RecordKey::Meta(name.to_string()));
        }
        if let Some(id) = rest.strip_prefix("game/") {
            let id = id.parse::<GameId>().map_err(|_| unknown())?;
            return Ok(RecordKey::Game(id));
        }
        if let Some(pos) = rest.strip_prefix("pos/") {
            let (pass, key) = pos.split_once('/').ok_or_else(unknown)?;
            let pass = pass.parse::<u32>().map_err(|_| unknown())?;
            if key.len() != 16 {
                return Err(unknown());
            }
            let key = u64::from_str_radix(key, 16).map_err(|_| unknown())?;
            return Ok(RecordKey::Position {
                pass,
                key: PositionKey::new(key),
            });
        }
        Err(unknown())
    }

    /// 実行サマリーのキー
    pub fn summary() -> RecordKey {
        RecordKey::Meta(SUMMARY_NAME.to_string())
    }
}

/// Typed レイアウトの局面レコード（1パス分）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub version: u32,
    pub pass: u32,
    pub key: PositionKey,
    pub side_to_move: Side,
    pub visit_count: u32,
    pub white_score: i32,
    pub draw_count: u32,
    pub moves: Vec<MoveId>,
    pub game_ids: Vec<GameId>,
}

impl PositionRecord {
    pub fn from_accumulator(pass: u32, acc: &Accumulator) -> Self {
        Self {
            version: SCHEMA_VERSION,
            pass,
            key: acc.key(),
            side_to_move: acc.side_to_move(),
            visit_count: acc.visit_count(),
            white_score: acc.white_score(),
            draw_count: acc.draw_count(),
            moves: acc.moves().iter().copied().collect(),
            game_ids: acc.game_ids().iter().copied().collect(),
        }
    }

    pub fn into_accumulator(self) -> Accumulator {
        Accumulator::from_parts(
            self.key,
            self.side_to_move,
            self.visit_count,
            self.white_score,
            self.draw_count,
            self.moves.into_iter().collect(),
            self.game_ids.into_iter().collect(),
        )
    }

    /// バイト列から復元（バージョン検査付き）
    pub fn decode(key: &str, bytes: &[u8]) -> Result<Self, SchemaError> {
        let record: PositionRecord =
            serde_json::from_slice(bytes).map_err(|source| SchemaError::Value {
                key: key.to_string(),
                source,
            })?;
        if record.version != SCHEMA_VERSION {
            return Err(SchemaError::Version {
                found: record.version,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(record)
    }
}
