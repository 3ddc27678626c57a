//! 対局メタデータと実行サマリー

use crate::types::{GameId, Outcome};
use serde::{Deserialize, Serialize};

/// 1対局分のメタデータ
///
/// 集計とは独立に、対局ごとに即座に書き出される。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    /// 通し番号（`BookBuilder::begin_game` が採番する）
    pub id: GameId,
    pub white: String,
    /// 棋譜に書かれたままのレーティング文字列
    pub white_elo: String,
    pub black: String,
    pub black_elo: String,
    /// PGN の Result タグ
    pub result: String,
    pub date: String,
    pub event: String,
    pub site: String,
    pub eco: String,
    /// 入力ストリーム内での対局開始位置（バイト）
    pub source_offset: u64,
    /// 開始局面（空なら初期局面）
    pub fen: String,
    pub ply_count: String,
    pub event_date: String,
    pub event_type: String,
}

impl GameRecord {
    #[inline]
    pub fn outcome(&self) -> Outcome {
        Outcome::from_pgn_result(&self.result)
    }

    /// パイプ区切りの旧形式
    ///
    /// white|white_elo|black|black_elo|result|date|event|site|eco|offset|fen|plycount|eventdate|eventtype
    pub fn to_pipe_delimited(&self) -> String {
        let offset = self.source_offset.to_string();
        [
            self.white.as_str(),
            self.white_elo.as_str(),
            self.black.as_str(),
            self.black_elo.as_str(),
            self.result.as_str(),
            self.date.as_str(),
            self.event.as_str(),
            self.site.as_str(),
            self.eco.as_str(),
            offset.as_str(),
            self.fen.as_str(),
            self.ply_count.as_str(),
            self.event_date.as_str(),
            self.event_type.as_str(),
        ]
        .join("|")
    }
}

/// 実行全体のサマリー（最後に書き出すトップレベル情報）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// 処理した対局数（除外分を含む）
    pub total_games: u64,
    /// レーティングで集計から除外した対局数
    pub skipped_games: u64,
    /// 不正な指し手で途中打ち切りになった対局数
    pub truncated_games: u64,
    /// 書き出したパス数
    pub num_passes: u32,
    /// 入力ファイル名
    pub source_name: String,
}
