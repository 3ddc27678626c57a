//! 局面ごとの集計レコード（Accumulator）

use crate::types::{GameId, MoveId, Outcome, PositionKey, Side};
use std::collections::BTreeSet;

/// 1局面分の集計
///
/// 不変条件:
/// - `|white_score| <= visit_count`
/// - `draw_count <= visit_count`
/// - `game_ids.len() <= visit_count`（同一対局内の再訪は `visit_count` のみ増える）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    key: PositionKey,
    visit_count: u32,
    white_score: i32,
    draw_count: u32,
    /// 最初に生成されたときの手番（以後更新しない）
    side_to_move: Side,
    moves: BTreeSet<MoveId>,
    game_ids: BTreeSet<GameId>,
}

impl Accumulator {
    /// ゼロ初期化された集計を作る
    pub fn new(key: PositionKey, side_to_move: Side) -> Self {
        Self {
            key,
            visit_count: 0,
            white_score: 0,
            draw_count: 0,
            side_to_move,
            moves: BTreeSet::new(),
            game_ids: BTreeSet::new(),
        }
    }

    /// 保存済みの値から復元（ロールアップ用）
    pub(crate) fn from_parts(
        key: PositionKey,
        side_to_move: Side,
        visit_count: u32,
        white_score: i32,
        draw_count: u32,
        moves: BTreeSet<MoveId>,
        game_ids: BTreeSet<GameId>,
    ) -> Self {
        Self {
            key,
            visit_count,
            white_score,
            draw_count,
            side_to_move,
            moves,
            game_ids,
        }
    }

    /// 1手分のイベントを反映する
    #[inline]
    pub fn apply(&mut self, move_id: MoveId, game_id: GameId, outcome: Outcome) {
        self.visit_count += 1;
        self.white_score += outcome.contribution();
        if outcome.is_draw() {
            self.draw_count += 1;
        }
        self.moves.insert(move_id);
        self.game_ids.insert(game_id);
    }

    /// 別パスの同一局面の集計を足し込む
    ///
    /// 手番は自分側を優先する。キーが異なる場合は呼び出し側の誤り。
    pub fn merge(&mut self, other: &Accumulator) {
        debug_assert_eq!(self.key, other.key);
        self.visit_count += other.visit_count;
        self.white_score += other.white_score;
        self.draw_count += other.draw_count;
        self.moves.extend(other.moves.iter().copied());
        self.game_ids.extend(other.game_ids.iter().copied());
    }

    #[inline]
    pub fn key(&self) -> PositionKey {
        self.key
    }

    #[inline]
    pub fn visit_count(&self) -> u32 {
        self.visit_count
    }

    #[inline]
    pub fn white_score(&self) -> i32 {
        self.white_score
    }

    #[inline]
    pub fn draw_count(&self) -> u32 {
        self.draw_count
    }

    #[inline]
    pub fn side_to_move(&self) -> Side {
        self.side_to_move
    }

    pub fn moves(&self) -> &BTreeSet<MoveId> {
        &self.moves
    }

    pub fn game_ids(&self) -> &BTreeSet<GameId> {
        &self.game_ids
    }

    /// 手番側から見た期待得点（0.0〜1.0）
    ///
    /// 勝ち=1、引き分け=0.5、負け=0 の平均。未訪問なら 0.0。
    pub fn normalized_score(&self) -> f64 {
        if self.visit_count == 0 {
            return 0.0;
        }
        let n = self.visit_count as f64;
        let relative = match self.side_to_move {
            Side::White => self.white_score as f64,
            Side::Black => -(self.white_score as f64),
        };
        (n + relative) / (2.0 * n)
    }
}
