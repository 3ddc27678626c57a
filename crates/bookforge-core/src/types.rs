//! 集計で使う値型
//!
//! - `PositionKey`: 局面の64bit識別子（Polyglot Zobrist ハッシュを想定）
//! - `Side`: 手番
//! - `Outcome`: 対局結果（白視点）

use serde::{Deserialize, Serialize};
use std::fmt;

/// Polyglot 形式の指し手ID
pub type MoveId = u16;

/// 対局の通し番号（0始まり、レーティングで除外した対局も数える）
pub type GameId = u64;

/// 局面キー
///
/// 同一局面なら手順によらず同じ値になる。衝突は無視する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct PositionKey(u64);

impl PositionKey {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        PositionKey(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::LowerHex for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// 手番（白/黒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Side {
    White = 0,
    Black = 1,
}

/// 対局結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    WhiteWin,
    BlackWin,
    Draw,
}

impl Outcome {
    /// PGN の Result タグから変換
    ///
    /// "1-0" / "0-1" 以外（"1/2-1/2"、"*"、空文字を含む）はすべて引き分け扱い。
    pub fn from_pgn_result(result: &str) -> Outcome {
        match result.trim() {
            "1-0" => Outcome::WhiteWin,
            "0-1" => Outcome::BlackWin,
            _ => Outcome::Draw,
        }
    }

    /// 白視点のスコア寄与（対局全体で固定、手ごとに符号反転しない）
    #[inline]
    pub const fn contribution(self) -> i32 {
        match self {
            Outcome::WhiteWin => 1,
            Outcome::BlackWin => -1,
            Outcome::Draw => 0,
        }
    }

    #[inline]
    pub const fn is_draw(self) -> bool {
        matches!(self, Outcome::Draw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_serde() {
        assert_eq!(serde_json::to_string(&Side::White).unwrap(), "\"white\"");
        assert_eq!(serde_json::from_str::<Side>("\"black\"").unwrap(), Side::Black);
    }

    #[test]
    fn test_outcome_from_pgn_result() {
        assert_eq!(Outcome::from_pgn_result("1-0"), Outcome::WhiteWin);
        assert_eq!(Outcome::from_pgn_result("0-1"), Outcome::BlackWin);
        assert_eq!(Outcome::from_pgn_result("1/2-1/2"), Outcome::Draw);
        // 未決着も引き分け扱い
        assert_eq!(Outcome::from_pgn_result("*"), Outcome::Draw);
        assert_eq!(Outcome::from_pgn_result(""), Outcome::Draw);
    }

    #[test]
    fn test_outcome_contribution() {
        assert_eq!(Outcome::WhiteWin.contribution(), 1);
        assert_eq!(Outcome::BlackWin.contribution(), -1);
        assert_eq!(Outcome::Draw.contribution(), 0);
        assert!(Outcome::Draw.is_draw());
        assert!(!Outcome::WhiteWin.is_draw());
    }

    #[test]
    fn test_position_key_formatting() {
        let key = PositionKey::new(0x463b_9618_1691_fc9c);
        assert_eq!(key.to_string(), "5060803636482931868");
        assert_eq!(format!("{key:016x}"), "463b96181691fc9c");
    }
}
