//! SAN の解釈と Polyglot 互換の局面キー・指し手ID
//!
//! 盤面と合法手判定は shakmaty に任せる。
//!
//! 指し手ID（16bit）は Polyglot 形式:
//!
//! | bit | 内容 |
//! |---|---|
//! | 0-2 | 移動先の筋 |
//! | 3-5 | 移動先の段 |
//! | 6-8 | 移動元の筋 |
//! | 9-11 | 移動元の段 |
//! | 12-14 | 成り駒（0=なし, 1=N, 2=B, 3=R, 4=Q） |
//!
//! キャスリングは「キングがルークを取る」形（e1h1 など）で表す。

use crate::pgn::PgnGame;
use bookforge_core::{MoveId, PositionKey, Side};
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::zobrist::Zobrist64;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position, Role, Square};

/// 棋譜の開始局面が作れない
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("invalid FEN {fen:?}: {reason}")]
    Fen { fen: String, reason: String },
}

/// 1手分の復元結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedPly {
    /// 指す前の局面
    pub key: PositionKey,
    pub move_id: MoveId,
    pub side: Side,
}

/// 途中で見つかった不正な指し手
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalMove {
    /// 0 始まりの手数
    pub ply: usize,
    pub san: String,
    pub reason: String,
}

/// 1局分の復元結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedGame {
    pub plies: Vec<DecodedPly>,
    /// これ以降の手は捨てた
    pub illegal: Option<IllegalMove>,
}

/// 開始局面（FEN 省略時は平手）
pub fn starting_position(fen: Option<&str>) -> Result<Chess, DecodeError> {
    let Some(text) = fen else {
        return Ok(Chess::default());
    };
    let invalid = |reason: String| DecodeError::Fen {
        fen: text.to_string(),
        reason,
    };
    let fen: Fen = text.trim().parse().map_err(|e: shakmaty::fen::ParseFenError| invalid(e.to_string()))?;
    fen.into_position(CastlingMode::Standard)
        .map_err(|e| invalid(e.to_string()))
}

/// Polyglot 互換の Zobrist ハッシュ
///
/// アンパサンの筋は、取れる位置に手番側のポーンがあれば（ピンされていても）含める。
#[inline]
pub fn position_key(pos: &Chess) -> PositionKey {
    let hash: Zobrist64 = pos.zobrist_hash(EnPassantMode::PseudoLegal);
    PositionKey::new(hash.0)
}

#[inline]
pub fn side_of(color: Color) -> Side {
    match color {
        Color::White => Side::White,
        Color::Black => Side::Black,
    }
}

fn promotion_bits(role: Option<Role>) -> u16 {
    match role {
        Some(Role::Knight) => 1,
        Some(Role::Bishop) => 2,
        Some(Role::Rook) => 3,
        Some(Role::Queen) => 4,
        _ => 0,
    }
}

/// Polyglot 形式の指し手ID
pub fn polyglot_move(m: &Move) -> MoveId {
    let (from, to) = match *m {
        Move::Castle { king, rook } => (king, rook),
        _ => (m.from().unwrap_or_else(|| m.to()), m.to()),
    };
    square_index(to) | (square_index(from) << 6) | (promotion_bits(m.promotion()) << 12)
}

#[inline]
fn square_index(sq: Square) -> u16 {
    sq as u16
}

/// 指し手列を開始局面から再生する
///
/// 最初の不正手で止める（その手は含めない）。`limit` 手を超えては読まない。
pub fn decode_moves(mut pos: Chess, moves: &[String], limit: usize) -> DecodedGame {
    let mut decoded = DecodedGame {
        plies: Vec::with_capacity(moves.len().min(limit)),
        illegal: None,
    };

    for (ply, text) in moves.iter().enumerate().take(limit) {
        let m = match text.parse::<SanPlus>() {
            Ok(san) => san.san.to_move(&pos).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let m = match m {
            Ok(m) => m,
            Err(reason) => {
                decoded.illegal = Some(IllegalMove {
                    ply,
                    san: text.clone(),
                    reason,
                });
                break;
            }
        };

        decoded.plies.push(DecodedPly {
            key: position_key(&pos),
            move_id: polyglot_move(&m),
            side: side_of(pos.turn()),
        });
        pos.play_unchecked(m);
    }
    decoded
}

/// 1局を再生する
pub fn decode_game(game: &PgnGame, limit: usize) -> Result<DecodedGame, DecodeError> {
    let start = starting_position(game.fen())?;
    Ok(decode_moves(start, &game.moves, limit))
}

/// 指し手IDを UCI 風の文字列にする（キャスリングは e1h1 形式のまま）
pub fn move_to_uci(id: MoveId) -> String {
    let square = |idx: u16| {
        let file = (b'a' + (idx & 7) as u8) as char;
        let rank = (b'1' + ((idx >> 3) & 7) as u8) as char;
        format!("{file}{rank}")
    };
    let mut out = square((id >> 6) & 63);
    out.push_str(&square(id & 63));
    match (id >> 12) & 7 {
        1 => out.push('n'),
        2 => out.push('b'),
        3 => out.push('r'),
        4 => out.push('q'),
        _ => {}
    }
    out
}
