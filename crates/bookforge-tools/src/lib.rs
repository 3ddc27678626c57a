//! bookforge-tools
//!
//! 集計エンジン（bookforge-core）が外部に任せている部分:
//! PGN の読み込み、SAN の解釈と Polyglot ハッシュ、入出力、CLI 共通処理。

pub mod chess;
pub mod cli;
pub mod io;
pub mod pgn;
