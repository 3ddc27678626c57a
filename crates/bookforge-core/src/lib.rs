//! bookforge-core
//!
//! 棋譜ストリームから局面ごとの集計（出現回数・白視点スコア・引き分け数・
//! 指し手集合・出現対局集合）を作り、KV ストアへのバッチ書き出しや
//! Polyglot 形式のバイナリ定跡への書き出しを行うエンジン部分。
//!
//! - `types`: 局面キー・手番・対局結果などの値型
//! - `accumulator`: 局面ごとの集計レコード
//! - `index`: オープンアドレス法の集計インデックス
//! - `builder`: 取り込みパイプライン（対局単位の制御）
//! - `flusher` / `compactor`: バッチ書き出しと最終圧縮
//! - `sink` / `store` / `schema` / `rollup`: 永続化まわり

pub mod accumulator;
pub mod builder;
pub mod compactor;
pub mod config;
pub mod error;
pub mod flusher;
pub mod game;
pub mod index;
pub mod rating;
pub mod rollup;
pub mod schema;
pub mod sink;
pub mod store;
pub mod types;

pub use accumulator::Accumulator;
pub use builder::{BookBuilder, GameSession, PlyEvent, apply_event};
pub use compactor::{BookEntry, FilterConfig, Weighting};
pub use config::{BookConfig, OutputMode};
pub use error::{BookError, BookResult};
pub use game::{GameRecord, RunSummary};
pub use index::AggregationIndex;
pub use sink::{BinaryBookSink, BookSink, KvSink};
pub use store::{KvStore, MemoryStore, SqliteStore, WriteBatch};
pub use types::{GameId, MoveId, Outcome, PositionKey, Side};
