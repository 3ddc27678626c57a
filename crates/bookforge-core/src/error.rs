//! エラー型

use std::path::PathBuf;

/// 設定エラー
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("min_score must be within [0.0, 1.0], got {0}")]
    MinScoreOutOfRange(f64),

    #[error("batch_games must be at least 1")]
    ZeroBatchSize,

    #[error("max_ply must be at least 1")]
    ZeroMaxPly,

    #[error("min_games must be at least 1")]
    ZeroMinGames,

    /// バッチ書き出しは集計を捨てるので、全体を必要とするバイナリ出力とは併用できない
    #[error("batch_games cannot be combined with binary book output (the book needs the whole corpus in memory)")]
    BatchingWithBinaryOutput,

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// KV ストアのエラー
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("failed to open store {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// レコードスキーマのエラー
#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    #[error("unrecognized record key: {0}")]
    UnknownKey(String),

    #[error("unsupported schema version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("malformed value for {key}: {source}")]
    Value {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// 書き出し先（sink）のエラー
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    /// バイナリ定跡は1パス（全体）しか受け付けない
    #[error("binary book sink received pass {pass} after the book was already written")]
    MultiplePasses { pass: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// bookforge 全体のエラー
#[derive(thiserror::Error, Debug)]
pub enum BookError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type BookResult<T> = Result<T, BookError>;
