//! 定跡作成の設定
//!
//! TOML ファイルから読み込み、CLI 引数で上書きする想定。
//!
//! ```toml
//! max_ply = 40
//! min_elo = 2200
//! min_games = 5
//! min_score = 0.45
//! exclude_black = true
//! batch_games = 50000
//!
//! [output]
//! kind = "store"
//! path = "game_index.db"
//! layout = "typed"
//! ```

use crate::compactor::{FilterConfig, Weighting};
use crate::error::ConfigError;
use crate::rating::RatingPolicy;
use crate::schema::KvLayout;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// ストアモードのバッチ対局数の既定値
pub const DEFAULT_BATCH_GAMES: u64 = 100_000;

/// 進捗ログの間隔（対局数）
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 10_000;

/// 出力先
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutputMode {
    /// KV ストアへのバッチ書き出し
    Store {
        path: PathBuf,
        #[serde(default)]
        layout: KvLayout,
    },
    /// 固定長バイナリ定跡（集計全体を保持する）
    Binary { path: PathBuf },
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Store {
            path: PathBuf::from("game_index.db"),
            layout: KvLayout::default(),
        }
    }
}

/// 定跡作成の設定
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookConfig {
    /// 集計する最大手数（対局ごと）
    pub max_ply: u32,
    /// 両対局者に要求する最低レーティング
    pub min_elo: u32,
    /// 定跡に残す最低出現回数
    pub min_games: u32,
    /// 定跡に残す最低期待得点（0.0〜1.0）
    pub min_score: f64,
    /// 白番の局面を捨てる
    pub exclude_white: bool,
    /// 黒番の局面を捨てる
    pub exclude_black: bool,
    /// 一様スコア
    pub uniform: bool,
    /// バッチ書き出しの間隔（対局数）。ストアモードで未指定なら既定値
    pub batch_games: Option<u64>,
    pub progress_interval: u64,
    pub output: OutputMode,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            max_ply: 1024,
            min_elo: 2400,
            min_games: 3,
            min_score: 0.0,
            exclude_white: false,
            exclude_black: false,
            uniform: false,
            batch_games: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            output: OutputMode::default(),
        }
    }
}

impl BookConfig {
    /// TOML ファイルから読み込む（検証は呼び出し側で `validate`）
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 設定の整合性を検査する
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(ConfigError::MinScoreOutOfRange(self.min_score));
        }
        if self.max_ply == 0 {
            return Err(ConfigError::ZeroMaxPly);
        }
        if self.min_games == 0 {
            return Err(ConfigError::ZeroMinGames);
        }
        match (&self.output, self.batch_games) {
            (_, Some(0)) => Err(ConfigError::ZeroBatchSize),
            (OutputMode::Binary { .. }, Some(_)) => Err(ConfigError::BatchingWithBinaryOutput),
            _ => Ok(()),
        }
    }

    pub fn weighting(&self) -> Weighting {
        if self.uniform {
            Weighting::Uniform
        } else {
            Weighting::Expectancy
        }
    }

    pub fn filter(&self) -> FilterConfig {
        FilterConfig {
            min_games: self.min_games,
            min_score: self.min_score,
            exclude_white: self.exclude_white,
            exclude_black: self.exclude_black,
            weighting: self.weighting(),
        }
    }

    pub fn rating_policy(&self) -> RatingPolicy {
        RatingPolicy::new(self.min_elo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BookConfig::default();
        assert_eq!(config.max_ply, 1024);
        assert_eq!(config.min_elo, 2400);
        assert_eq!(config.min_games, 3);
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_games, None);
        assert_eq!(config.weighting(), Weighting::Expectancy);
    }

    #[test]
    fn test_parse_toml() {
        let text = r#"
            max_ply = 40
            min_score = 0.5
            exclude_black = true
            uniform = true
            batch_games = 500

            [output]
            kind = "store"
            path = "out/book.db"
            layout = "legacy"
        "#;
        let config: BookConfig = toml::from_str(text).unwrap();
        assert_eq!(config.max_ply, 40);
        assert_eq!(config.min_elo, 2400);
        assert_eq!(config.batch_games, Some(500));
        assert_eq!(
            config.output,
            OutputMode::Store {
                path: PathBuf::from("out/book.db"),
                layout: KvLayout::Legacy
            }
        );
        let filter = config.filter();
        assert!(filter.exclude_black);
        assert_eq!(filter.weighting, Weighting::Uniform);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_binary_output_rejects_batching() {
        let text = r#"
            batch_games = 1000
            [output]
            kind = "binary"
            path = "book.bin"
        "#;
        let config: BookConfig = toml::from_str(text).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BatchingWithBinaryOutput)
        ));

        let config = BookConfig {
            batch_games: None,
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_ranges() {
        let bad_score = BookConfig {
            min_score: 1.5,
            ..BookConfig::default()
        };
        assert!(matches!(bad_score.validate(), Err(ConfigError::MinScoreOutOfRange(_))));

        let zero_batch = BookConfig {
            batch_games: Some(0),
            ..BookConfig::default()
        };
        assert!(matches!(zero_batch.validate(), Err(ConfigError::ZeroBatchSize)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(toml::from_str::<BookConfig>("min_gmaes = 3").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.toml");
        std::fs::write(&path, "min_games = 7\n").unwrap();
        let config = BookConfig::load(&path).unwrap();
        assert_eq!(config.min_games, 7);

        let missing = BookConfig::load(dir.path().join("none.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
