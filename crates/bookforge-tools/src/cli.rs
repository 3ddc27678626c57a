//! CLI 共通処理

use bookforge_core::schema::KvLayout;
use clap::ValueEnum;

/// ロガー初期化（`RUST_LOG` があればそちらを優先）
pub fn init_logger(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_secs()
        .init();
}

/// `--layout`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// 文字列キー（既存ツール互換）
    Legacy,
    /// バージョン付きキー + JSON 値
    #[default]
    Typed,
}

impl From<LayoutArg> for KvLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Legacy => KvLayout::Legacy,
            LayoutArg::Typed => KvLayout::Typed,
        }
    }
}

/// `--min-score` はパーセント（0〜100）で受け取る
pub fn percent_to_fraction(percent: f64) -> f64 {
    percent / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_score_percent() {
        assert_eq!(percent_to_fraction(50.0), 0.5);
        assert_eq!(percent_to_fraction(100.0), 1.0);
        assert_eq!(percent_to_fraction(0.0), 0.0);
    }

    #[test]
    fn test_layout_arg() {
        assert_eq!(KvLayout::from(LayoutArg::Legacy), KvLayout::Legacy);
        assert_eq!(KvLayout::from(LayoutArg::default()), KvLayout::Typed);
    }
}
