//! レーティングによる対局の足切り

/// レーティング文字列を解釈する
///
/// 空・"?"・数値でない場合は足切り値そのものとして扱う（対局は除外しない）。
pub fn parse_rating(text: &str, min_elo: u32) -> u32 {
    match text.trim().parse::<u32>() {
        Ok(v) => v,
        Err(_) => {
            if !text.trim().is_empty() && text.trim() != "?" {
                log::warn!("unparseable rating {text:?}, treating as {min_elo}");
            }
            min_elo
        }
    }
}

/// 両対局者の最低レーティング条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingPolicy {
    pub min_elo: u32,
}

impl RatingPolicy {
    pub const fn new(min_elo: u32) -> Self {
        Self { min_elo }
    }

    /// どちらかが足切り未満なら集計から除外する
    #[inline]
    pub fn admits(&self, white: u32, black: u32) -> bool {
        white >= self.min_elo && black >= self.min_elo
    }

    /// 棋譜のレーティング文字列から判定
    ///
    /// どちらか一方でも読めなければ両者を足切り値とみなすので、対局は除外しない。
    pub fn admits_text(&self, white_elo: &str, black_elo: &str) -> bool {
        match (white_elo.trim().parse::<u32>(), black_elo.trim().parse::<u32>()) {
            (Ok(white), Ok(black)) => self.admits(white, black),
            _ => {
                // 警告だけ出す
                parse_rating(white_elo, self.min_elo);
                parse_rating(black_elo, self.min_elo);
                true
            }
        }
    }
}
