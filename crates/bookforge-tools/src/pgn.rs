//! PGN 棋譜リーダー
//!
//! 1局ずつ逐次に読み、タグと指し手（SAN 文字列）を取り出す。
//! 指し手の合法性はここでは見ない（`chess` 側の責務）。
//!
//! 指し手部分から取り除くもの:
//! - 手数表記（`12.` / `12...`）
//! - コメント（`{...}`、`;` から行末）
//! - 変化手順（`(...)`、入れ子可）
//! - NAG（`$n`）と `!` / `?` の注釈
//! - 結果（`1-0` / `0-1` / `1/2-1/2` / `*`）

use bookforge_core::GameRecord;
use std::io::{self, BufRead};

/// 1局分の棋譜
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgnGame {
    /// タグ（出現順）
    pub headers: Vec<(String, String)>,
    /// SAN の指し手列
    pub moves: Vec<String>,
    /// 入力内での対局開始位置（バイト）
    pub offset: u64,
}

impl PgnGame {
    /// タグの値（大文字小文字は区別する）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn header_or_empty(&self, name: &str) -> String {
        self.header(name).unwrap_or_default().to_string()
    }

    /// 開始局面の FEN（`FEN` タグ。空なら初期局面）
    pub fn fen(&self) -> Option<&str> {
        self.header("FEN").filter(|f| !f.trim().is_empty())
    }

    /// 集計エンジンに渡すメタデータ（ID は取り込み時に採番される）
    pub fn record(&self) -> GameRecord {
        GameRecord {
            id: 0,
            white: self.header_or_empty("White"),
            white_elo: self.header_or_empty("WhiteElo"),
            black: self.header_or_empty("Black"),
            black_elo: self.header_or_empty("BlackElo"),
            result: self.header_or_empty("Result"),
            date: self.header_or_empty("Date"),
            event: self.header_or_empty("Event"),
            site: self.header_or_empty("Site"),
            eco: self.header_or_empty("ECO"),
            source_offset: self.offset,
            fen: self.header_or_empty("FEN"),
            ply_count: self.header_or_empty("PlyCount"),
            event_date: self.header_or_empty("EventDate"),
            event_type: self.header_or_empty("EventType"),
        }
    }
}

/// 逐次 PGN リーダー
pub struct PgnReader<R: BufRead> {
    reader: R,
    /// 次に読む行の先頭位置
    offset: u64,
    /// 先読みしてしまった次局のタグ行
    pending: Option<(u64, String)>,
    buf: Vec<u8>,
}

impl<R: BufRead> PgnReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            pending: None,
            buf: Vec::new(),
        }
    }

    /// 1行読む（改行は除く）。UTF-8 でないバイトは置換する
    fn next_line(&mut self) -> io::Result<Option<(u64, String)>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        let start = self.offset;
        self.offset += n as u64;
        let line = String::from_utf8_lossy(&self.buf);
        let line = line.trim_end_matches(['\n', '\r']);
        // BOM
        let line = line.strip_prefix('\u{feff}').unwrap_or(line);
        Ok(Some((start, line.to_string())))
    }

    /// 次の1局を読む
    pub fn next_game(&mut self) -> io::Result<Option<PgnGame>> {
        let mut game = PgnGame::default();
        let mut started = false;
        let mut in_movetext = false;
        let mut movetext = String::new();

        while let Some((offset, line)) = self.next_line()? {
            let trimmed = line.trim();
            // `%` 行はエスケープ（読み飛ばす）
            if line.starts_with('%') {
                continue;
            }
            if trimmed.is_empty() {
                if in_movetext {
                    break;
                }
                continue;
            }
            if trimmed.starts_with('[') && !in_movetext_comment(&movetext) {
                if in_movetext {
                    // 空行なしで次局が始まった
                    self.pending = Some((offset, line));
                    break;
                }
                if !started {
                    game.offset = offset;
                    started = true;
                }
                if let Some(tag) = parse_tag(trimmed) {
                    game.headers.push(tag);
                } else {
                    log::warn!("malformed PGN tag at byte {offset}: {trimmed}");
                }
                continue;
            }
            if !started {
                game.offset = offset;
                started = true;
            }
            in_movetext = true;
            movetext.push_str(&line);
            movetext.push('\n');
        }

        if !started {
            return Ok(None);
        }
        game.moves = tokenize_movetext(&movetext);
        Ok(Some(game))
    }
}

impl<R: BufRead> Iterator for PgnReader<R> {
    type Item = io::Result<PgnGame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_game().transpose()
    }
}

/// 閉じていない `{` コメントの途中か
fn in_movetext_comment(movetext: &str) -> bool {
    let mut open = false;
    for c in movetext.chars() {
        match c {
            '{' => open = true,
            '}' => open = false,
            _ => {}
        }
    }
    open
}

/// `[Name "Value"]`
fn parse_tag(line: &str) -> Option<(String, String)> {
    let inner = line.strip_prefix('[')?.trim_end().strip_suffix(']')?;
    let (name, rest) = inner.trim().split_once(char::is_whitespace)?;
    let rest = rest.trim();
    let quoted = rest.strip_prefix('"')?.strip_suffix('"')?;

    let mut value = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                value.push(escaped);
            }
        } else {
            value.push(c);
        }
    }
    Some((name.to_string(), value))
}

fn is_result_token(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
}

/// 指し手部分から SAN トークンだけを取り出す
pub fn tokenize_movetext(text: &str) -> Vec<String> {
    let mut moves = Vec::new();
    let mut token = String::new();
    let mut variation_depth = 0usize;
    let mut chars = text.chars().peekable();

    let mut push_token = |token: &mut String, depth: usize| {
        if depth == 0 {
            if let Some(san) = clean_token(token) {
                moves.push(san);
            }
        }
        token.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                push_token(&mut token, variation_depth);
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                }
            }
            ';' => {
                push_token(&mut token, variation_depth);
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '(' => {
                push_token(&mut token, variation_depth);
                variation_depth += 1;
            }
            ')' => {
                push_token(&mut token, variation_depth);
                variation_depth = variation_depth.saturating_sub(1);
            }
            '$' => {
                push_token(&mut token, variation_depth);
                while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                    chars.next();
                }
            }
            c if c.is_whitespace() => push_token(&mut token, variation_depth),
            c => token.push(c),
        }
    }
    push_token(&mut token, variation_depth);
    moves
}

/// 手数表記と注釈を落とす。指し手でなければ `None`
fn clean_token(token: &str) -> Option<String> {
    // "12." "12..." "12.e4"
    let token = match token.find(|c: char| !c.is_ascii_digit()) {
        Some(i) if i > 0 && token[i..].starts_with('.') => &token[i..],
        Some(_) => token,
        None => "",
    };
    let token = token.trim_start_matches('.').trim_end_matches(['!', '?']);
    if token.is_empty() || is_result_token(token) {
        return None;
    }
    Some(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_GAMES: &str = r#"[Event "Test \"Open\""]
[Site "Somewhere"]
[White "Alpha"]
[Black "Beta"]
[Result "1-0"]
[WhiteElo "2700"]
[BlackElo "2650"]
[ECO "C20"]

1. e4 {best by test} e5 2. Nf3 (2. f4 exf4 (2... d5) 3. Nf3) 2... Nc6 $1
3. Bb5!? a6 ; Morphy
4. Ba4 1-0

[Event "Second"]
[White "Gamma"]
[Black "Delta"]
[Result "1/2-1/2"]
[FEN "8/8/8/8/8/8/4K3/4k3 w - - 0 1"]

1/2-1/2
"#;

    #[test]
    fn test_reads_two_games() {
        let games: Vec<PgnGame> = PgnReader::new(TWO_GAMES.as_bytes())
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(games.len(), 2);

        let first = &games[0];
        assert_eq!(first.offset, 0);
        assert_eq!(first.header("Event"), Some("Test \"Open\""));
        assert_eq!(
            first.moves,
            vec!["e4", "e5", "Nf3", "Nc6", "Bb5", "a6", "Ba4"]
        );

        let second = &games[1];
        assert_eq!(second.header("White"), Some("Gamma"));
        assert!(second.moves.is_empty());
        assert_eq!(second.fen(), Some("8/8/8/8/8/8/4K3/4k3 w - - 0 1"));
        let start = TWO_GAMES.find("[Event \"Second\"]").unwrap() as u64;
        assert_eq!(second.offset, start);
    }

    #[test]
    fn test_record_fields() {
        let game = PgnReader::new(TWO_GAMES.as_bytes()).next_game().unwrap().unwrap();
        let record = game.record();
        assert_eq!(record.white, "Alpha");
        assert_eq!(record.white_elo, "2700");
        assert_eq!(record.black_elo, "2650");
        assert_eq!(record.result, "1-0");
        assert_eq!(record.eco, "C20");
        assert_eq!(record.site, "Somewhere");
        assert_eq!(record.source_offset, 0);
        assert!(record.fen.is_empty());
    }

    #[test]
    fn test_game_without_blank_line_separator() {
        let text = "[White \"A\"]\n1. d4 d5 *\n[White \"B\"]\n1. c4 *\n";
        let games: Vec<PgnGame> = PgnReader::new(text.as_bytes())
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].moves, vec!["d4", "d5"]);
        assert_eq!(games[1].moves, vec!["c4"]);
        assert_eq!(games[1].offset, text.find("[White \"B\"]").unwrap() as u64);
    }

    #[test]
    fn test_tokenize_move_numbers_and_checks() {
        let moves = tokenize_movetext("1.e4 e5 2.Qh5 Nc6 3.Bc4 Nf6?? 4.Qxf7# 1-0");
        assert_eq!(moves, vec!["e4", "e5", "Qh5", "Nc6", "Bc4", "Nf6", "Qxf7#"]);

        let moves = tokenize_movetext("12... O-O-O 13. exd8=Q+ {multi\nline} Kxd8");
        assert_eq!(moves, vec!["O-O-O", "exd8=Q+", "Kxd8"]);
    }

    #[test]
    fn test_multiline_comment_with_bracket() {
        let text = "[White \"A\"]\n\n1. e4 {see\n[annotator note]} e5 *\n";
        let games: Vec<PgnGame> = PgnReader::new(text.as_bytes())
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].moves, vec!["e4", "e5"]);
    }

    #[test]
    fn test_empty_input() {
        let mut reader = PgnReader::new(&b"\n\n"[..]);
        assert!(reader.next_game().unwrap().is_none());
    }
}
