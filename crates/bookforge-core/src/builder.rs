//! 取り込みパイプライン（BookBuilder）
//!
//! 棋譜リーダーから対局単位で呼ばれ、指し手イベントを集計インデックスへ反映する。
//!
//! 1対局の流れ:
//!
//! 1. `begin_game` で対局IDを採番し、メタデータを即座に sink へ書く
//! 2. `record_ply` を各手で呼ぶ（最大手数・レーティング除外を判定）
//! 3. `end_game` で対局数を数え、N局ごとにバッチ書き出し
//!
//! 入力終端で `finish` を呼ぶと最後のパスとサマリーを書く。

use crate::config::{BookConfig, DEFAULT_BATCH_GAMES};
use crate::error::{BookResult, ConfigError};
use crate::flusher::BatchFlusher;
use crate::game::{GameRecord, RunSummary};
use crate::index::AggregationIndex;
use crate::rating::RatingPolicy;
use crate::sink::BookSink;
use crate::types::{GameId, MoveId, Outcome, PositionKey, Side};

/// 1手分のイベント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlyEvent {
    /// 指す前の局面
    pub key: PositionKey,
    pub move_id: MoveId,
    /// `key` の局面の手番
    pub side: Side,
    pub game_id: GameId,
    /// 対局全体の結果（手ごとに反転しない）
    pub outcome: Outcome,
}

/// イベントを集計インデックスへ反映する
#[inline]
pub fn apply_event(index: &mut AggregationIndex, event: &PlyEvent) {
    index
        .find_or_create(event.key, event.side)
        .apply(event.move_id, event.game_id, event.outcome);
}

/// 取り込み中の1対局
#[derive(Debug)]
#[must_use = "pass the session to BookBuilder::end_game"]
pub struct GameSession {
    game_id: GameId,
    outcome: Outcome,
    /// 反映した手数
    plies: u32,
    excluded: bool,
    truncated: bool,
}

impl GameSession {
    #[inline]
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    #[inline]
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// レーティングで集計から除外されたか
    #[inline]
    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    /// 集計に反映した手数
    #[inline]
    pub fn plies_recorded(&self) -> u32 {
        self.plies
    }
}

/// 取り込みパイプライン
pub struct BookBuilder<S: BookSink> {
    index: AggregationIndex,
    sink: S,
    flusher: BatchFlusher,
    rating: RatingPolicy,
    max_ply: u32,
    /// `None` なら最後に1回だけ書く
    batch_games: Option<u64>,
    progress_interval: u64,
    source_name: String,

    next_game_id: GameId,
    games_processed: u64,
    skipped_games: u64,
    truncated_games: u64,
}

impl<S: BookSink> BookBuilder<S> {
    /// 設定を検証して作成する
    ///
    /// 集計全体を必要とする sink（バイナリ定跡）にバッチ間隔を指定するとエラー。
    pub fn new(config: &BookConfig, sink: S) -> BookResult<Self> {
        config.validate()?;
        let batch_games = if sink.retains_whole_corpus() {
            if config.batch_games.is_some() {
                return Err(ConfigError::BatchingWithBinaryOutput.into());
            }
            None
        } else {
            Some(config.batch_games.unwrap_or(DEFAULT_BATCH_GAMES))
        };

        log::info!(
            "book builder: sink={}, max_ply={}, min_elo={}, batch_games={}",
            sink.name(),
            config.max_ply,
            config.min_elo,
            batch_games.map_or_else(|| "off".to_string(), |n| n.to_string())
        );

        Ok(Self {
            index: AggregationIndex::new(),
            sink,
            flusher: BatchFlusher::new(),
            rating: config.rating_policy(),
            max_ply: config.max_ply,
            batch_games,
            progress_interval: config.progress_interval,
            source_name: String::new(),
            next_game_id: 0,
            games_processed: 0,
            skipped_games: 0,
            truncated_games: 0,
        })
    }

    /// サマリーに記録する入力名
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    /// 対局を開始する
    ///
    /// `game.id` を採番して上書きし、メタデータを書いてから
    /// レーティング条件を判定する（除外対局もメタデータは残る）。
    pub fn begin_game(&mut self, game: &mut GameRecord) -> BookResult<GameSession> {
        game.id = self.next_game_id;
        self.next_game_id += 1;
        self.sink.put_game(game)?;

        let excluded = !self.rating.admits_text(&game.white_elo, &game.black_elo);
        if excluded {
            self.skipped_games += 1;
            log::debug!(
                "game {}: excluded by rating ({} / {})",
                game.id,
                game.white_elo,
                game.black_elo
            );
        }

        Ok(GameSession {
            game_id: game.id,
            outcome: game.outcome(),
            plies: 0,
            excluded,
            truncated: false,
        })
    }

    /// 1手を反映する。反映したら true
    pub fn record_ply(
        &mut self,
        session: &mut GameSession,
        key: PositionKey,
        move_id: MoveId,
        side: Side,
    ) -> bool {
        if session.excluded || session.plies >= self.max_ply {
            return false;
        }
        apply_event(
            &mut self.index,
            &PlyEvent {
                key,
                move_id,
                side,
                game_id: session.game_id,
                outcome: session.outcome,
            },
        );
        session.plies += 1;
        true
    }

    /// 不正な指し手で途中打ち切りになったことを記録する
    pub fn mark_truncated(&mut self, session: &mut GameSession) {
        session.truncated = true;
    }

    /// 対局を終える。バッチ間隔に達したら書き出す
    pub fn end_game(&mut self, session: GameSession) -> BookResult<()> {
        self.games_processed += 1;
        if session.truncated {
            self.truncated_games += 1;
            log::debug!("game {} truncated after {} plies", session.game_id, session.plies);
        }

        if self.progress_interval > 0 && self.games_processed % self.progress_interval == 0 {
            log::info!(
                "{} games processed ({} skipped by rating, {} truncated), {} positions in memory",
                self.games_processed,
                self.skipped_games,
                self.truncated_games,
                self.index.len()
            );
        }

        let due = self.batch_games.is_some_and(|n| self.games_processed % n == 0);
        if due {
            self.flusher.flush(&mut self.index, &mut self.sink)?;
        }
        Ok(())
    }

    /// 1対局をまとめて取り込む
    pub fn ingest_game(
        &mut self,
        game: &mut GameRecord,
        plies: impl IntoIterator<Item = (PositionKey, MoveId, Side)>,
    ) -> BookResult<GameId> {
        let mut session = self.begin_game(game)?;
        for (key, move_id, side) in plies {
            if !self.record_ply(&mut session, key, move_id, side) {
                break;
            }
        }
        let id = session.game_id();
        self.end_game(session)?;
        Ok(id)
    }

    /// 現在の集計インデックス
    #[inline]
    pub fn index(&self) -> &AggregationIndex {
        &self.index
    }

    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[inline]
    pub fn games_processed(&self) -> u64 {
        self.games_processed
    }

    #[inline]
    pub fn skipped_games(&self) -> u64 {
        self.skipped_games
    }

    /// 書き出し済みパス数
    #[inline]
    pub fn passes_written(&self) -> u32 {
        self.flusher.passes_written()
    }

    /// 最後のパスとサマリーを書き、sink を返す
    pub fn finish(mut self) -> BookResult<(RunSummary, S)> {
        self.flusher.flush(&mut self.index, &mut self.sink)?;

        let summary = RunSummary {
            total_games: self.games_processed,
            skipped_games: self.skipped_games,
            truncated_games: self.truncated_games,
            num_passes: self.flusher.passes_written(),
            source_name: std::mem::take(&mut self.source_name),
        };
        self.sink.finish(&summary)?;

        log::info!(
            "finished: {} games ({} skipped by rating, {} truncated), {} passes",
            summary.total_games,
            summary.skipped_games,
            summary.truncated_games,
            summary.num_passes
        );
        Ok((summary, self.sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compactor::{FilterConfig, keep_entry};
    use crate::error::BookError;
    use crate::schema::KvLayout;
    use crate::sink::{BinaryBookSink, KvSink};
    use crate::store::MemoryStore;

    const P: PositionKey = PositionKey::new(0xabcd);
    const M1: MoveId = 796;
    const M2: MoveId = 3364;

    fn game(result: &str) -> GameRecord {
        GameRecord {
            result: result.to_string(),
            white_elo: "2500".into(),
            black_elo: "2500".into(),
            ..GameRecord::default()
        }
    }

    fn builder(config: BookConfig) -> BookBuilder<KvSink<MemoryStore>> {
        BookBuilder::new(&config, KvSink::new(MemoryStore::new(), KvLayout::Typed)).unwrap()
    }

    #[test]
    fn test_apply_event() {
        let mut index = AggregationIndex::new();
        let event = PlyEvent {
            key: P,
            move_id: M1,
            side: Side::Black,
            game_id: 4,
            outcome: Outcome::BlackWin,
        };
        apply_event(&mut index, &event);
        let acc = index.get(P).unwrap();
        assert_eq!(acc.visit_count(), 1);
        assert_eq!(acc.white_score(), -1);
        assert_eq!(acc.side_to_move(), Side::Black);
        assert!(acc.game_ids().contains(&4));
    }

    #[test]
    fn test_revisit_within_game() {
        let mut b = builder(BookConfig::default());
        let mut g = game("1-0");
        b.ingest_game(&mut g, [(P, M1, Side::White), (P, M2, Side::White), (P, M1, Side::White)])
            .unwrap();

        let acc = b.index().get(P).unwrap();
        assert_eq!(acc.visit_count(), 3);
        assert_eq!(acc.game_ids().len(), 1);
        assert_eq!(acc.white_score(), 3);
    }

    #[test]
    fn test_three_game_scenario() {
        let mut b = builder(BookConfig::default());
        b.ingest_game(&mut game("1-0"), [(P, M1, Side::White), (P, M2, Side::Black)])
            .unwrap();
        b.ingest_game(&mut game("0-1"), [(P, M1, Side::White)]).unwrap();
        b.ingest_game(&mut game("1/2-1/2"), [(P, M1, Side::White)]).unwrap();

        let acc = b.index().get(P).unwrap();
        assert_eq!(acc.visit_count(), 4);
        assert_eq!(acc.white_score(), 2 - 1);
        assert_eq!(acc.draw_count(), 1);
        assert_eq!(acc.moves().iter().copied().collect::<Vec<_>>(), vec![M1, M2]);
        assert_eq!(acc.game_ids().iter().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_scenario_with_one_visit_per_game_is_filtered() {
        // 各対局で P を1回ずつ通る: 1 + (-1) + 0 = 0
        let mut b = builder(BookConfig::default());
        b.ingest_game(&mut game("1-0"), [(P, M2, Side::White)]).unwrap();
        b.ingest_game(&mut game("0-1"), [(P, M1, Side::White)]).unwrap();
        b.ingest_game(&mut game("1/2-1/2"), [(P, M1, Side::White)]).unwrap();

        let acc = b.index().get(P).unwrap();
        assert_eq!(acc.visit_count(), 3);
        assert_eq!(acc.white_score(), 0);
        assert_eq!(acc.draw_count(), 1);
        assert_eq!(acc.moves().len(), 2);
        assert_eq!(acc.game_ids().len(), 3);
        assert!(!keep_entry(acc, &FilterConfig::default()));
    }

    #[test]
    fn test_max_ply() {
        let config = BookConfig {
            max_ply: 2,
            ..BookConfig::default()
        };
        let mut b = builder(config);
        let mut g = game("1-0");
        let mut session = b.begin_game(&mut g).unwrap();
        assert!(b.record_ply(&mut session, PositionKey::new(1), 1, Side::White));
        assert!(b.record_ply(&mut session, PositionKey::new(2), 2, Side::Black));
        assert!(!b.record_ply(&mut session, PositionKey::new(3), 3, Side::White));
        assert_eq!(session.plies_recorded(), 2);
        b.end_game(session).unwrap();
        assert_eq!(b.index().len(), 2);
    }

    #[test]
    fn test_rating_exclusion_keeps_metadata() {
        let mut b = builder(BookConfig::default());
        let mut weak = GameRecord {
            result: "1-0".into(),
            white_elo: "1800".into(),
            black_elo: "2600".into(),
            ..GameRecord::default()
        };
        let id = b.ingest_game(&mut weak, [(P, M1, Side::White)]).unwrap();
        assert_eq!(id, 0);
        assert!(b.index().is_empty());
        assert_eq!(b.skipped_games(), 1);

        // 欠損レーティングは足切り値扱いで通る
        let mut unknown = GameRecord {
            result: "1-0".into(),
            ..GameRecord::default()
        };
        assert_eq!(b.ingest_game(&mut unknown, [(P, M1, Side::White)]).unwrap(), 1);
        assert_eq!(b.index().len(), 1);

        let (summary, sink) = b.finish().unwrap();
        assert_eq!(summary.total_games, 2);
        assert_eq!(summary.skipped_games, 1);
        let store = sink.into_store();
        assert!(store.get_str("v1/game/000000000000").is_some());
        assert!(store.get_str("v1/game/000000000001").is_some());
    }

    #[test]
    fn test_batched_flush_clears_index() {
        let config = BookConfig {
            batch_games: Some(2),
            ..BookConfig::default()
        };
        let mut b = builder(config);
        b.ingest_game(&mut game("1-0"), [(P, M1, Side::White)]).unwrap();
        assert_eq!(b.index().len(), 1);
        b.ingest_game(&mut game("0-1"), [(P, M1, Side::White)]).unwrap();
        // 2局でバッチ書き出し
        assert!(b.index().is_empty());
        assert_eq!(b.passes_written(), 1);

        b.ingest_game(&mut game("0-1"), [(P, M2, Side::Black)]).unwrap();
        let acc = b.index().get(P).unwrap();
        assert_eq!(acc.visit_count(), 1);
        assert_eq!(acc.side_to_move(), Side::Black);

        let (summary, sink) = b.finish().unwrap();
        assert_eq!(summary.num_passes, 2);
        let store = sink.into_store();
        assert!(store.get_str("v1/pos/000000/000000000000abcd").is_some());
        assert!(store.get_str("v1/pos/000001/000000000000abcd").is_some());
    }

    #[test]
    fn test_binary_sink_rejects_batching() {
        let config = BookConfig {
            batch_games: Some(10),
            ..BookConfig::default()
        };
        let sink = BinaryBookSink::new(Vec::new(), config.filter());
        let err = BookBuilder::new(&config, sink).err().unwrap();
        assert!(matches!(
            err,
            BookError::Config(ConfigError::BatchingWithBinaryOutput)
        ));
    }

    #[test]
    fn test_binary_sink_single_final_pass() {
        let config = BookConfig {
            min_games: 1,
            ..BookConfig::default()
        };
        let sink = BinaryBookSink::new(Vec::new(), config.filter());
        let mut b = BookBuilder::new(&config, sink).unwrap().with_source_name("t.pgn");
        for _ in 0..5 {
            b.ingest_game(&mut game("1-0"), [(P, M1, Side::White)]).unwrap();
        }
        let (summary, sink) = b.finish().unwrap();
        assert_eq!(summary.num_passes, 1);
        assert_eq!(summary.source_name, "t.pgn");
        assert_eq!(sink.records_written(), 1);
    }
}
