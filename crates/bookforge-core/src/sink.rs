//! 書き出し先の抽象（BookSink）
//!
//! 取り込みと集計はこのトレイトの契約にのみ依存する。
//!
//! - `KvSink`: KV ストアへパスごとにまとめ書き（バッチモード）
//! - `BinaryBookSink`: 全体を1パスで受け取り、固定長バイナリ定跡を書く（エクスポートモード）

use crate::accumulator::Accumulator;
use crate::compactor::{self, FilterConfig};
use crate::error::SinkError;
use crate::game::{GameRecord, RunSummary};
use crate::schema::KvLayout;
use crate::store::{KvStore, WriteBatch};
use std::io::Write;

/// 書き出し先
pub trait BookSink {
    /// 対局メタデータを即座に書く
    fn put_game(&mut self, game: &GameRecord) -> Result<(), SinkError>;

    /// 1パス分の集計をまとめて書く
    ///
    /// 成功するまで呼び出し側は集計を捨てない。
    fn write_pass(&mut self, pass: u32, entries: &[Accumulator]) -> Result<(), SinkError>;

    /// 実行終了時のトップレベル情報
    fn finish(&mut self, summary: &RunSummary) -> Result<(), SinkError>;

    /// 集計全体を1パスで必要とするか（true ならバッチ書き出し不可）
    fn retains_whole_corpus(&self) -> bool {
        false
    }

    /// ログ用の名前
    fn name(&self) -> &'static str;
}

impl<S: BookSink + ?Sized> BookSink for Box<S> {
    fn put_game(&mut self, game: &GameRecord) -> Result<(), SinkError> {
        (**self).put_game(game)
    }

    fn write_pass(&mut self, pass: u32, entries: &[Accumulator]) -> Result<(), SinkError> {
        (**self).write_pass(pass, entries)
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<(), SinkError> {
        (**self).finish(summary)
    }

    fn retains_whole_corpus(&self) -> bool {
        (**self).retains_whole_corpus()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// KV ストアへのバッチ書き出し
pub struct KvSink<K: KvStore> {
    store: K,
    layout: KvLayout,
}

impl<K: KvStore> KvSink<K> {
    pub fn new(store: K, layout: KvLayout) -> Self {
        Self { store, layout }
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    pub fn into_store(self) -> K {
        self.store
    }
}

impl<K: KvStore> BookSink for KvSink<K> {
    fn put_game(&mut self, game: &GameRecord) -> Result<(), SinkError> {
        let (key, value) = self.layout.game_entry(game)?;
        self.store.put(&key, &value)?;
        Ok(())
    }

    fn write_pass(&mut self, pass: u32, entries: &[Accumulator]) -> Result<(), SinkError> {
        let per_entry = match self.layout {
            KvLayout::Legacy => 5,
            KvLayout::Typed => 1,
        };
        let mut batch = WriteBatch::with_capacity(entries.len() * per_entry);
        for acc in entries {
            self.layout.put_position(&mut batch, pass, acc)?;
        }
        log::debug!(
            "pass {pass}: writing {} positions ({} puts, ~{} bytes)",
            entries.len(),
            batch.len(),
            batch.approximate_size()
        );
        self.store.write_batch(batch)?;
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<(), SinkError> {
        let mut batch = WriteBatch::new();
        self.layout.put_summary(&mut batch, summary)?;
        self.store.write_batch(batch)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        match self.layout {
            KvLayout::Legacy => "kv-store (legacy layout)",
            KvLayout::Typed => "kv-store (typed layout)",
        }
    }
}

/// 固定長バイナリ定跡
pub struct BinaryBookSink<W: Write> {
    writer: W,
    filter: FilterConfig,
    pass_written: bool,
    records_written: usize,
}

impl<W: Write> BinaryBookSink<W> {
    pub fn new(writer: W, filter: FilterConfig) -> Self {
        Self {
            writer,
            filter,
            pass_written: false,
            records_written: 0,
        }
    }

    /// 書き出したレコード数
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl<W: Write> BookSink for BinaryBookSink<W> {
    fn put_game(&mut self, _game: &GameRecord) -> Result<(), SinkError> {
        // バイナリ定跡は対局メタデータを持たない
        Ok(())
    }

    fn write_pass(&mut self, pass: u32, entries: &[Accumulator]) -> Result<(), SinkError> {
        if pass != 0 || self.pass_written {
            return Err(SinkError::MultiplePasses { pass });
        }
        let book = compactor::compact(entries, &self.filter);
        compactor::write_book(&mut self.writer, &book)?;
        self.pass_written = true;
        self.records_written = book.len();
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<(), SinkError> {
        self.writer.flush()?;
        log::info!(
            "binary book: {} records from {} games",
            self.records_written,
            summary.total_games
        );
        Ok(())
    }

    fn retains_whole_corpus(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "binary-book"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compactor::{RECORD_SIZE, read_book};
    use crate::store::MemoryStore;
    use crate::types::{Outcome, PositionKey, Side};

    fn accumulators() -> Vec<Accumulator> {
        let mut a = Accumulator::new(PositionKey::new(20), Side::White);
        let mut b = Accumulator::new(PositionKey::new(10), Side::Black);
        for g in 0..3 {
            a.apply(1, g, Outcome::WhiteWin);
            b.apply(2, g, Outcome::BlackWin);
        }
        vec![a, b]
    }

    #[test]
    fn test_kv_sink_typed() {
        let mut sink = KvSink::new(MemoryStore::new(), KvLayout::Typed);
        sink.write_pass(0, &accumulators()).unwrap();
        sink.put_game(&GameRecord {
            id: 0,
            result: "1-0".into(),
            ..GameRecord::default()
        })
        .unwrap();
        sink.finish(&RunSummary::default()).unwrap();

        let store = sink.into_store();
        assert!(store.get_str("v1/pos/000000/0000000000000014").is_some());
        assert!(store.get_str("v1/pos/000000/000000000000000a").is_some());
        assert!(store.get_str("v1/game/000000000000").is_some());
        assert!(store.get_str("v1/meta/summary").is_some());
    }

    #[test]
    fn test_kv_sink_legacy() {
        let mut sink = KvSink::new(MemoryStore::new(), KvLayout::Legacy);
        sink.write_pass(2, &accumulators()).unwrap();
        sink.finish(&RunSummary {
            total_games: 3,
            num_passes: 3,
            source_name: "x.pgn".into(),
            ..RunSummary::default()
        })
        .unwrap();

        let store = sink.store();
        assert_eq!(store.get_str("20_freq_p_2"), Some("3"));
        assert_eq!(store.get_str("10_white_score_p_2"), Some("-3"));
        assert_eq!(store.get_str("10_p_2"), Some("0,1,2,"));
        assert_eq!(store.get_str("numPasses"), Some("3"));
        assert_eq!(store.len(), 10 + 3);
    }

    #[test]
    fn test_binary_sink_single_pass() {
        let mut sink = BinaryBookSink::new(Vec::new(), FilterConfig::default());
        assert!(sink.retains_whole_corpus());
        sink.write_pass(0, &accumulators()).unwrap();
        sink.finish(&RunSummary::default()).unwrap();
        assert_eq!(sink.records_written(), 2);

        // 2回目のパスは拒否
        let err = sink.write_pass(1, &accumulators()).unwrap_err();
        assert!(matches!(err, SinkError::MultiplePasses { pass: 1 }));

        let bytes = sink.into_writer();
        assert_eq!(bytes.len(), 2 * RECORD_SIZE);
        let entries = read_book(&mut bytes.as_slice()).unwrap();
        assert_eq!(entries[0].key, PositionKey::new(10));
        assert_eq!(entries[0].score, -3);
        assert_eq!(entries[1].key, PositionKey::new(20));
    }

    #[test]
    fn test_binary_sink_rejects_second_pass_even_if_empty() {
        let mut sink = BinaryBookSink::new(Vec::new(), FilterConfig::default());
        assert!(sink.write_pass(1, &accumulators()).is_err());
        sink.write_pass(0, &[]).unwrap();
        assert_eq!(sink.records_written(), 0);
        assert!(sink.write_pass(0, &accumulators()).is_err());
    }

    #[test]
    fn test_boxed_sink() {
        let mut sink: Box<dyn BookSink> = Box::new(KvSink::new(MemoryStore::new(), KvLayout::Typed));
        assert_eq!(sink.name(), "kv-store (typed layout)");
        assert!(!sink.retains_whole_corpus());
        sink.write_pass(0, &[]).unwrap();
    }
}
