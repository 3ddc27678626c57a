//! パスのロールアップ
//!
//! バッチ書き出しは各パスを別キーに上書きで書くので、局面の通算集計は
//! 全パスを読み合わせて初めて得られる。Typed レイアウトのみ対応
//! （Legacy は手番を記録しないため集計を復元できない）。

use crate::error::{BookError, SchemaError};
use crate::game::RunSummary;
use crate::index::AggregationIndex;
use crate::schema::{POSITION_PREFIX, PositionRecord, RecordKey};
use crate::store::KvStore;

/// 全パスの局面レコードを1つのインデックスへ合算する
pub fn rollup_passes(store: &impl KvStore) -> Result<AggregationIndex, BookError> {
    let mut index = AggregationIndex::new();
    let mut records = 0usize;
    let mut max_pass = None;

    store.for_each_prefix(POSITION_PREFIX, |key, value| -> Result<(), BookError> {
        let RecordKey::Position { pass, key: position } = RecordKey::parse(key)? else {
            return Err(SchemaError::UnknownKey(key.to_string()).into());
        };
        let record = PositionRecord::decode(key, value)?;
        if record.key != position || record.pass != pass {
            log::warn!("record {key} disagrees with its key (pass {}, key {:016x})", record.pass, record.key);
        }
        let side = record.side_to_move;
        let acc = record.into_accumulator();
        index.find_or_create(acc.key(), side).merge(&acc);

        records += 1;
        max_pass = max_pass.max(Some(pass));
        Ok(())
    })?;

    log::info!(
        "rolled up {records} position records from {} passes into {} positions",
        max_pass.map_or(0, |p| p + 1),
        index.len()
    );
    Ok(index)
}

/// 実行サマリーを読む（なければ `None`）
pub fn read_summary(store: &impl KvStore) -> Result<Option<RunSummary>, BookError> {
    let key = RecordKey::summary().encode();
    let Some(bytes) = store.get(&key)? else {
        return Ok(None);
    };
    let summary = serde_json::from_slice(&bytes).map_err(|source| SchemaError::Value { key, source })?;
    Ok(Some(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::Accumulator;
    use crate::schema::KvLayout;
    use crate::sink::{BookSink, KvSink};
    use crate::store::MemoryStore;
    use crate::types::{Outcome, PositionKey, Side};

    #[test]
    fn test_rollup_merges_passes() {
        let key = PositionKey::new(77);
        let mut first = Accumulator::new(key, Side::Black);
        first.apply(1, 0, Outcome::WhiteWin);
        first.apply(1, 1, Outcome::Draw);
        let mut second = Accumulator::new(key, Side::Black);
        second.apply(2, 5, Outcome::BlackWin);
        let other = {
            let mut acc = Accumulator::new(PositionKey::new(3), Side::White);
            acc.apply(9, 5, Outcome::BlackWin);
            acc
        };

        let mut sink = KvSink::new(MemoryStore::new(), KvLayout::Typed);
        sink.write_pass(0, &[first]).unwrap();
        sink.write_pass(1, &[second, other]).unwrap();
        sink.finish(&RunSummary {
            total_games: 6,
            num_passes: 2,
            ..RunSummary::default()
        })
        .unwrap();
        let store = sink.into_store();

        let index = rollup_passes(&store).unwrap();
        assert_eq!(index.len(), 2);
        let acc = index.get(key).unwrap();
        assert_eq!(acc.visit_count(), 3);
        assert_eq!(acc.white_score(), 0);
        assert_eq!(acc.draw_count(), 1);
        assert_eq!(acc.side_to_move(), Side::Black);
        assert_eq!(acc.moves().len(), 2);
        assert_eq!(acc.game_ids().iter().copied().collect::<Vec<_>>(), vec![0, 1, 5]);

        let summary = read_summary(&store).unwrap().unwrap();
        assert_eq!(summary.total_games, 6);
        assert_eq!(summary.num_passes, 2);
    }

    #[test]
    fn test_rollup_empty_store() {
        let store = MemoryStore::new();
        assert!(rollup_passes(&store).unwrap().is_empty());
        assert!(read_summary(&store).unwrap().is_none());
    }

    #[test]
    fn test_rollup_rejects_corrupt_record() {
        let mut store = MemoryStore::new();
        store.put("v1/pos/000000/0000000000000001", b"not json").unwrap();
        let err = rollup_passes(&store).unwrap_err();
        assert!(matches!(err, BookError::Schema(SchemaError::Value { .. })));
    }
}
