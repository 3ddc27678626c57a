//! 集計インデックス（AggregationIndex）
//!
//! 局面キー → Accumulator のオープンアドレス法ハッシュマップ。
//!
//! - `entries`: Accumulator の可変長配列（挿入順）
//! - `hash`: `entries` への添字を持つスロット配列。長さは常に `2 * capacity`
//! - 探索は `key & mask` から線形探索（末尾で折り返す）
//!
//! 容量が埋まったら倍に拡張し、`hash` を全エントリから作り直す。
//! 拡張は挿入時にのみ起き、参照だけでは起きない。

use crate::accumulator::Accumulator;
use crate::types::{PositionKey, Side};

/// 空きスロットを表す番兵
const EMPTY: u32 = u32::MAX;

/// 最小容量（エントリ数）
pub const MIN_CAPACITY: usize = 256;

/// 集計インデックス
#[derive(Debug)]
pub struct AggregationIndex {
    entries: Vec<Accumulator>,
    /// `entries` の論理容量（`entries.len() <= capacity`）
    capacity: usize,
    hash: Vec<u32>,
    mask: u64,
}

impl AggregationIndex {
    /// 最小容量で作成
    pub fn new() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }

    /// 容量を指定して作成（2の冪に切り上げ）
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY).next_power_of_two();
        let mut index = Self {
            entries: Vec::new(),
            capacity: 0,
            hash: Vec::new(),
            mask: 0,
        };
        index.allocate(capacity);
        index
    }

    /// 登録済みの局面数
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 現在の容量（エントリ数）
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// ハッシュ配列の長さ（常に容量の2倍）
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.hash.len()
    }

    /// 既存の集計を返す。なければゼロ初期化したものを作って返す。
    ///
    /// `side_to_move` は新規作成時にのみ記録される。
    pub fn find_or_create(&mut self, key: PositionKey, side_to_move: Side) -> &mut Accumulator {
        let pos = match self.probe(key) {
            Ok(pos) => pos,
            Err(mut slot) => {
                if self.entries.len() == self.capacity {
                    self.grow();
                    // 作り直したので空きスロットを探し直す
                    slot = match self.probe(key) {
                        Ok(_) => unreachable!("key inserted during resize"),
                        Err(slot) => slot,
                    };
                }
                let pos = self.entries.len();
                self.entries.push(Accumulator::new(key, side_to_move));
                self.hash[slot] = pos as u32;
                pos
            }
        };
        &mut self.entries[pos]
    }

    /// 参照のみ（拡張は起きない）
    pub fn get(&self, key: PositionKey) -> Option<&Accumulator> {
        self.probe(key).ok().map(|pos| &self.entries[pos])
    }

    /// 全エントリを挿入順に列挙
    pub fn iter(&self) -> impl Iterator<Item = &Accumulator> + '_ {
        self.entries.iter()
    }

    /// 全エントリ（挿入順）
    #[inline]
    pub fn entries(&self) -> &[Accumulator] {
        &self.entries
    }

    /// 全エントリ（所有する集合を含む）を解放し、最小容量に戻す
    pub fn clear(&mut self) {
        self.entries = Vec::new();
        self.hash = Vec::new();
        self.capacity = 0;
        self.allocate(MIN_CAPACITY);
    }

    /// `Ok(entries の添字)` または `Err(空きスロット)`
    #[inline]
    fn probe(&self, key: PositionKey) -> Result<usize, usize> {
        let mut slot = (key.raw() & self.mask) as usize;
        loop {
            let pos = self.hash[slot];
            if pos == EMPTY {
                return Err(slot);
            }
            if self.entries[pos as usize].key() == key {
                return Ok(pos as usize);
            }
            slot = (slot + 1) & self.mask as usize;
        }
    }

    fn grow(&mut self) {
        let new_capacity = self.capacity * 2;
        log::debug!(
            "aggregation index grow: {} -> {} entries",
            self.capacity,
            new_capacity
        );
        self.allocate(new_capacity);
    }

    /// 容量を `capacity` にし、ハッシュ配列を作り直す
    ///
    /// Accumulator 自体は移動しても添字が変わらないので、対応関係は保たれる。
    fn allocate(&mut self, capacity: usize) {
        debug_assert!(capacity.is_power_of_two());
        debug_assert!(capacity >= self.entries.len());

        let additional = capacity - self.entries.len();
        if let Err(e) = self.entries.try_reserve_exact(additional) {
            abort_on_alloc_failure(capacity, &e);
        }
        let slots = capacity * 2;
        let mut hash = Vec::new();
        if let Err(e) = hash.try_reserve_exact(slots) {
            abort_on_alloc_failure(capacity, &e);
        }
        hash.resize(slots, EMPTY);

        self.hash = hash;
        self.capacity = capacity;
        self.mask = (slots - 1) as u64;

        for (pos, entry) in self.entries.iter().enumerate() {
            let mut slot = (entry.key().raw() & self.mask) as usize;
            while self.hash[slot] != EMPTY {
                slot = (slot + 1) & self.mask as usize;
            }
            self.hash[slot] = pos as u32;
        }
    }
}

impl Default for AggregationIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// 確保失敗は復旧不能。壊れたインデックスで続行せずに停止する。
#[cold]
fn abort_on_alloc_failure(capacity: usize, err: &std::collections::TryReserveError) -> ! {
    log::error!("aggregation index: failed to allocate {capacity} entries: {err}");
    eprintln!("fatal: aggregation index allocation failed ({capacity} entries): {err}");
    std::process::abort()
}
