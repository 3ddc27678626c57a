//! KV ストアの抽象と実装
//!
//! 集計エンジンが要求するのは put / get / まとめ書き（原子的）/ 接頭辞走査のみ。
//! 永続性やコンパクションはストア側の責務。
//!
//! - `SqliteStore`: SQLite（WAL）による永続ストア
//! - `MemoryStore`: テスト・ドライラン用のインメモリストア

use crate::error::StoreError;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::Path;

/// まとめ書きの単位
///
/// `KvStore::write_batch` で全件が一括で反映される（途中状態は見えない）。
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    ops: Vec<(String, Vec<u8>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            ops: Vec::with_capacity(n),
        }
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.ops.push((key.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> + '_ {
        self.ops.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// バイト数の概算（ログ用）
    pub fn approximate_size(&self) -> usize {
        self.ops.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

/// KV ストアの契約
pub trait KvStore {
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// バッチを原子的に書き込む
    fn write_batch(&mut self, batch: WriteBatch) -> Result<(), StoreError>;

    /// 接頭辞に一致するエントリをキー昇順に1件ずつ `f` へ渡す
    ///
    /// 全件をメモリに載せない。`f` がエラーを返したらそこで走査を打ち切る。
    fn for_each_prefix<E, F>(&self, prefix: &str, f: F) -> Result<(), E>
    where
        E: From<StoreError>,
        F: FnMut(&str, &[u8]) -> Result<(), E>;
}

/// インメモリストア
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// 値を文字列として取得（テスト用）
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }
}

impl KvStore for MemoryStore {
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.map.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.map.get(key).cloned())
    }

    fn write_batch(&mut self, batch: WriteBatch) -> Result<(), StoreError> {
        self.map.extend(batch.ops);
        Ok(())
    }

    fn for_each_prefix<E, F>(&self, prefix: &str, mut f: F) -> Result<(), E>
    where
        E: From<StoreError>,
        F: FnMut(&str, &[u8]) -> Result<(), E>,
    {
        let rows = self.map.range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded)).take_while(|(k, _)| k.starts_with(prefix));
        for (key, value) in rows {
            f(key, value)?;
        }
        Ok(())
    }
}

/// SQLite による永続ストア
///
/// `kv(key TEXT PRIMARY KEY, value BLOB)` の1テーブルのみ。
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// ストアを開く（なければ作成）
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let open_err = |source| StoreError::Open {
            path: path.clone(),
            source,
        };
        let conn = Connection::open(&path).map_err(open_err)?;
        // journal_mode は結果行を返すので query_row で受ける
        let mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(open_err)?;
        log::debug!("kv store journal_mode={mode}");
        conn.pragma_update(None, "synchronous", "NORMAL").map_err(open_err)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                 key TEXT PRIMARY KEY NOT NULL,
                 value BLOB NOT NULL
             ) WITHOUT ROWID;",
        )
        .map_err(open_err)?;

        log::info!("opened kv store {}", path.display());
        Ok(Self { conn })
    }
}

impl KvStore for SqliteStore {
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.conn
            .prepare_cached("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)")?
            .execute(params![key, value])?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn write_batch(&mut self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)")?;
            for (key, value) in &batch.ops {
                stmt.execute(params![key, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn for_each_prefix<E, F>(&self, prefix: &str, mut f: F) -> Result<(), E>
    where
        E: From<StoreError>,
        F: FnMut(&str, &[u8]) -> Result<(), E>,
    {
        // LIKE はワイルドカードのエスケープが要るので範囲比較で代用する
        let mut stmt = self
            .conn
            .prepare_cached("SELECT key, value FROM kv WHERE key >= ?1 ORDER BY key")
            .map_err(StoreError::from)?;
        let rows = stmt
            .query_map(params![prefix], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(StoreError::from)?;

        // カーソルから1行ずつ読む
        for row in rows {
            let (key, value) = row.map_err(StoreError::from)?;
            if !key.starts_with(prefix) {
                break;
            }
            f(&key, &value)?;
        }
        Ok(())
    }
}
