//! バッチ書き出し（BatchFlusher）
//!
//! 集計インデックスの内容をパス番号付きで sink に1回のまとめ書きで渡し、
//! 成功したらインデックスを空にしてパス番号を進める。
//! 失敗時はインデックスを残したままエラーを返す（直前の完了パスが復旧点）。

use crate::error::SinkError;
use crate::index::AggregationIndex;
use crate::sink::BookSink;

/// パス番号を管理するバッチ書き出し器
#[derive(Debug, Default)]
pub struct BatchFlusher {
    /// 次に書くパス番号
    next_pass: u32,
}

impl BatchFlusher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次に書くパス番号（= 書き出し済みパス数）
    #[inline]
    pub fn next_pass(&self) -> u32 {
        self.next_pass
    }

    /// 書き出し済みパス数
    #[inline]
    pub fn passes_written(&self) -> u32 {
        self.next_pass
    }

    /// インデックスを書き出して空にする
    ///
    /// 空のインデックスでもパスとして書く（パス番号を連番に保つ）。
    pub fn flush<S: BookSink + ?Sized>(
        &mut self,
        index: &mut AggregationIndex,
        sink: &mut S,
    ) -> Result<u32, SinkError> {
        let pass = self.next_pass;
        let positions = index.len();
        sink.write_pass(pass, index.entries())?;

        index.clear();
        self.next_pass += 1;
        log::info!("flushed pass {pass}: {positions} positions to {}", sink.name());
        Ok(pass)
    }
}
