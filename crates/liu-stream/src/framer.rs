//! Annex B 增量分帧器.
//!
//! 从任意切分的字节块中重组完整的 NAL 单元. 这是管线的正确性
//! 关键件: 一个单元绝不拆成两次发射, 不完整的尾部单元绝不提前发射.
//!
//! 算法: 每收到一个新块就追加到累积缓冲区, 从头查找起始码;
//! 两个相邻起始码严格之间的字节 (去掉前导起始码) 构成一个完整
//! 单元; 最后一个起始码之后的尾部尚未封闭, 留在缓冲区等待后续
//! 数据. 发射过的字节立即从缓冲区前端移除, 约束内存增长.

use log::debug;

use liu_codec::nal::{NalUnit, find_start_code, start_code_len};

/// Annex B 增量分帧器
///
/// 累积缓冲区由分帧器独占: 只在收块时追加、在提取后做前缀移除.
/// 已发射单元之前的字节不会被保留.
pub struct AnnexBFramer {
    /// 累积缓冲区
    buffer: Vec<u8>,
    /// 已发射的 NAL 单元总数
    emitted: u64,
}

impl AnnexBFramer {
    /// 创建分帧器
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            emitted: 0,
        }
    }

    /// 送入一个字节块, 返回其中封闭完成的 NAL 单元 (按到达顺序)
    ///
    /// 块边界不影响输出: 同一字节流无论如何切分, 发射的单元序列
    /// 逐字节一致. 去掉起始码后长度为零的单元静默丢弃.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<NalUnit> {
        self.buffer.extend_from_slice(chunk);

        let mut units = Vec::new();
        loop {
            let Some(start) = find_start_code(&self.buffer, 0) else {
                break;
            };
            let sc_len = start_code_len(&self.buffer, start);
            // 下一个起始码封闭当前单元; 找不到则尾部继续等待数据
            let Some(end) = find_start_code(&self.buffer, start + sc_len) else {
                break;
            };

            let payload = self.buffer[start + sc_len..end].to_vec();
            // 前端移除: 已消费的前导字节与单元本体一并丢弃
            self.buffer.drain(..end);

            if payload.is_empty() {
                // 起始码紧邻 (00 00 01 00 00 01): 零长度单元按空操作处理
                continue;
            }

            match NalUnit::parse(payload) {
                Ok(nal) => {
                    self.emitted += 1;
                    units.push(nal);
                }
                Err(e) => {
                    // 畸形单元静默丢弃, 不中断流
                    debug!("丢弃畸形 NAL 单元: {}", e);
                }
            }
        }

        units
    }

    /// 当前缓冲的未封闭字节数
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// 已发射的 NAL 单元总数
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// 丢弃缓冲状态 (连接断开时调用, 不完整尾部不会被发射)
    pub fn reset(&mut self) {
        if !self.buffer.is_empty() {
            debug!("丢弃 {} 字节未封闭的尾部数据", self.buffer.len());
        }
        self.buffer.clear();
    }
}

impl Default for AnnexBFramer {
    fn default() -> Self {
        Self::new()
    }
}
