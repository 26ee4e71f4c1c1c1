//! TCP 流接收器.
//!
//! 拥有套接字的连接/拆除生命周期, 在专用网络线程上执行有界读循环,
//! 把每个非空字节块交给分帧器. 连接状态变化通过通道对外发布,
//! 供调用方诊断 — 这是唯一的存活性信号, 单次读取不设超时.

use std::io::Read;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use log::{debug, info, warn};

use liu_core::{LiuError, LiuResult};

/// 单次读取的字节数上限 (64 KiB)
pub const READ_CHUNK_LIMIT: usize = 64 * 1024;

/// 连接状态事件
///
/// 连接失败只报告一次, 接收器不做内部重试 — 重试策略属于调用方.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// 正在建立连接
    Connecting,
    /// 连接就绪, 读循环即将开始
    Ready,
    /// 对端正常关闭或本端主动断开
    Closed,
    /// 连接失败或读取出错 (终止本次连接)
    Failed(String),
}

/// 断开句柄
///
/// 从接收器分离出来、可跨线程持有; `shutdown()` 关闭套接字以
/// 解除阻塞中的读取, 使读循环退出.
pub struct ShutdownHandle {
    stream: TcpStream,
    stopping: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// 主动断开连接
    ///
    /// 置停止标志后关闭套接字双向通道; 之后读循环以 `Closed`
    /// 事件收尾, 不会误报 `Failed`.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::Release);
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// TCP 流接收器
pub struct TcpReceiver {
    stream: TcpStream,
    events: Sender<ConnectionEvent>,
    stopping: Arc<AtomicBool>,
}

impl TcpReceiver {
    /// 建立到 `host:port` 的 TCP 连接
    ///
    /// 成功后发布 `Ready`; 失败发布一次 `Failed` 并返回错误.
    pub fn connect(host: &str, port: u16, events: Sender<ConnectionEvent>) -> LiuResult<Self> {
        let _ = events.send(ConnectionEvent::Connecting);
        info!("正在连接: {}:{}", host, port);

        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| {
                let msg = format!("地址解析失败: {}:{}: {}", host, port, e);
                let _ = events.send(ConnectionEvent::Failed(msg.clone()));
                LiuError::Connection(msg)
            })?
            .collect::<Vec<_>>();

        let stream = addrs
            .iter()
            .find_map(|addr| TcpStream::connect(addr).ok())
            .ok_or_else(|| {
                let msg = format!("无法连接到 {}:{}", host, port);
                warn!("{}", msg);
                let _ = events.send(ConnectionEvent::Failed(msg.clone()));
                LiuError::Connection(msg)
            })?;

        info!("连接成功: {}:{}", host, port);
        let _ = events.send(ConnectionEvent::Ready);

        Ok(Self {
            stream,
            events,
            stopping: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 获取断开句柄 (供其他线程调用 `shutdown`)
    pub fn shutdown_handle(&self) -> LiuResult<ShutdownHandle> {
        Ok(ShutdownHandle {
            stream: self.stream.try_clone()?,
            stopping: Arc::clone(&self.stopping),
        })
    }

    /// 运行读循环, 每个非空块回调 `on_chunk`
    ///
    /// 每次读取至多 [`READ_CHUNK_LIMIT`] 字节; 短读直接进入下一次
    /// 读取 (这是逻辑上的挂起点, 阻塞等待下一块数据). 读到 0 字节
    /// 表示对端关闭, 发布 `Closed`; 读取出错发布一次 `Failed`.
    /// 返回时连接已结束, 接收器被消费.
    pub fn run(mut self, mut on_chunk: impl FnMut(&[u8])) {
        let mut buf = vec![0u8; READ_CHUNK_LIMIT];

        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    debug!("对端关闭连接");
                    let _ = self.events.send(ConnectionEvent::Closed);
                    return;
                }
                Ok(n) => {
                    on_chunk(&buf[..n]);
                }
                Err(e) => {
                    if self.stopping.load(Ordering::Acquire) {
                        // 本端主动断开导致的读取中断不是故障
                        debug!("读循环因主动断开而退出");
                        let _ = self.events.send(ConnectionEvent::Closed);
                    } else {
                        warn!("读取错误: {}", e);
                        let _ = self.events.send(ConnectionEvent::Failed(e.to_string()));
                    }
                    return;
                }
            }
        }
    }
}
