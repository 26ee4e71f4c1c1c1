//! 流管线装配.
//!
//! 把接收、分帧、参数集管理、解码提交与帧交付装配成一条跨线程
//! 管线. 三个执行上下文:
//! - 网络线程: 读循环 + 分帧, 对累积缓冲区严格串行;
//! - 解码提交线程: 独占参数集缓存与会话管理器, 保证 NAL 提交顺序;
//! - 解码完成上下文: 引擎线程回调, 经有界通道把帧交给显示协作方.
//!
//! 参数集缓存与活动会话只在提交线程上被触碰, 与拆除路径无竞争.
//! 对发送端没有任何反压: 帧接收端拥塞时在解码层丢帧, 绝不阻塞
//! 网络读取.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;

use log::{debug, info, warn};

use liu_codec::engine::{DecodeEngine, FrameCallback};
use liu_codec::frame::VideoFrame;
use liu_codec::nal::NalUnit;
use liu_codec::parameter_sets::{CacheAction, ParameterSetCache};
use liu_codec::session::DecodeSessionManager;
use liu_core::LiuResult;

use crate::framer::AnnexBFramer;
use crate::receiver::{ConnectionEvent, ShutdownHandle, TcpReceiver};

/// 帧交付通道的默认容量
const DEFAULT_FRAME_QUEUE_CAPACITY: usize = 8;

/// 流管线配置
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// 目标主机
    pub host: String,
    /// 目标端口
    pub port: u16,
    /// 已配置后参数集变化时是否重建解码会话
    ///
    /// 默认 false: 每个连接只配置一次, 流中途的参数集变化被忽略
    /// (与参考实现一致). 发送端会动态变更分辨率时开启.
    pub reconfigure_on_change: bool,
    /// 帧交付通道容量 (满时丢帧, 不阻塞解码完成上下文)
    pub frame_queue_capacity: usize,
}

impl StreamConfig {
    /// 以默认策略创建配置
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            reconfigure_on_change: false,
            frame_queue_capacity: DEFAULT_FRAME_QUEUE_CAPACITY,
        }
    }
}

/// 管线计数器快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// 收到的字节总数
    pub bytes_received: u64,
    /// 收到的非空块数
    pub chunks_received: u64,
    /// 分帧出的 NAL 单元数
    pub nal_units_framed: u64,
    /// 会话未就绪期间丢弃的 NAL 单元数
    pub nal_units_dropped: u64,
    /// 会话配置成功次数
    pub sessions_configured: u64,
    /// 解码成功的帧数
    pub frames_decoded: u64,
    /// 成功交付给接收端的帧数
    pub frames_delivered: u64,
    /// 丢弃的帧数 (接收端已满或管线已拆除)
    pub frames_dropped: u64,
    /// 单帧解码失败次数
    pub decode_errors: u64,
}

/// 跨线程共享的计数器
#[derive(Default)]
struct SharedCounters {
    bytes_received: AtomicU64,
    chunks_received: AtomicU64,
    nal_units_framed: AtomicU64,
    nal_units_dropped: AtomicU64,
    sessions_configured: AtomicU64,
    frames_decoded: AtomicU64,
    frames_delivered: AtomicU64,
    frames_dropped: AtomicU64,
    decode_errors: AtomicU64,
}

impl SharedCounters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            nal_units_framed: self.nal_units_framed.load(Ordering::Relaxed),
            nal_units_dropped: self.nal_units_dropped.load(Ordering::Relaxed),
            sessions_configured: self.sessions_configured.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// 流管线
///
/// `start()` 立即返回, 连接在网络线程上异步建立; 连接失败表现为
/// 事件通道上的一次 `Failed`. `stop()` 取消未完成的读取、丢弃
/// 累积缓冲并使解码会话失效; 拆除后到达的解码完成帧被直接忽略.
pub struct StreamPipeline {
    events: Option<Receiver<ConnectionEvent>>,
    frames: Option<Receiver<VideoFrame>>,
    counters: Arc<SharedCounters>,
    /// 请求停止标志
    stop_flag: Arc<AtomicBool>,
    /// 管线存活标志, 拆除后迟到的解码完成帧据此被忽略
    alive: Arc<AtomicBool>,
    /// 断开句柄槽, 由网络线程在连接建立后填充
    shutdown_slot: Arc<Mutex<Option<ShutdownHandle>>>,
    net_thread: Option<JoinHandle<()>>,
    submit_thread: Option<JoinHandle<()>>,
}

impl StreamPipeline {
    /// 启动管线
    ///
    /// 以指定引擎解码; 立即返回, 之后的连接状态经
    /// [`take_events`](Self::take_events) 观察.
    pub fn start(config: StreamConfig, engine: Box<dyn DecodeEngine>) -> LiuResult<Self> {
        let counters = Arc::new(SharedCounters::default());
        let stop_flag = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let shutdown_slot: Arc<Mutex<Option<ShutdownHandle>>> = Arc::new(Mutex::new(None));

        let (event_tx, event_rx) = mpsc::channel();
        let (nal_tx, nal_rx) = mpsc::channel::<NalUnit>();
        let (frame_tx, frame_rx) = sync_channel::<VideoFrame>(config.frame_queue_capacity.max(1));

        // 网络线程: 连接 → 读循环 → 分帧
        let net_counters = Arc::clone(&counters);
        let net_stop = Arc::clone(&stop_flag);
        let net_slot = Arc::clone(&shutdown_slot);
        let host = config.host.clone();
        let port = config.port;
        let net_thread = std::thread::Builder::new()
            .name("liu-net".into())
            .spawn(move || {
                let Ok(receiver) = TcpReceiver::connect(&host, port, event_tx) else {
                    // 失败已通过事件通道报告过一次
                    return;
                };

                // 先存句柄再查停止标志, 保证 stop() 总能关闭套接字
                if let Ok(handle) = receiver.shutdown_handle() {
                    if let Ok(mut slot) = net_slot.lock() {
                        *slot = Some(handle);
                    }
                }
                if net_stop.load(Ordering::Acquire) {
                    if let Ok(mut slot) = net_slot.lock() {
                        if let Some(handle) = slot.take() {
                            handle.shutdown();
                        }
                    }
                }

                let mut framer = AnnexBFramer::new();
                receiver.run(|chunk| {
                    net_counters
                        .bytes_received
                        .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                    net_counters.chunks_received.fetch_add(1, Ordering::Relaxed);

                    for nal in framer.push(chunk) {
                        net_counters.nal_units_framed.fetch_add(1, Ordering::Relaxed);
                        if nal_tx.send(nal).is_err() {
                            // 提交线程已退出; 继续读取直到连接结束
                            return;
                        }
                    }
                });

                // 连接结束: 未封闭的尾部数据被丢弃, 绝不发射截断单元
                framer.reset();
            })?;

        // 解码提交线程: 独占参数集缓存与会话管理器
        let sub_counters = Arc::clone(&counters);
        let sub_alive = Arc::clone(&alive);
        let reconfigure = config.reconfigure_on_change;
        let submit_thread = std::thread::Builder::new()
            .name("liu-decode".into())
            .spawn(move || {
                let mut cache = ParameterSetCache::new(reconfigure);
                let mut mgr = DecodeSessionManager::new(engine);

                while let Ok(nal) = nal_rx.recv() {
                    match cache.observe(&nal) {
                        CacheAction::None => {}
                        CacheAction::Configure | CacheAction::Reconfigure => {
                            let pair = match (cache.sps(), cache.pps()) {
                                (Some(sps), Some(pps)) => Some((sps.clone(), pps.clone())),
                                _ => None,
                            };
                            if let Some((sps, pps)) = pair {
                                let callback = make_frame_callback(
                                    Arc::clone(&sub_counters),
                                    Arc::clone(&sub_alive),
                                    frame_tx.clone(),
                                );
                                match mgr.configure(&sps, &pps, callback) {
                                    Ok(()) => {
                                        cache.mark_configured();
                                        sub_counters
                                            .sessions_configured
                                            .fetch_add(1, Ordering::Relaxed);
                                        info!("解码会话就绪");
                                    }
                                    Err(e) => {
                                        // 保持未配置, 丢弃后续单元直到下一次参数集
                                        warn!("解码会话配置失败: {}", e);
                                    }
                                }
                            }
                        }
                    }

                    if cache.configured() {
                        mgr.decode(&nal);
                    } else {
                        sub_counters.nal_units_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }

                // NAL 通道关闭: 连接已结束, 显式失效释放会话
                mgr.invalidate();
                debug!("解码提交线程退出");
            })?;

        Ok(Self {
            events: Some(event_rx),
            frames: Some(frame_rx),
            counters,
            stop_flag,
            alive,
            shutdown_slot,
            net_thread: Some(net_thread),
            submit_thread: Some(submit_thread),
        })
    }

    /// 取出连接状态事件接收端 (只能取一次)
    pub fn take_events(&mut self) -> Option<Receiver<ConnectionEvent>> {
        self.events.take()
    }

    /// 取出解码帧接收端 (只能取一次)
    ///
    /// 帧按提交顺序单调交付; 通道断开表示管线已结束.
    pub fn take_frames(&mut self) -> Option<Receiver<VideoFrame>> {
        self.frames.take()
    }

    /// 获取计数器快照
    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// 网络线程是否已结束 (连接关闭/失败后为 true)
    pub fn is_finished(&self) -> bool {
        self.net_thread
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }

    /// 停止管线
    ///
    /// 取消未完成的读取、丢弃累积缓冲、使解码会话失效并等待两个
    /// 线程退出. 拆除后到达的解码完成帧被忽略. 幂等.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        self.alive.store(false, Ordering::Release);

        if let Ok(mut slot) = self.shutdown_slot.lock() {
            if let Some(handle) = slot.take() {
                handle.shutdown();
            }
        }

        if let Some(handle) = self.net_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.submit_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StreamPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 构造解码完成回调: 检查存活标志后经有界通道交付
///
/// 通道满时丢帧而不是阻塞引擎的完成线程; 拆除后到达的帧被忽略;
/// 单帧解码失败计数后丢弃, 不影响后续帧.
fn make_frame_callback(
    counters: Arc<SharedCounters>,
    alive: Arc<AtomicBool>,
    frame_tx: SyncSender<VideoFrame>,
) -> FrameCallback {
    Box::new(move |result| match result {
        Ok(frame) => {
            if !alive.load(Ordering::Acquire) {
                counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            counters.frames_decoded.fetch_add(1, Ordering::Relaxed);
            match frame_tx.try_send(frame) {
                Ok(()) => {
                    counters.frames_delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(_)) => {
                    counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("帧接收端已满, 丢弃一帧");
                }
                Err(TrySendError::Disconnected(_)) => {
                    counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Err(e) => {
            // 单帧解码失败: 丢弃即可, H.264 的周期性刷新会自行恢复
            counters.decode_errors.fetch_add(1, Ordering::Relaxed);
            debug!("单帧解码失败, 丢弃: {}", e);
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use liu_codec::engines::null::NullEngine;

    use super::*;

    /// Baseline 1280x720 SPS (含 NAL 头部)
    const SPS_720P: [u8; 9] = [0x67, 0x42, 0x00, 0x1F, 0xF4, 0x02, 0x80, 0x2D, 0xC8];

    fn annex_b_stream() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        data.extend_from_slice(&SPS_720P);
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x38, 0x80]);
        data.extend_from_slice(&[0x00, 0x00, 0x01, 0x65, 0x88, 0x80, 0x40]);
        // 封闭 IDR 的结尾起始码 + P 切片, 由连接关闭封闭
        data.extend_from_slice(&[0x00, 0x00, 0x01, 0x41, 0x9A, 0x01]);
        data
    }

    #[test]
    fn test_pipeline_end_to_end_delivers_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(&annex_b_stream()).unwrap();
        });

        let config = StreamConfig::new("127.0.0.1", addr.port());
        let mut pipeline =
            StreamPipeline::start(config, Box::new(NullEngine)).unwrap();
        let frames = pipeline.take_frames().unwrap();

        // IDR 被 P 切片的起始码封闭 → 恰好一帧
        let frame = frames.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(frame.width, 1280);
        assert_eq!(frame.height, 720);
        assert_eq!(frame.pts, 0);
        assert!(frame.is_keyframe);

        server.join().unwrap();
        pipeline.stop();

        let stats = pipeline.stats();
        assert_eq!(stats.sessions_configured, 1);
        assert_eq!(stats.frames_delivered, 1);
        // 尾部的 P 切片未被封闭, 不会产出第二帧
        assert_eq!(stats.nal_units_framed, 3);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (_conn, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(200));
        });

        let config = StreamConfig::new("127.0.0.1", addr.port());
        let mut pipeline =
            StreamPipeline::start(config, Box::new(NullEngine)).unwrap();

        thread::sleep(Duration::from_millis(50));
        pipeline.stop();
        pipeline.stop();
        assert!(pipeline.is_finished());
        server.join().unwrap();
    }

    #[test]
    fn test_connect_failure_is_observable_event() {
        // 端口 1 几乎必然拒绝连接
        let config = StreamConfig::new("127.0.0.1", 1);
        let mut pipeline =
            StreamPipeline::start(config, Box::new(NullEngine)).unwrap();
        let events = pipeline.take_events().unwrap();

        assert_eq!(
            events.recv_timeout(Duration::from_secs(5)).unwrap(),
            ConnectionEvent::Connecting
        );
        assert!(matches!(
            events.recv_timeout(Duration::from_secs(5)).unwrap(),
            ConnectionEvent::Failed(_)
        ));
        pipeline.stop();
    }
}
