//! 端到端解码管线集成测试
//!
//! 通过本机 TCP 回环发送 Annex B 码流, 以 null 引擎走通
//! 接收 → 分帧 → 配置 → 提交 → 交付的完整链路.

use std::io::Write;
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use liu::stream::{ConnectionEvent, StreamConfig, StreamPipeline};

/// 手工构造的 Baseline 1280x720 SPS (含 NAL 头部)
const SPS_720P: [u8; 9] = [0x67, 0x42, 0x00, 0x1F, 0xF4, 0x02, 0x80, 0x2D, 0xC8];
/// 手工构造的 Baseline 640x480 SPS (含 NAL 头部)
const SPS_VGA: [u8; 9] = [0x67, 0x42, 0x00, 0x1E, 0xF4, 0x05, 0x01, 0xEC, 0x80];
/// 典型 PPS
const PPS: [u8; 4] = [0x68, 0xCE, 0x38, 0x80];

const START_3: [u8; 3] = [0x00, 0x00, 0x01];
const START_4: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// 拼一个带起始码的单元
fn with_start(code: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = code.to_vec();
    out.extend_from_slice(payload);
    out
}

/// SPS + PPS + K 个切片 (IDR 开头), 结尾补起始码封闭
fn stream_with_slices(k: usize) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend(with_start(&START_4, &SPS_720P));
    data.extend(with_start(&START_4, &PPS));
    for i in 0..k {
        let header = if i == 0 { 0x65 } else { 0x41 };
        data.extend(with_start(&START_3, &[header, 0x88, i as u8]));
    }
    data.extend_from_slice(&START_3);
    data
}

/// 启动一个把 `payload` 按 `chunk` 字节分块发送的服务端
fn spawn_server(payload: Vec<u8>, chunk: usize) -> (thread::JoinHandle<()>, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        for piece in payload.chunks(chunk) {
            conn.write_all(piece).unwrap();
        }
        // 作用域结束关闭连接
    });
    (handle, port)
}

fn start_pipeline(port: u16, reconfigure: bool) -> StreamPipeline {
    let _ = env_logger::builder().is_test(true).try_init();
    let registry = liu::default_engine_registry();
    let engine = registry.create("null").unwrap();
    let mut config = StreamConfig::new("127.0.0.1", port);
    config.reconfigure_on_change = reconfigure;
    StreamPipeline::start(config, engine).unwrap()
}

#[test]
fn test_configure_once_then_all_slices_decoded() {
    // SPS/PPS 后跟 K 个切片: 恰好配置一次, K 帧按序交付
    const K: usize = 5;
    let (server, port) = spawn_server(stream_with_slices(K), 7);

    let mut pipeline = start_pipeline(port, false);
    let frames = pipeline.take_frames().unwrap();

    let mut delivered = Vec::new();
    while let Ok(frame) = frames.recv_timeout(Duration::from_secs(5)) {
        delivered.push(frame);
        if delivered.len() == K {
            break;
        }
    }
    server.join().unwrap();
    pipeline.stop();

    assert_eq!(delivered.len(), K);
    for (i, frame) in delivered.iter().enumerate() {
        assert_eq!(frame.pts, i as i64, "交付顺序必须与提交顺序一致");
        assert_eq!(frame.width, 1280);
        assert_eq!(frame.height, 720);
    }
    assert!(delivered[0].is_keyframe);

    let stats = pipeline.stats();
    assert_eq!(stats.sessions_configured, 1, "只应配置一次");
    // 配置前只有 SPS 一个单元被丢弃 (PPS 完成配置后本身会被提交)
    assert_eq!(stats.nal_units_dropped, 1);
    assert_eq!(stats.decode_errors, 0);
}

#[test]
fn test_slices_before_parameter_sets_are_dropped() {
    // 参数集之前的切片被丢弃, 不排队: 只有之后的切片产出帧
    let mut data = Vec::new();
    data.extend(with_start(&START_3, &[0x65, 0x01, 0x02]));
    data.extend(with_start(&START_3, &[0x41, 0x03]));
    data.extend(stream_with_slices(2));
    let (server, port) = spawn_server(data, 11);

    let mut pipeline = start_pipeline(port, false);
    let frames = pipeline.take_frames().unwrap();

    let mut delivered = Vec::new();
    while let Ok(frame) = frames.recv_timeout(Duration::from_secs(5)) {
        delivered.push(frame);
    }
    server.join().unwrap();
    pipeline.stop();

    assert_eq!(delivered.len(), 2, "配置前的切片不应产出帧");
    let stats = pipeline.stats();
    // 配置前丢弃: 两个提前切片 + SPS
    assert_eq!(stats.nal_units_dropped, 3);
    assert_eq!(stats.sessions_configured, 1);
}

#[test]
fn test_sps_pps_order_reversed_still_configures() {
    // PPS 先于 SPS: 第二个参数集到达后完成配置
    let mut data = Vec::new();
    data.extend(with_start(&START_4, &PPS));
    data.extend(with_start(&START_4, &SPS_720P));
    data.extend(with_start(&START_3, &[0x65, 0x88, 0x01]));
    data.extend_from_slice(&START_3);
    let (server, port) = spawn_server(data, 5);

    let mut pipeline = start_pipeline(port, false);
    let frames = pipeline.take_frames().unwrap();

    let frame = frames.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(frame.width, 1280);
    server.join().unwrap();
    pipeline.stop();
    assert_eq!(pipeline.stats().sessions_configured, 1);
}

#[test]
fn test_disconnect_mid_unit_emits_nothing_truncated() {
    // 连接在单元中途断开: 不完整尾部被丢弃, 帧通道正常关闭
    let mut data = Vec::new();
    data.extend(stream_with_slices(1));
    // 一个永远不会被封闭的尾部切片
    data.extend(with_start(&START_3, &[0x41, 0x9A, 0x01]));
    let (server, port) = spawn_server(data, 4);

    let mut pipeline = start_pipeline(port, false);
    let frames = pipeline.take_frames().unwrap();

    let mut delivered = Vec::new();
    loop {
        match frames.recv_timeout(Duration::from_secs(5)) {
            Ok(frame) => delivered.push(frame),
            Err(_) => break,
        }
    }
    server.join().unwrap();
    pipeline.stop();

    // 只有被封闭的 IDR 产出帧, 截断的 P 切片没有
    assert_eq!(delivered.len(), 1);
    let stats = pipeline.stats();
    assert_eq!(stats.nal_units_framed, 3); // SPS + PPS + IDR
}

#[test]
fn test_reconfigure_on_resolution_change() {
    // 重配置策略开启时, 新 SPS 触发会话重建, 后续帧用新尺寸
    let mut data = Vec::new();
    data.extend(stream_with_slices(1));
    data.extend(with_start(&START_4, &SPS_VGA));
    data.extend(with_start(&START_4, &PPS));
    data.extend(with_start(&START_3, &[0x65, 0x99, 0x01]));
    data.extend_from_slice(&START_3);
    let (server, port) = spawn_server(data, 9);

    let mut pipeline = start_pipeline(port, true);
    let frames = pipeline.take_frames().unwrap();

    let first = frames.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!((first.width, first.height), (1280, 720));
    let second = frames.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!((second.width, second.height), (640, 480));
    // 新会话的提交序号从头计
    assert_eq!(second.pts, 0);

    server.join().unwrap();
    pipeline.stop();
    assert_eq!(pipeline.stats().sessions_configured, 2);
}

#[test]
fn test_single_shot_ignores_resolution_change_by_default() {
    // 默认策略: 流中途的新 SPS 不触发重建, 会话保持旧尺寸
    let mut data = Vec::new();
    data.extend(stream_with_slices(1));
    data.extend(with_start(&START_4, &SPS_VGA));
    data.extend(with_start(&START_4, &PPS));
    data.extend(with_start(&START_3, &[0x65, 0x99, 0x01]));
    data.extend_from_slice(&START_3);
    let (server, port) = spawn_server(data, 9);

    let mut pipeline = start_pipeline(port, false);
    let frames = pipeline.take_frames().unwrap();

    let first = frames.recv_timeout(Duration::from_secs(5)).unwrap();
    let second = frames.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!((first.width, first.height), (1280, 720));
    assert_eq!((second.width, second.height), (1280, 720));

    server.join().unwrap();
    pipeline.stop();
    assert_eq!(pipeline.stats().sessions_configured, 1);
}

#[test]
fn test_teardown_while_sender_active() {
    // 发送端持续推流时主动 stop: 读取被取消, 线程全部退出
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        let chunk = stream_with_slices(3);
        // 持续发送直到对端关闭
        loop {
            if conn.write_all(&chunk).is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
    });

    let mut pipeline = start_pipeline(port, false);
    let frames = pipeline.take_frames().unwrap();

    // 至少收到一帧后拆除
    let _ = frames.recv_timeout(Duration::from_secs(5)).unwrap();
    pipeline.stop();
    assert!(pipeline.is_finished());

    server.join().unwrap();
}

#[test]
fn test_connection_refused_reports_failed_event() {
    // 占住一个端口再释放, 得到一个大概率无人监听的端口号
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut pipeline = start_pipeline(port, false);
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
