//! Integration tests for a host session talking to a client over a real
//! socket pair.
//!
//! The "client" side is a plain `UnixStream` driven by the test; everything
//! it receives is checked byte for byte.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use doomlink_core::protocol::{encode_client_message, ClientMessage, DecodeError};
use doomlink_core::InputEvent;
use doomlink_host::application::demo::{TestPatternHost, TITLE};
use doomlink_host::application::frame::FramePath;
use doomlink_host::infrastructure::transport::{Connection, TransportError};
use doomlink_host::{
    run, CancelToken, ConfigSink, HostConfig, RunOptions, Session, SessionError, SessionParams,
    StopReason,
};
use mockall::mock;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman;
use nix::sys::stat::Mode;

mock! {
    pub Config {}

    impl ConfigSink for Config {
        fn set_variable(&mut self, name: &str, value: &str) -> bool;
    }
}

const WIDTH: u16 = 4;
const HEIGHT: u16 = 2;
const FRAME: usize = WIDTH as usize * HEIGHT as usize * 3;

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Log output captured from a thread-local test subscriber.
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with every event logged on this thread written to the returned log.
fn with_captured_log<T>(f: impl FnOnce() -> T) -> (T, CapturedLog) {
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, log)
}

fn connect() -> (Session, UnixStream) {
    let (host, client) = UnixStream::pair().expect("socketpair");
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    let cancel = CancelToken::new();
    let params = SessionParams {
        width: WIDTH,
        height: HEIGHT,
        send_capacity: 2 * FRAME,
    };
    let session = Session::new(Connection::new(host, cancel.clone()), params, cancel)
        .expect("session must start");
    (session, client)
}

/// Flushes the handshake and checks it on the client side.
fn connect_and_handshake() -> (Session, UnixStream) {
    let (mut session, mut client) = connect();
    session.flush().expect("flush");
    let init = read_n(&mut client, 4);
    assert_eq!(init, [4, 0, 2, 0]);
    (session, client)
}

fn send(client: &mut UnixStream, msg: &ClientMessage) {
    let bytes = encode_client_message(msg).expect("encode");
    client.write_all(&bytes).expect("client write");
}

fn read_n(client: &mut UnixStream, n: usize) -> Vec<u8> {
    let mut out = vec![0u8; n];
    client.read_exact(&mut out).expect("client read");
    out
}

fn accept_all() -> MockConfig {
    let mut config = MockConfig::new();
    config.expect_set_variable().returning(|_, _| true);
    config
}

fn pattern() -> Vec<u8> {
    (0..FRAME).map(|i| (i * 7 % 256) as u8).collect()
}

fn unique_shm_name() -> String {
    static NEXT: AtomicU32 = AtomicU32::new(0);
    format!(
        "/doomfb-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    )
}

fn read_shm<N: AsRef<[u8]> + ?Sized>(name: &N, len: usize) -> Result<Vec<u8>, Errno> {
    let fd = mman::shm_open(name.as_ref(), OFlag::O_RDONLY, Mode::empty())?;
    let mut file = std::fs::File::from(fd);
    let mut out = vec![0u8; len];
    file.read_exact(&mut out).expect("shm read");
    Ok(out)
}

// ── Frames ────────────────────────────────────────────────────────────────────

#[test]
fn test_want_frame_yields_inline_frame_of_exact_size() {
    // Arrange
    let (mut session, mut client) = connect_and_handshake();
    send(&mut client, &ClientMessage::WantFrame);
    session.pump_input(&mut accept_all()).unwrap();
    assert!(session.wants_frame());

    // Act
    session.send_frame(&pattern()).unwrap();
    session.flush().unwrap();
    session.shutdown();

    // Assert: tag, w*h*3 pixel bytes plus the UI byte, then Quit.
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).unwrap();
    assert_eq!(rest.len(), 1 + FRAME + 1 + 1);
    assert_eq!(rest[0], 0);
    assert_eq!(&rest[1..=FRAME], &pattern()[..]);
    assert_eq!(rest[FRAME + 1], 0);
    assert_eq!(rest.last(), Some(&2));
}

#[test]
fn test_shm_frame_sends_ready_and_fills_region() {
    // Arrange
    let (mut session, mut client) = connect_and_handshake();
    let name = unique_shm_name();
    send(&mut client, &ClientMessage::SetFrameShmName { name: name.clone().into_bytes() });
    send(&mut client, &ClientMessage::WantFrame);
    session.pump_input(&mut accept_all()).unwrap();
    assert_eq!(session.frame_path(), FramePath::SharedMemory);

    // Act
    session.send_frame(&pattern()).unwrap();
    session.flush().unwrap();

    // Assert
    assert_eq!(read_n(&mut client, 1), [3]);
    assert_eq!(read_shm(&name, FRAME).unwrap(), pattern());
    session.shutdown();
}

#[test]
fn test_inline_and_shm_paths_deliver_identical_pixels() {
    // Arrange
    let (mut session, mut client) = connect_and_handshake();
    let pixels = pattern();
    let name = unique_shm_name();

    // Act: inline first, then switch to shared memory.
    session.send_frame(&pixels).unwrap();
    session.flush().unwrap();
    let inline = read_n(&mut client, 1 + FRAME + 1);

    send(&mut client, &ClientMessage::SetFrameShmName { name: name.clone().into_bytes() });
    session.pump_input(&mut accept_all()).unwrap();
    session.send_frame(&pixels).unwrap();
    session.flush().unwrap();
    assert_eq!(read_n(&mut client, 1), [3]);
    let shared = read_shm(&name, FRAME).unwrap();

    // Assert
    assert_eq!(&inline[1..=FRAME], &shared[..]);
    session.shutdown();
}

#[test]
fn test_non_utf8_shm_name_is_used_byte_for_byte() {
    // Arrange
    let (mut session, mut client) = connect_and_handshake();
    let mut name = unique_shm_name().into_bytes();
    name.push(0xFF);
    send(&mut client, &ClientMessage::SetFrameShmName { name: name.clone() });
    session.pump_input(&mut accept_all()).unwrap();

    // Act
    session.send_frame(&pattern()).unwrap();
    session.flush().unwrap();

    // Assert
    assert_eq!(read_n(&mut client, 1), [3]);
    assert_eq!(read_shm(&name, FRAME).unwrap(), pattern());
    session.shutdown();
    assert_eq!(read_shm(&name, FRAME), Err(Errno::ENOENT));
}

#[test]
fn test_empty_shm_name_switches_back_to_inline_and_unlinks() {
    let (mut session, mut client) = connect_and_handshake();
    let name = unique_shm_name();
    send(&mut client, &ClientMessage::SetFrameShmName { name: name.clone().into_bytes() });
    session.pump_input(&mut accept_all()).unwrap();
    session.send_frame(&pattern()).unwrap();

    send(&mut client, &ClientMessage::SetFrameShmName { name: Vec::new() });
    session.pump_input(&mut accept_all()).unwrap();

    assert_eq!(session.frame_path(), FramePath::Inline);
    assert_eq!(read_shm(&name, FRAME), Err(Errno::ENOENT));
    session.shutdown();
}

#[test]
fn test_shutdown_sends_quit_and_unlinks_shm() {
    // Arrange
    let (mut session, mut client) = connect_and_handshake();
    let name = unique_shm_name();
    send(&mut client, &ClientMessage::SetFrameShmName { name: name.clone().into_bytes() });
    session.pump_input(&mut accept_all()).unwrap();
    session.send_frame(&pattern()).unwrap();
    session.flush().unwrap();
    assert_eq!(read_n(&mut client, 1), [3]);

    // Act
    session.shutdown();

    // Assert
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, [2]);
    assert_eq!(read_shm(&name, FRAME), Err(Errno::ENOENT));
}

// ── Input ─────────────────────────────────────────────────────────────────────

#[test]
fn test_press_key_split_across_receives_yields_one_event() {
    // Arrange
    let (mut session, mut client) = connect_and_handshake();
    let mut config = accept_all();

    // Act
    client.write_all(&[1, 0x41]).unwrap();
    let first = session.pump_input(&mut config).unwrap();
    let before = session.next_input();
    client.write_all(&[1]).unwrap();
    let second = session.pump_input(&mut config).unwrap();

    // Assert: 0x41 ('A') is delivered lower-cased.
    assert_eq!((first, before), (0, None));
    assert_eq!(second, 1);
    assert_eq!(session.next_input(), Some(InputEvent::KeyDown(b'a')));
    assert_eq!(session.next_input(), None);
}

#[test]
fn test_key_queue_one_pair_from_full_accepts_one_and_drops_one() {
    // Arrange: 254 events leave room for exactly one more pair.
    let (mut session, mut client) = connect_and_handshake();
    let mut config = accept_all();
    for _ in 0..254 {
        send(&mut client, &ClientMessage::PressKey { key: b'x', pressed: 1 });
    }
    assert_eq!(session.pump_input(&mut config).unwrap(), 254);

    // Act
    send(&mut client, &ClientMessage::PressKey { key: b'y', pressed: 1 });
    send(&mut client, &ClientMessage::PressKey { key: b'z', pressed: 1 });
    let (applied, log) = with_captured_log(|| session.pump_input(&mut config).unwrap());

    // Assert
    assert_eq!(applied, 2);
    let log = log.text();
    assert_eq!(log.matches("key event queue full; dropping event").count(), 1);
    assert!(log.contains("WARN"));
    assert!(log.contains("key=122"));
    let mut events = Vec::new();
    while let Some(event) = session.next_input() {
        events.push(event);
    }
    assert_eq!(events.len(), 255);
    assert_eq!(events.last(), Some(&InputEvent::KeyDown(b'y')));
}

#[test]
fn test_mouse_buttons_are_not_translated_as_keys() {
    let (mut session, mut client) = connect_and_handshake();
    client.write_all(&[1, b'A', 0xFF]).unwrap();

    session.pump_input(&mut accept_all()).unwrap();

    assert_eq!(session.next_input(), Some(InputEvent::MouseButtons(b'A')));
}

#[test]
fn test_config_variables_reach_the_sink_in_order() {
    // Arrange
    let (mut session, mut client) = connect_and_handshake();
    let mut config = MockConfig::new();
    let mut seq = mockall::Sequence::new();
    config
        .expect_set_variable()
        .withf(|name, value| name == "usegamma" && value == "2")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| true);
    config
        .expect_set_variable()
        .withf(|name, value| name == "bogus" && value.is_empty())
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| false);
    for (name, value) in [("usegamma", "2"), ("bogus", "")] {
        send(
            &mut client,
            &ClientMessage::SetConfigVar {
                name: name.into(),
                value: value.into(),
            },
        );
    }

    // Act
    let applied = session.pump_input(&mut config).unwrap();

    // Assert
    assert_eq!(applied, 2);
}

// ── Fatal conditions ──────────────────────────────────────────────────────────

#[test]
fn test_unknown_tag_is_fatal() {
    let (mut session, mut client) = connect_and_handshake();
    client.write_all(&[0x7F, 0, 0]).unwrap();

    let err = session.pump_input(&mut accept_all()).unwrap_err();

    assert!(matches!(
        err,
        SessionError::Decode(DecodeError::UnknownMessageType(0x7F))
    ));
}

#[test]
fn test_oversized_shm_name_is_fatal() {
    let (mut session, mut client) = connect_and_handshake();
    client.write_all(&[2, 255, 0]).unwrap();

    let err = session.pump_input(&mut accept_all()).unwrap_err();

    assert!(matches!(
        err,
        SessionError::Decode(DecodeError::LengthExceeded { len: 255, .. })
    ));
}

#[test]
fn test_messages_sent_right_before_disconnect_are_applied() {
    // Arrange
    let (mut session, mut client) = connect_and_handshake();
    let mut config = MockConfig::new();
    config
        .expect_set_variable()
        .withf(|name, value| name == "a" && value == "1")
        .times(1)
        .returning(|_, _| true);
    client.write_all(&[3, 1, 0, b'a', 1, 0, b'1']).unwrap();
    client.write_all(&[1, b'q', 1]).unwrap();
    drop(client);

    // Act
    let err = session.pump_input(&mut config).unwrap_err();

    // Assert
    assert!(matches!(
        err,
        SessionError::Transport(TransportError::PeerClosed)
    ));
    assert_eq!(session.next_input(), Some(InputEvent::KeyDown(b'q')));
    session.shutdown();
}

#[test]
fn test_client_disconnect_is_fatal() {
    let (mut session, client) = connect_and_handshake();
    drop(client);

    let err = session.pump_input(&mut accept_all()).unwrap_err();

    assert!(!err.is_cancelled());
    session.shutdown();
}

// ── Full run over a filesystem socket ────────────────────────────────────────

fn connect_when_ready(path: &Path) -> UnixStream {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => return stream,
            Err(_) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(10)),
            Err(e) => panic!("host never started listening: {e}"),
        }
    }
}

#[test]
fn test_run_serves_client_until_cancelled() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let options = RunOptions {
        listen: dir.path().join("doom.sock"),
        max_ticks: None,
    };
    let config = HostConfig {
        screen_width: WIDTH,
        screen_height: HEIGHT,
        accept_poll_ms: 5,
        ..Default::default()
    };
    let cancel = CancelToken::new();
    let host_cancel = cancel.clone();
    let host_options = options.clone();
    let host_config = config.clone();
    let server = std::thread::spawn(move || {
        let mut host = TestPatternHost::new(WIDTH, HEIGHT, host_config.tick_rate_hz);
        let reason = run(&host_options, &host_config, &mut host, &host_cancel);
        (reason, host)
    });

    // Act
    let mut client = connect_when_ready(&options.listen);
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    send(
        &mut client,
        &ClientMessage::SetConfigVar {
            name: "screenblocks".into(),
            value: "11".into(),
        },
    );
    send(&mut client, &ClientMessage::WantFrame);

    let init = read_n(&mut client, 4);
    let title_header = read_n(&mut client, 3);
    let title = read_n(&mut client, TITLE.len());
    let status = read_n(&mut client, 1 + 24);
    let frame = read_n(&mut client, 1 + FRAME + 1);

    cancel.cancel();
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).unwrap();
    let (reason, host) = server.join().unwrap();

    // Assert
    assert_eq!(init, [4, 0, 2, 0]);
    assert_eq!(title_header[0], 1);
    assert_eq!(title, TITLE.as_bytes());
    assert_eq!(status[0], 5);
    assert_eq!(frame[0], 0);
    assert_eq!(rest.last(), Some(&2));
    assert_eq!(reason.unwrap(), StopReason::Cancelled);
    assert_eq!(host.variable("screenblocks"), Some("11"));
    assert!(!options.listen.exists());
}

#[test]
fn test_run_fails_when_socket_path_is_taken() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doom.sock");
    std::fs::write(&path, b"").unwrap();
    let options = RunOptions {
        listen: path,
        max_ticks: Some(1),
    };
    let mut host = TestPatternHost::new(WIDTH, HEIGHT, 35);

    let err = run(&options, &HostConfig::default(), &mut host, &CancelToken::new()).unwrap_err();

    assert!(matches!(err, SessionError::Transport(_)));
}
