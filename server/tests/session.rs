use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;

use musicroom_protocol::{ClientCodec, Frame};
use musicroom_server::config::BroadcastPolicy;
use musicroom_server::{Commands, Config, DirLibrary, ServerListener, ServerState};

const SONG: &[u8] = b"ID3\x03\x00 fake audio \r\n with a crlf inside";

struct TestServer {
    addr: SocketAddr,
    _dir: tempfile::TempDir,
}

async fn start(config: Config) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("song.mp3"), SONG).unwrap();
    std::fs::write(dir.path().join("intro.mp3"), b"intro").unwrap();

    let config = Config {
        address: "127.0.0.1:0".into(),
        music_dir: dir.path().to_owned(),
        ..config
    };

    let listener = ServerListener::bind(&config).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let library = Arc::new(DirLibrary::new(dir.path()));
    let state = Arc::new(ServerState::new(config, library));

    tokio::spawn(listener.run(state, Commands::standard()));

    TestServer { addr, _dir: dir }
}

type Client = Framed<TcpStream, ClientCodec>;

async fn connect(server: &TestServer) -> Client {
    Framed::new(TcpStream::connect(server.addr).await.unwrap(), ClientCodec::new())
}

async fn send(client: &mut Client, line: &str) {
    client.send(line.to_owned()).await.unwrap();
}

async fn recv(client: &mut Client) -> Frame {
    timeout(Duration::from_secs(5), client.next()).await
        .expect("timed out waiting for a frame")
        .expect("server closed the connection")
        .expect("undecodable frame")
}

async fn join(server: &TestServer, name: &str) -> Client {
    let mut client = connect(server).await;
    send(&mut client, &format!("register {}", name)).await;
    assert_eq!(recv(&mut client).await, Frame::line(format!("joined {}", name)));
    client
}

fn song() -> Frame {
    Frame::music("song.mp3", Bytes::from_static(SONG))
}

#[tokio::test]
async fn broadcast_reaches_every_client_with_exact_bytes() {
    let server = start(Config::default()).await;

    let mut alice = join(&server, "alice").await;
    let mut bob = join(&server, "bob").await;
    assert_eq!(recv(&mut alice).await, Frame::line("joined bob"));

    let mut raw = TcpStream::connect(server.addr).await.unwrap();
    raw.write_all(b"register carol\r\n").await.unwrap();
    assert_eq!(recv(&mut alice).await, Frame::line("joined carol"));
    assert_eq!(recv(&mut bob).await, Frame::line("joined carol"));

    send(&mut alice, "broadcast song.mp3").await;
    assert_eq!(recv(&mut alice).await, song());
    assert_eq!(recv(&mut bob).await, song());

    let mut expected = b"joined carol\r\n".to_vec();
    expected.extend_from_slice(format!("music song.mp3 {}\r\n", SONG.len()).as_bytes());
    expected.extend_from_slice(SONG);

    let mut received = vec![0; expected.len()];
    timeout(Duration::from_secs(5), raw.read_exact(&mut received)).await.unwrap().unwrap();
    assert_eq!(received, expected);
}

#[tokio::test]
async fn errors_are_replied_and_the_session_continues() {
    let server = start(Config::default()).await;
    let mut client = connect(&server).await;

    send(&mut client, "dance").await;
    assert_eq!(recv(&mut client).await, Frame::line("error command not found"));

    send(&mut client, "").await;
    assert_eq!(recv(&mut client).await, Frame::line("error empty input received"));

    send(&mut client, "broadcast nope.mp3").await;
    assert_eq!(recv(&mut client).await, Frame::line("error file not found"));

    send(&mut client, "list clients").await;
    assert_eq!(recv(&mut client).await, Frame::line("clients"));

    send(&mut client, "register dave").await;
    assert_eq!(recv(&mut client).await, Frame::line("joined dave"));
}

#[tokio::test]
async fn pipelined_commands_are_answered_in_order() {
    let server = start(Config::default()).await;

    for _ in 0..20 {
        let mut raw = TcpStream::connect(server.addr).await.unwrap();
        raw.write_all(b"dance\r\nlist clients\r\n\r\nlist admins\r\n").await.unwrap();

        let mut client = Framed::new(raw, ClientCodec::new());
        assert_eq!(recv(&mut client).await, Frame::line("error command not found"));
        assert_eq!(recv(&mut client).await, Frame::line("clients"));
        assert_eq!(recv(&mut client).await, Frame::line("error empty input received"));
        assert_eq!(recv(&mut client).await, Frame::line("admins"));
    }
}

#[tokio::test]
async fn disconnect_releases_the_name() {
    let server = start(Config::default()).await;

    let alice = join(&server, "alice").await;
    let mut bob = join(&server, "bob").await;

    drop(alice);
    assert_eq!(recv(&mut bob).await, Frame::line("left alice"));

    send(&mut bob, "list clients").await;
    assert_eq!(recv(&mut bob).await, Frame::line("clients bob"));

    // the released name can be taken again
    let _alice = join(&server, "alice").await;
    assert_eq!(recv(&mut bob).await, Frame::line("joined alice"));
}

#[tokio::test]
async fn playlist_and_library_listings() {
    let server = start(Config::default()).await;
    let mut alice = join(&server, "alice").await;

    send(&mut alice, "list musics").await;
    assert_eq!(recv(&mut alice).await, Frame::line("musics intro.mp3 song.mp3"));

    send(&mut alice, "player add song.mp3").await;
    assert_eq!(recv(&mut alice).await, Frame::line("added song.mp3"));
    send(&mut alice, "player add intro.mp3").await;
    assert_eq!(recv(&mut alice).await, Frame::line("added intro.mp3"));

    send(&mut alice, "list playlist").await;
    assert_eq!(recv(&mut alice).await, Frame::line("playlist song.mp3 intro.mp3"));

    send(&mut alice, "player add ../song.mp3").await;
    assert_eq!(recv(&mut alice).await, Frame::line("error file not found"));
}

#[tokio::test]
async fn admin_only_broadcast_policy() {
    let config = Config {
        secret: Some("s3cret".into()),
        broadcast_policy: BroadcastPolicy::Admins,
        ..Config::default()
    };
    let server = start(config).await;

    let mut alice = connect(&server).await;
    send(&mut alice, "register alice s3cret").await;
    assert_eq!(recv(&mut alice).await, Frame::line("joined alice"));

    let mut bob = join(&server, "bob").await;
    assert_eq!(recv(&mut alice).await, Frame::line("joined bob"));

    send(&mut alice, "list admins").await;
    assert_eq!(recv(&mut alice).await, Frame::line("admins alice"));

    send(&mut bob, "broadcast song.mp3").await;
    assert_eq!(recv(&mut bob).await, Frame::line("error admin privileges required"));

    send(&mut alice, "broadcast song.mp3").await;
    assert_eq!(recv(&mut alice).await, song());
    assert_eq!(recv(&mut bob).await, song());
}

#[tokio::test]
async fn oversized_line_is_rejected_without_ending_the_session() {
    let server = start(Config { buffer_size: 16, ..Config::default() }).await;
    let mut client = connect(&server).await;

    send(&mut client, &format!("register {}", "x".repeat(40))).await;
    assert_eq!(recv(&mut client).await, Frame::line("error line exceeds 16 bytes"));

    send(&mut client, "register al").await;
    assert_eq!(recv(&mut client).await, Frame::line("joined al"));
}

#[tokio::test]
async fn same_name_race_has_exactly_one_winner() {
    let server = start(Config::default()).await;
    let mut first = connect(&server).await;
    let mut second = connect(&server).await;

    tokio::join!(send(&mut first, "register carol"), send(&mut second, "register carol"));

    let mut replies = vec![recv(&mut first).await, recv(&mut second).await];
    replies.sort_by_key(|f| format!("{:?}", f));

    assert_eq!(replies, vec![
        Frame::line("error username already in use"),
        Frame::line("joined carol"),
    ]);
}
