use std::time::Duration;

use bridge_buffer::{BufferState, SharedBuffer};
use bridge_hub::pipeline::nest_to_tvb;
use bridge_proto::{wire, ControlTag, IntercommManager};
use bridge_transform::Mediator;
use tokio::net::TcpStream;

fn unique_buffer_name(tag: &str) -> String {
    format!("bridge-hub-test-{tag}-{}", std::process::id())
}

async fn connect_to_handshake(path: &std::path::Path) -> TcpStream {
    for _ in 0..200 {
        if let Ok(text) = tokio::fs::read_to_string(path).await {
            if let Ok(stream) = TcpStream::connect(text.trim()).await {
                return stream;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("handshake file {path:?} never became connectable");
}

/// S1: one step, spikes -> rates. A single NEST peer sends tag 0, shape
/// `[6]` (two spikes across two neurons), then tag 2 to end the run.
#[tokio::test]
async fn one_step_then_clean_termination() {
    let dir = tempfile::tempdir().unwrap();
    let handshake = dir.path().join("receive_from_nest").join("0.txt");

    let buffer_name = unique_buffer_name("s1");
    let buffer = SharedBuffer::create(&buffer_name, 8).unwrap();

    let accept = IntercommManager::open_and_accept(
        std::slice::from_ref(&handshake),
        1,
    );
    let peer_sim = async {
        let mut stream = connect_to_handshake(&handshake).await;
        wire::write_tag(&mut stream, ControlTag::Payload).await.unwrap();
        assert!(wire::read_bool(&mut stream).await.unwrap());
        wire::write_i32(&mut stream, 6).await.unwrap();
        wire::write_f64_slice(
            &mut stream,
            &[100.0, 0.0, 0.5, 100.0, 1.0, 0.7],
        )
        .await
        .unwrap();
        wire::write_tag(&mut stream, ControlTag::End).await.unwrap();
    };

    let (intercomm, ()) = tokio::join!(accept, peer_sim);
    let mut intercomm = intercomm.unwrap();

    let result = nest_to_tvb::receive_loop(&mut intercomm, &buffer).await;
    assert!(result.is_ok());

    // Invariant: after a complete step the state cell returns to
    // READY_TO_RECEIVE once the transformer/sender has consumed it; here
    // the receive loop alone leaves it at READY_TO_TRANSFORM because no
    // emit loop ran, but the header must equal the summed shape.
    assert_eq!(buffer.get_state().unwrap(), BufferState::ReadyToTransform);
    assert_eq!(buffer.get_header(), 6);
    assert_eq!(buffer.get_slice(0, 6).unwrap(), vec![
        100.0, 0.0, 0.5, 100.0, 1.0, 0.7
    ]);

    buffer.destroy().unwrap();
}

/// S2: a zero-payload step. Header must end up at zero and the state
/// cell still flips to READY_TO_TRANSFORM.
#[tokio::test]
async fn zero_payload_step() {
    let dir = tempfile::tempdir().unwrap();
    let handshake = dir.path().join("receive_from_nest").join("0.txt");
    let buffer_name = unique_buffer_name("s2");
    let buffer = SharedBuffer::create(&buffer_name, 8).unwrap();

    let accept =
        IntercommManager::open_and_accept(std::slice::from_ref(&handshake), 1);
    let peer_sim = async {
        let mut stream = connect_to_handshake(&handshake).await;
        wire::write_tag(&mut stream, ControlTag::Payload).await.unwrap();
        assert!(wire::read_bool(&mut stream).await.unwrap());
        wire::write_i32(&mut stream, 0).await.unwrap();
        wire::write_tag(&mut stream, ControlTag::End).await.unwrap();
    };

    let (intercomm, ()) = tokio::join!(accept, peer_sim);
    let mut intercomm = intercomm.unwrap();

    nest_to_tvb::receive_loop(&mut intercomm, &buffer).await.unwrap();
    assert_eq!(buffer.get_header(), 0);

    buffer.destroy().unwrap();
}

/// S4: two peers disagree on the control tag for the same step. Must
/// return an error and must not touch the buffer.
#[tokio::test]
async fn tag_mismatch_across_peers_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let handshake = dir.path().join("receive_from_nest").join("0.txt");
    let buffer_name = unique_buffer_name("s4");
    let buffer = SharedBuffer::create(&buffer_name, 8).unwrap();

    let accept =
        IntercommManager::open_and_accept(std::slice::from_ref(&handshake), 2);
    let peer_sim = async {
        let mut a = connect_to_handshake(&handshake).await;
        let mut b = connect_to_handshake(&handshake).await;
        wire::write_tag(&mut a, ControlTag::Payload).await.unwrap();
        wire::write_tag(&mut b, ControlTag::Skip).await.unwrap();
    };

    let (intercomm, ()) = tokio::join!(accept, peer_sim);
    let mut intercomm = intercomm.unwrap();

    let result = nest_to_tvb::receive_loop(&mut intercomm, &buffer).await;
    assert!(result.is_err());
    assert_eq!(buffer.get_header(), 0);

    buffer.destroy().unwrap();
}

/// S5: a single peer sends a control byte outside `{0, 1, 2}`. Must
/// return an error before any payload is touched.
#[tokio::test]
async fn bad_tag_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let handshake = dir.path().join("receive_from_nest").join("0.txt");
    let buffer_name = unique_buffer_name("s5");
    let buffer = SharedBuffer::create(&buffer_name, 8).unwrap();

    let accept = IntercommManager::open_and_accept(std::slice::from_ref(&handshake), 1);
    let peer_sim = async {
        let mut stream = connect_to_handshake(&handshake).await;
        wire::write_u8(&mut stream, 7).await.unwrap();
    };

    let (intercomm, ()) = tokio::join!(accept, peer_sim);
    let mut intercomm = intercomm.unwrap();

    let result = nest_to_tvb::receive_loop(&mut intercomm, &buffer).await;
    assert!(result.is_err());
    assert_eq!(buffer.get_header(), 0);

    buffer.destroy().unwrap();
}

/// With two TVB peers connected, the demand signal can arrive from
/// either one (spec.md §4.5 step 1's "any source"). Only peer 1 ever
/// sends; the reply must go back to peer 1, and peer 0's idle connection
/// must never be touched.
#[tokio::test]
async fn emit_loop_answers_whichever_peer_demanded() {
    let dir = tempfile::tempdir().unwrap();
    let handshake = dir.path().join("receive_from_tvb").join("0.txt");
    let buffer_name = unique_buffer_name("any-source");
    let buffer = SharedBuffer::create(&buffer_name, 8).unwrap();
    buffer
        .write_slice(0, &[100.0, 0.0, 0.5, 100.0, 1.0, 0.7])
        .unwrap();
    buffer.set_header(6);
    buffer.set_state(BufferState::ReadyToTransform);

    let accept = IntercommManager::open_and_accept(std::slice::from_ref(&handshake), 2);
    let connect_both = async {
        let a = connect_to_handshake(&handshake).await;
        let b = connect_to_handshake(&handshake).await;
        (a, b)
    };

    let (intercomm, (peer0, mut peer1)) = tokio::join!(accept, connect_both);
    let mut intercomm = intercomm.unwrap();

    let mut mediator = Mediator::new(1.0, 0.1, 2, 0);
    let emit = nest_to_tvb::emit_loop(&mut intercomm, &buffer, &mut mediator);

    let peer_sim = async {
        // peer 0 never writes anything; only peer 1 demands.
        wire::write_tag(&mut peer1, ControlTag::Payload).await.unwrap();

        let times = wire::read_f64_vec(&mut peer1, 2).await.unwrap();
        assert_eq!(times, vec![0.0, 1.0]);
        let size = wire::read_i32(&mut peer1).await.unwrap();
        let _rates = wire::read_f64_vec(&mut peer1, size as usize).await.unwrap();

        wire::write_tag(&mut peer1, ControlTag::Skip).await.unwrap();
    };

    let (emit_result, ()) = tokio::join!(emit, peer_sim);
    assert!(emit_result.is_ok());
    assert_eq!(mediator.step(), 1);
    drop(peer0);

    buffer.destroy().unwrap();
}

/// Invariant 5: a tag-2 receipt followed by further data on the channel
/// is never processed. The peer writes tag 2, then a second step's tag
/// and shape that would desync framing if the loop kept reading; the
/// loop must return as soon as it sees tag 2, leaving those bytes
/// unread on the wire.
#[tokio::test]
async fn termination_does_not_consume_bytes_sent_after_the_end_tag() {
    let dir = tempfile::tempdir().unwrap();
    let handshake = dir.path().join("receive_from_nest").join("0.txt");
    let buffer_name = unique_buffer_name("idempotent-end");
    let buffer = SharedBuffer::create(&buffer_name, 8).unwrap();

    let accept = IntercommManager::open_and_accept(std::slice::from_ref(&handshake), 1);
    let peer_sim = async {
        let mut stream = connect_to_handshake(&handshake).await;
        wire::write_tag(&mut stream, ControlTag::End).await.unwrap();
        wire::write_tag(&mut stream, ControlTag::Payload).await.unwrap();
        wire::write_i32(&mut stream, 42).await.unwrap();
        stream
    };

    let (intercomm, _stream) = tokio::join!(accept, peer_sim);
    let mut intercomm = intercomm.unwrap();

    let result = nest_to_tvb::receive_loop(&mut intercomm, &buffer).await;
    assert!(result.is_ok());
    assert_eq!(buffer.get_header(), 0);

    // The extra tag+shape pushed after tag 2 is still sitting on the
    // wire, unread by a loop that had already returned.
    let leftover_tag = wire::read_tag(intercomm.peer_mut(0)).await.unwrap();
    assert_eq!(leftover_tag, ControlTag::Payload);
    let leftover_shape = wire::read_i32(intercomm.peer_mut(0)).await.unwrap();
    assert_eq!(leftover_shape, 42);

    buffer.destroy().unwrap();
}
