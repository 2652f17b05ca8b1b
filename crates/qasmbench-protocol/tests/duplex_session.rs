//! End-to-end tests: `serve` on one side of an in-memory pipe, a
//! `ProtocolClient` on the other.

use qasmbench_protocol::{
    Framing, HandlerError, ProtocolClient, ProtocolError, Response, ServerSession, serve,
};
use tokio::io::BufReader;

/// Accepts anything that starts with a version header.
fn header_check(request: &str) -> Result<(), HandlerError> {
    if request.trim_start().starts_with("OPENQASM") {
        Ok(())
    } else {
        Err(HandlerError::Rejected("Parsing failed".into()))
    }
}

const GOOD: &str = "OPENQASM 3.0;\nqubit q;\nh q;\n";
const BAD: &str = "qubit[ q;\n";

#[tokio::test]
async fn test_back_to_back_responses_stay_in_order() {
    for framing in [Framing::Nul, Framing::Length] {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_io);
        let server = tokio::spawn(serve(
            server_read,
            server_write,
            ServerSession::with_framing(header_check, framing),
        ));

        let (client_read, client_write) = tokio::io::split(client_io);
        let mut client = ProtocolClient::new(BufReader::new(client_read), client_write, framing);
        client.await_ready().await.unwrap();

        let sources = [GOOD, BAD, GOOD, GOOD, BAD];
        let mut ids = Vec::new();
        for src in sources {
            ids.push(client.send(src).await.unwrap());
        }

        for (src, id) in sources.iter().zip(&ids) {
            let (answered, response) = client.recv().await.unwrap();
            assert_eq!(answered, *id);
            let expected = if *src == GOOD {
                Response::Success
            } else {
                Response::Error("Parsing failed".into())
            };
            assert_eq!(response, expected, "framing {framing}");
        }

        client.shutdown().await.unwrap();
        let summary = server.await.unwrap().unwrap();
        assert_eq!(summary.requests, 5);
        assert_eq!(summary.successes, 3);
        assert_eq!(summary.errors, 2);
    }
}

#[tokio::test]
async fn test_server_keeps_serving_after_rejection() {
    let (client_io, server_io) = tokio::io::duplex(1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    tokio::spawn(serve(
        server_read,
        server_write,
        ServerSession::with_framing(header_check, Framing::Nul),
    ));

    let (client_read, client_write) = tokio::io::split(client_io);
    let mut client = ProtocolClient::new(BufReader::new(client_read), client_write, Framing::Nul);
    client.await_ready().await.unwrap();

    assert!(matches!(client.request(BAD).await.unwrap(), Response::Error(_)));
    assert_eq!(client.request(GOOD).await.unwrap(), Response::Success);
}

#[tokio::test]
async fn test_nul_in_payload_is_refused_client_side() {
    let (client_io, server_io) = tokio::io::duplex(1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    tokio::spawn(serve(
        server_read,
        server_write,
        ServerSession::with_framing(header_check, Framing::Nul),
    ));

    let (client_read, client_write) = tokio::io::split(client_io);
    let mut client = ProtocolClient::new(BufReader::new(client_read), client_write, Framing::Nul);
    client.await_ready().await.unwrap();

    let err = client.send("OPENQASM 3;\0").await.unwrap_err();
    assert!(matches!(err, ProtocolError::DelimiterInPayload(_)));
    assert_eq!(client.in_flight(), 0);
    assert_eq!(client.request(GOOD).await.unwrap(), Response::Success);
}
