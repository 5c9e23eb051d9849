//! Transport tests over a real loopback socket.

use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;

use crate::protocol::{ForestBusError, Method, Request, Response};
use crate::transport::{JsonCodec, TcpServer, TcpTransport, MAX_MESSAGE_SIZE};

#[tokio::test]
async fn test_frame_round_trip_over_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let echo = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let frame = TcpTransport::read_frame(&mut stream).await.unwrap().unwrap();
        TcpTransport::write_frame(&mut stream, &frame).await.unwrap();
    });

    let mut stream = TcpTransport::connect(&addr, Duration::from_secs(1)).await.unwrap();
    TcpTransport::write_frame(&mut stream, b"hello").await.unwrap();
    let reply = TcpTransport::read_frame(&mut stream).await.unwrap();

    assert_eq!(reply, Some(b"hello".to_vec()));
    echo.await.unwrap();
}

#[tokio::test]
async fn test_read_frame_clean_eof() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let mut stream = TcpTransport::connect(&addr, Duration::from_secs(1)).await.unwrap();
    let frame = TcpTransport::read_frame(&mut stream).await.unwrap();
    assert!(frame.is_none());
}

#[tokio::test]
async fn test_oversized_frame_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        let (mut stream, _) = listener.accept().await.unwrap();
        let len = (MAX_MESSAGE_SIZE as u32) + 1;
        stream.write_all(&len.to_be_bytes()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let mut stream = TcpTransport::connect(&addr, Duration::from_secs(1)).await.unwrap();
    let err = TcpTransport::read_frame(&mut stream).await.unwrap_err();
    assert!(matches!(err, ForestBusError::FrameTooLarge { .. }));
}

#[tokio::test]
async fn test_connect_refused() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let result = TcpTransport::connect(&addr, Duration::from_secs(1)).await;
    assert!(matches!(result, Err(ForestBusError::Connection(_))));
}

#[tokio::test]
async fn test_connect_invalid_address() {
    let result = TcpTransport::connect("not an address", Duration::from_secs(1)).await;
    assert!(matches!(result, Err(ForestBusError::Connection(_))));
}

#[tokio::test]
async fn test_server_answers_requests() {
    let server = TcpServer::new("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let handle = server.serve(|request: Request| async move {
        Ok(Response::success(request.id, json!({"echo": request.method})))
    });

    let mut stream = TcpTransport::connect(&addr, Duration::from_secs(1)).await.unwrap();
    let request = Request::new(Method::GetClusterDetails, json!({}));
    TcpTransport::write_frame(&mut stream, &JsonCodec::encode_request(&request).unwrap())
        .await
        .unwrap();
    let frame = TcpTransport::read_frame(&mut stream).await.unwrap().unwrap();
    let response = JsonCodec::decode_response(&frame).unwrap();

    assert_eq!(response.id, request.id);
    assert_eq!(response.result, Some(json!({"echo": "RPCHandler.GetClusterDetails"})));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_server_handler_error_becomes_error_response() {
    let server = TcpServer::new("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let handle = server.serve(|_request: Request| async move {
        Err(ForestBusError::Transport("boom".to_string()))
    });

    let mut stream = TcpTransport::connect(&addr, Duration::from_secs(1)).await.unwrap();
    let request = Request::new(Method::GetClusterDetails, json!({}));
    TcpTransport::write_frame(&mut stream, &JsonCodec::encode_request(&request).unwrap())
        .await
        .unwrap();
    let frame = TcpTransport::read_frame(&mut stream).await.unwrap().unwrap();
    let response = JsonCodec::decode_response(&frame).unwrap();

    assert_eq!(response.id, request.id);
    assert!(response.is_error());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_server_shutdown_drops_open_connections() {
    let server = TcpServer::new("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let handle = server.serve(|request: Request| async move {
        Ok(Response::success(request.id, json!({})))
    });

    let mut stream = TcpTransport::connect(&addr, Duration::from_secs(1)).await.unwrap();
    handle.shutdown().await;

    let frame = tokio::time::timeout(Duration::from_secs(2), TcpTransport::read_frame(&mut stream))
        .await
        .expect("read should finish once the server drops the connection");
    assert!(matches!(frame, Ok(None) | Err(_)));

    let reconnect = TcpTransport::connect(&addr, Duration::from_millis(500)).await;
    assert!(reconnect.is_err());
}
