//! UDP 数据报到字节流的适配
//!
//! tokio-modbus 只提供面向流的 TCP/RTU 客户端。Modbus UDP 与 Modbus TCP
//! 使用相同的 MBAP 帧，区别只在于一帧对应一个数据报，因此把已 `connect`
//! 的 `UdpSocket` 包装成 `AsyncRead + AsyncWrite`，交给 TCP 编解码器即可。

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UdpSocket;

/// 已连接 UDP socket 的流式视图
///
/// 每次写入发送一个数据报，每次读取接收一个数据报。
#[derive(Debug)]
pub struct UdpStream {
    socket: UdpSocket,
}

impl UdpStream {
    /// `socket` 必须已经 `connect` 到对端
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }
}

impl AsyncRead for UdpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.socket.poll_recv(cx, buf)
    }
}

impl AsyncWrite for UdpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.socket.poll_send(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_datagram_round_trip() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer.local_addr().unwrap();

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(peer_addr).await.unwrap();
        let local_addr = socket.local_addr().unwrap();
        let mut stream = UdpStream::new(socket);

        // 一次写入对应一个数据报
        let request = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x0A, 0x00, 0x01];
        stream.write_all(&request).await.unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(from, local_addr);
        assert_eq!(&buf[..len], &request);

        let response = [0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x2A];
        peer.send_to(&response, local_addr).await.unwrap();

        let mut received = [0u8; 64];
        let n = stream.read(&mut received).await.unwrap();
        assert_eq!(&received[..n], &response);
    }
}
